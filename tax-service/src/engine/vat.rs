//! VAT aggregation by category.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregator::in_window;
use crate::models::{Basis, EntryType, LedgerEntry, VatCategory};

/// VAT figures for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VatSummary {
    pub taxable_sales: Decimal,
    pub zero_rated_sales: Decimal,
    pub exempt_sales: Decimal,
    pub vat_collected: Decimal,
}

impl VatSummary {
    pub fn total_sales(&self) -> Decimal {
        self.taxable_sales + self.zero_rated_sales + self.exempt_sales
    }
}

/// Bucket revenue entries by VAT category. Only standard-rated entries
/// contribute their stored VAT amount.
pub fn aggregate_vat(
    entries: &[LedgerEntry],
    window: (DateTime<Utc>, DateTime<Utc>),
    basis: Basis,
) -> VatSummary {
    let mut summary = VatSummary::default();

    let revenue = entries.iter().filter(|e| {
        e.parsed_type() == Some(EntryType::Revenue)
            && in_window(e.created_utc, window)
            && basis.includes(e)
    });

    for entry in revenue {
        let net = entry.net_amount();
        match entry.parsed_vat_category() {
            VatCategory::Standard => {
                summary.taxable_sales += net;
                summary.vat_collected += entry.vat_amount;
            }
            VatCategory::ZeroRated | VatCategory::Export => summary.zero_rated_sales += net,
            VatCategory::Exempt => summary.exempt_sales += net,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn sale(amount: &str, category: Option<&str>, vat: &str, status: &str) -> LedgerEntry {
        LedgerEntry {
            entry_id: Uuid::new_v4(),
            subject_id: Uuid::nil(),
            entry_type: "revenue".to_string(),
            amount: d(amount),
            discount: None,
            payment_status: status.to_string(),
            vat_category: category.map(str::to_string),
            vat_amount: d(vat),
            counterparty_name: None,
            created_utc: Utc.with_ymd_and_hms(2026, 5, 10, 12, 0, 0).unwrap(),
            due_date: None,
        }
    }

    fn may() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap(),
        )
    }

    #[test]
    fn test_buckets_by_category() {
        let entries = vec![
            sale("10000", Some("standard"), "750", "paid"),
            sale("4000", Some("zero_rated"), "0", "paid"),
            sale("6000", Some("exempt"), "0", "paid"),
        ];
        let summary = aggregate_vat(&entries, may(), Basis::Paid);
        assert_eq!(summary.taxable_sales, d("10000"));
        assert_eq!(summary.zero_rated_sales, d("4000"));
        assert_eq!(summary.exempt_sales, d("6000"));
        assert_eq!(summary.vat_collected, d("750"));
        assert_eq!(summary.total_sales(), d("20000"));
    }

    #[test]
    fn test_export_is_zero_rated_and_ignores_stored_vat() {
        let entries = vec![sale("2500", Some("export"), "99", "paid")];
        let summary = aggregate_vat(&entries, may(), Basis::Paid);
        assert_eq!(summary.zero_rated_sales, d("2500"));
        assert_eq!(summary.vat_collected, Decimal::ZERO);
    }

    #[test]
    fn test_missing_category_defaults_to_standard() {
        let entries = vec![
            sale("1000", None, "75", "paid"),
            sale("2000", Some("mystery"), "150", "paid"),
        ];
        let summary = aggregate_vat(&entries, may(), Basis::Paid);
        assert_eq!(summary.taxable_sales, d("3000"));
        assert_eq!(summary.vat_collected, d("225"));
    }

    #[test]
    fn test_discount_and_basis() {
        let mut discounted = sale("1000", Some("standard"), "71.25", "pending");
        discounted.discount = Some(d("50"));
        let entries = vec![discounted, sale("500", Some("standard"), "37.5", "refunded")];

        let paid = aggregate_vat(&entries, may(), Basis::Paid);
        assert_eq!(paid, VatSummary::default());

        let all = aggregate_vat(&entries, may(), Basis::All);
        assert_eq!(all.taxable_sales, d("950"));
        assert_eq!(all.vat_collected, d("71.25"));
    }

    #[test]
    fn test_expenses_ignored() {
        let mut expense = sale("1000", Some("standard"), "75", "paid");
        expense.entry_type = "expense".to_string();
        let summary = aggregate_vat(&[expense], may(), Basis::All);
        assert_eq!(summary, VatSummary::default());
    }
}
