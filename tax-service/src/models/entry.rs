//! Ledger entry model as exposed by the invoicing subsystem.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Entry type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Revenue,
    Expense,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Revenue => "revenue",
            EntryType::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "revenue" => Some(EntryType::Revenue),
            "expense" => Some(EntryType::Expense),
            _ => None,
        }
    }
}

/// Payment status of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Draft,
    Pending,
    PartiallyPaid,
    Overdue,
    Paid,
    Refunded,
    Cancelled,
    Void,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Draft => "draft",
            PaymentStatus::Pending => "pending",
            PaymentStatus::PartiallyPaid => "partially_paid",
            PaymentStatus::Overdue => "overdue",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Void => "void",
        }
    }

    /// Unknown values are treated as a non-terminal pending state.
    pub fn from_string(s: &str) -> Self {
        match s {
            "draft" => PaymentStatus::Draft,
            "partially_paid" => PaymentStatus::PartiallyPaid,
            "overdue" => PaymentStatus::Overdue,
            "paid" => PaymentStatus::Paid,
            "refunded" => PaymentStatus::Refunded,
            "cancelled" | "canceled" => PaymentStatus::Cancelled,
            "void" => PaymentStatus::Void,
            _ => PaymentStatus::Pending,
        }
    }

    /// The terminal settled state.
    pub fn is_paid(&self) -> bool {
        matches!(self, PaymentStatus::Paid)
    }

    /// Terminal failure states. Excluded under every basis.
    pub fn is_voided(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Refunded | PaymentStatus::Cancelled | PaymentStatus::Void
        )
    }
}

/// VAT treatment of a revenue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatCategory {
    Standard,
    ZeroRated,
    Exempt,
    Export,
}

impl VatCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            VatCategory::Standard => "standard",
            VatCategory::ZeroRated => "zero_rated",
            VatCategory::Exempt => "exempt",
            VatCategory::Export => "export",
        }
    }

    /// Missing or unrecognized categories default to standard-rated.
    pub fn from_optional(s: Option<&str>) -> Self {
        match s {
            Some("zero_rated") => VatCategory::ZeroRated,
            Some("exempt") => VatCategory::Exempt,
            Some("export") => VatCategory::Export,
            _ => VatCategory::Standard,
        }
    }
}

/// Revenue or expense record. Read-only from this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub subject_id: Uuid,
    pub entry_type: String,
    pub amount: Decimal,
    pub discount: Option<Decimal>,
    pub payment_status: String,
    pub vat_category: Option<String>,
    pub vat_amount: Decimal,
    pub counterparty_name: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
}

impl LedgerEntry {
    pub fn parsed_type(&self) -> Option<EntryType> {
        EntryType::parse(&self.entry_type)
    }

    pub fn parsed_status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.payment_status)
    }

    pub fn parsed_vat_category(&self) -> VatCategory {
        VatCategory::from_optional(self.vat_category.as_deref())
    }

    /// Amount after discount.
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.discount.unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_vat_category_is_standard() {
        assert_eq!(VatCategory::from_optional(None), VatCategory::Standard);
        assert_eq!(
            VatCategory::from_optional(Some("luxury")),
            VatCategory::Standard
        );
        assert_eq!(
            VatCategory::from_optional(Some("export")),
            VatCategory::Export
        );
    }

    #[test]
    fn test_voided_statuses() {
        assert!(PaymentStatus::from_string("refunded").is_voided());
        assert!(PaymentStatus::from_string("cancelled").is_voided());
        assert!(PaymentStatus::from_string("void").is_voided());
        assert!(!PaymentStatus::from_string("overdue").is_voided());
        assert!(!PaymentStatus::from_string("something_new").is_voided());
    }
}
