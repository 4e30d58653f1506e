//! Tax computation engines.

pub mod aggregator;
pub mod cit;
pub mod classifier;
pub mod levy;
pub mod period;
pub mod pit;
pub mod profile;
pub mod report;
pub mod sweep;
pub mod vat;

use rust_decimal::{Decimal, RoundingStrategy};
use std::sync::Arc;

use crate::config::TaxRules;
use crate::services::{AlertSink, ArtifactRenderer, InventoryBridge, LedgerSource, ProfileStore, ReportStore};

pub use aggregator::LedgerTotals;
pub use cit::{CitBracket, CitResult, CitRules};
pub use classifier::{classify, SizeThresholds};
pub use levy::LevyBreakdown;
pub use period::{resolve_period, DateRange};
pub use pit::{PitResult, PitSchedule, TaxBand};
pub use profile::{ProfileUpdate, RegistrationStatus, TaxSummary};
pub use sweep::{SweepSummary, Sweeper};
pub use vat::VatSummary;

/// Round to 2 decimal places, half away from zero (half-up for amounts >= 0).
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Round a rate to 4 decimal places, half away from zero.
pub fn round_rate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

/// Format a naira amount with thousands separators, e.g. `₦3,000,000`.
pub fn format_naira(value: Decimal) -> String {
    let rounded = round_money(value).normalize();
    let text = rounded.abs().to_string();
    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (text, None),
    };

    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(f) => format!("{}₦{}.{:0<2}", sign, grouped, f),
        None => format!("{}₦{}", sign, grouped),
    }
}

/// Collaborators the engine reads from and writes through.
#[derive(Clone)]
pub struct EngineDeps {
    pub profiles: Arc<dyn ProfileStore>,
    pub ledger: Arc<dyn LedgerSource>,
    pub reports: Arc<dyn ReportStore>,
    pub inventory: Arc<dyn InventoryBridge>,
    pub renderer: Arc<dyn ArtifactRenderer>,
    pub alerts: Arc<dyn AlertSink>,
}

/// Tax computation engine: period resolution, report generation and caching,
/// profile maintenance and summaries.
#[derive(Clone)]
pub struct TaxEngine {
    deps: EngineDeps,
    rules: Arc<TaxRules>,
}

impl TaxEngine {
    pub fn new(deps: EngineDeps, rules: TaxRules) -> Self {
        Self {
            deps,
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &TaxRules {
        &self.rules
    }

    pub fn resolve_period(
        &self,
        period_type: crate::models::PeriodType,
        parts: &crate::models::PeriodParts,
    ) -> Result<DateRange, service_core::error::AppError> {
        resolve_period(period_type, parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_money_half_up() {
        assert_eq!(round_money(d("10.005")), d("10.01"));
        assert_eq!(round_money(d("10.004")), d("10.00"));
        assert_eq!(round_money(d("0.125")), d("0.13"));
    }

    #[test]
    fn test_format_naira() {
        assert_eq!(format_naira(d("800000")), "₦800,000");
        assert_eq!(format_naira(d("3000000.00")), "₦3,000,000");
        assert_eq!(format_naira(d("1234.5")), "₦1,234.50");
        assert_eq!(format_naira(d("999")), "₦999");
    }
}
