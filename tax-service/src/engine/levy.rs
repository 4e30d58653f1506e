//! Development levy: flat rate on profit, waived for small businesses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::round_money;
use crate::models::BusinessSize;

pub const SMALL_BUSINESS_EXEMPTION: &str = "small business exempt from development levy";

/// Levy outcome, carrying what an auditor needs to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevyBreakdown {
    pub profit: Decimal,
    pub business_size: BusinessSize,
    pub is_small_business: bool,
    /// Rate actually applied (zero when waived).
    pub rate: Decimal,
    pub levy_amount: Decimal,
    pub exemption_reason: Option<String>,
}

/// Compute the levy. `profit` must already be floored at zero by the caller.
pub fn compute_levy(
    profit: Decimal,
    business_size: BusinessSize,
    rate: Decimal,
) -> Result<LevyBreakdown, AppError> {
    if profit < Decimal::ZERO {
        return Err(AppError::validation(
            "profit",
            format!("profit must not be negative, got {}", profit),
        ));
    }

    if business_size.is_small() {
        return Ok(LevyBreakdown {
            profit,
            business_size,
            is_small_business: true,
            rate: Decimal::ZERO,
            levy_amount: Decimal::ZERO,
            exemption_reason: Some(SMALL_BUSINESS_EXEMPTION.to_string()),
        });
    }

    Ok(LevyBreakdown {
        profit,
        business_size,
        is_small_business: false,
        rate,
        levy_amount: round_money(profit * rate),
        exemption_reason: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_small_business_waived() {
        let levy = compute_levy(d("5000000"), BusinessSize::Small, d("0.04")).unwrap();
        assert_eq!(levy.levy_amount, Decimal::ZERO);
        assert_eq!(levy.rate, Decimal::ZERO);
        assert!(levy.is_small_business);
        assert_eq!(
            levy.exemption_reason.as_deref(),
            Some(SMALL_BUSINESS_EXEMPTION)
        );
    }

    #[test]
    fn test_medium_business_pays() {
        let levy = compute_levy(d("1234567.89"), BusinessSize::Medium, d("0.04")).unwrap();
        // 49,382.7156 -> 49,382.72
        assert_eq!(levy.levy_amount, d("49382.72"));
        assert_eq!(levy.rate, d("0.04"));
        assert!(levy.exemption_reason.is_none());
    }

    #[test]
    fn test_negative_profit_is_validation_error() {
        let err = compute_levy(d("-0.01"), BusinessSize::Large, d("0.04")).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "profit"));
    }

    #[test]
    fn test_zero_profit() {
        let levy = compute_levy(Decimal::ZERO, BusinessSize::Large, d("0.04")).unwrap();
        assert_eq!(levy.levy_amount, Decimal::ZERO);
        assert_eq!(levy.rate, d("0.04"));
    }
}
