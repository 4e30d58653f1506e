//! Business size classification.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::models::BusinessSize;

/// Turnover/asset thresholds separating size classes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeThresholds {
    /// T₁: highest turnover still eligible for small-business status.
    pub small_turnover_max: Decimal,
    /// A₁: highest fixed-asset value still eligible for small-business status.
    pub small_assets_max: Decimal,
    /// T₂: turnover at or above which a business is large.
    pub large_turnover_min: Decimal,
}

impl Default for SizeThresholds {
    fn default() -> Self {
        Self {
            small_turnover_max: Decimal::from(100_000_000u64),
            small_assets_max: Decimal::from(250_000_000u64),
            large_turnover_min: Decimal::from(1_000_000_000u64),
        }
    }
}

impl SizeThresholds {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.small_turnover_max < Decimal::ZERO || self.small_assets_max < Decimal::ZERO {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "small-business thresholds must be non-negative"
            )));
        }
        if self.large_turnover_min <= self.small_turnover_max {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "large turnover threshold {} must exceed small turnover threshold {}",
                self.large_turnover_min,
                self.small_turnover_max
            )));
        }
        Ok(())
    }
}

/// Classify a business. Small requires both turnover and assets within limits.
pub fn classify(turnover: Decimal, assets: Decimal, thresholds: &SizeThresholds) -> BusinessSize {
    if turnover <= thresholds.small_turnover_max && assets <= thresholds.small_assets_max {
        BusinessSize::Small
    } else if turnover < thresholds.large_turnover_min {
        BusinessSize::Medium
    } else {
        BusinessSize::Large
    }
}

pub fn is_small_business(turnover: Decimal, assets: Decimal, thresholds: &SizeThresholds) -> bool {
    classify(turnover, assets, thresholds).is_small()
}
