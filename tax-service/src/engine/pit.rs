//! Progressive personal income tax.
//!
//! Profit is taxed band by band: each band taxes only the slice of profit
//! between its lower bound (the previous band's upper threshold) and its own
//! upper threshold, at the band's marginal rate. The final band is open-ended.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::{format_naira, round_money, round_rate};

pub const NO_PROFIT_LABEL: &str = "no profit";

/// One marginal band. `upper == None` marks the open top band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBand {
    pub upper: Option<Decimal>,
    pub rate: Decimal,
}

impl TaxBand {
    pub fn new(upper: u64, rate: Decimal) -> Self {
        Self {
            upper: Some(Decimal::from(upper)),
            rate,
        }
    }

    pub fn open(rate: Decimal) -> Self {
        Self { upper: None, rate }
    }
}

/// PIT outcome for one profit figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitResult {
    pub profit: Decimal,
    pub tax: Decimal,
    pub effective_rate: Decimal,
    pub band_label: String,
}

/// Ordered band schedule covering 0 to infinity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PitSchedule {
    bands: Vec<TaxBand>,
}

impl Default for PitSchedule {
    fn default() -> Self {
        let pct = |p: i64| Decimal::new(p, 2);
        Self {
            bands: vec![
                TaxBand::new(800_000, pct(0)),
                TaxBand::new(3_000_000, pct(15)),
                TaxBand::new(12_000_000, pct(18)),
                TaxBand::new(25_000_000, pct(21)),
                TaxBand::new(50_000_000, pct(23)),
                TaxBand::open(pct(25)),
            ],
        }
    }
}

impl PitSchedule {
    /// Build a schedule. Thresholds must strictly increase and only the last
    /// band may be open.
    pub fn new(bands: Vec<TaxBand>) -> Result<Self, AppError> {
        if bands.is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PIT schedule needs at least one band"
            )));
        }
        let mut previous = Decimal::ZERO;
        for (i, band) in bands.iter().enumerate() {
            let is_last = i + 1 == bands.len();
            if band.rate < Decimal::ZERO || band.rate > Decimal::ONE {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "PIT band {} has rate {} outside 0..=1",
                    i,
                    band.rate
                )));
            }
            match band.upper {
                Some(upper) if upper <= previous => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "PIT band thresholds must strictly increase (band {})",
                        i
                    )));
                }
                Some(upper) if is_last => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "last PIT band must be open-ended, found upper threshold {}",
                        upper
                    )));
                }
                Some(upper) => previous = upper,
                None if !is_last => {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "only the last PIT band may be open-ended (band {})",
                        i
                    )));
                }
                None => {}
            }
        }
        Ok(Self { bands })
    }

    pub fn bands(&self) -> &[TaxBand] {
        &self.bands
    }

    /// Unrounded tax on the slice of profit between `from` and `to`.
    pub fn tax_between(&self, from: Decimal, to: Decimal) -> Decimal {
        if to <= from {
            return Decimal::ZERO;
        }
        let mut tax = Decimal::ZERO;
        let mut lower = Decimal::ZERO;
        for band in &self.bands {
            if to <= lower {
                break;
            }
            let upper = band.upper.unwrap_or(to).min(to);
            let slice_start = lower.max(from);
            if upper > slice_start {
                tax += band.rate * (upper - slice_start);
            }
            match band.upper {
                Some(u) => lower = u,
                None => break,
            }
        }
        tax
    }

    /// Unrounded tax on the whole profit.
    pub fn raw_tax(&self, profit: Decimal) -> Decimal {
        self.tax_between(Decimal::ZERO, profit)
    }

    /// Compute PIT on a non-negative profit.
    pub fn compute(&self, profit: Decimal) -> Result<PitResult, AppError> {
        if profit < Decimal::ZERO {
            return Err(AppError::validation(
                "profit",
                format!("profit must not be negative, got {}", profit),
            ));
        }
        if profit.is_zero() {
            return Ok(PitResult {
                profit,
                tax: Decimal::ZERO,
                effective_rate: Decimal::ZERO,
                band_label: NO_PROFIT_LABEL.to_string(),
            });
        }

        let tax = round_money(self.raw_tax(profit));
        Ok(PitResult {
            profit,
            tax,
            effective_rate: round_rate(tax / profit),
            band_label: self.band_label(profit),
        })
    }

    /// Human label for the band containing `profit`.
    pub fn band_label(&self, profit: Decimal) -> String {
        if profit <= Decimal::ZERO {
            return NO_PROFIT_LABEL.to_string();
        }
        let mut lower = Decimal::ZERO;
        for band in &self.bands {
            let pct = (band.rate * Decimal::ONE_HUNDRED).normalize();
            match band.upper {
                Some(upper) if profit <= upper => {
                    return if lower.is_zero() {
                        format!("{}% band (up to {})", pct, format_naira(upper))
                    } else {
                        format!(
                            "{}% band ({} to {})",
                            pct,
                            format_naira(lower),
                            format_naira(upper)
                        )
                    };
                }
                Some(upper) => lower = upper,
                None => return format!("{}% band (above {})", pct, format_naira(lower)),
            }
        }
        NO_PROFIT_LABEL.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn two_band() -> PitSchedule {
        PitSchedule::new(vec![
            TaxBand::new(800_000, d("0")),
            TaxBand::new(3_000_000, d("0.15")),
            TaxBand::open(d("0.18")),
        ])
        .unwrap()
    }

    #[test]
    fn test_zero_profit_is_no_profit() {
        let result = PitSchedule::default().compute(Decimal::ZERO).unwrap();
        assert_eq!(result.tax, Decimal::ZERO);
        assert_eq!(result.effective_rate, Decimal::ZERO);
        assert_eq!(result.band_label, "no profit");
    }

    #[test]
    fn test_one_million_profit() {
        let result = two_band().compute(d("1000000")).unwrap();
        assert_eq!(result.tax, d("30000"));
        assert_eq!(result.effective_rate, d("0.03"));
        assert_eq!(result.band_label, "15% band (₦800,000 to ₦3,000,000)");
    }

    #[test]
    fn test_within_exempt_band() {
        let result = PitSchedule::default().compute(d("800000")).unwrap();
        assert_eq!(result.tax, Decimal::ZERO);
        assert_eq!(result.band_label, "0% band (up to ₦800,000)");
    }

    #[test]
    fn test_default_schedule_top_band() {
        // 0 + 330,000 + 1,620,000 + 2,730,000 + 5,750,000 + 0.25 * 10,000,000
        let result = PitSchedule::default().compute(d("60000000")).unwrap();
        assert_eq!(result.tax, d("12930000"));
        assert_eq!(result.band_label, "25% band (above ₦50,000,000)");
    }

    #[test]
    fn test_rounding_half_up() {
        let schedule = PitSchedule::new(vec![TaxBand::open(d("0.15"))]).unwrap();
        // 0.15 * 0.05 = 0.0075 -> 0.01
        assert_eq!(schedule.compute(d("0.05")).unwrap().tax, d("0.01"));
    }

    #[test]
    fn test_negative_profit_rejected() {
        let err = PitSchedule::default().compute(d("-1")).unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "profit"));
    }

    #[test]
    fn test_schedule_validation() {
        assert!(PitSchedule::new(vec![]).is_err());
        assert!(PitSchedule::new(vec![TaxBand::new(100, d("0.1"))]).is_err());
        assert!(
            PitSchedule::new(vec![
                TaxBand::new(100, d("0.1")),
                TaxBand::new(50, d("0.2")),
                TaxBand::open(d("0.3")),
            ])
            .is_err()
        );
        assert!(
            PitSchedule::new(vec![TaxBand::open(d("0.1")), TaxBand::open(d("0.2"))]).is_err()
        );
    }

    proptest! {
        #[test]
        fn band_additivity(profit in 0u64..200_000_000, split_pct in 0u64..=100) {
            let schedule = PitSchedule::default();
            let p = Decimal::from(profit);
            let split = Decimal::from(profit * split_pct / 100);
            let parts = schedule.tax_between(Decimal::ZERO, split) + schedule.tax_between(split, p);
            prop_assert_eq!(parts, schedule.raw_tax(p));
        }

        #[test]
        fn tax_never_exceeds_top_rate(profit in 1u64..500_000_000) {
            let result = PitSchedule::default().compute(Decimal::from(profit)).unwrap();
            prop_assert!(result.effective_rate <= d("0.25"));
            prop_assert!(result.tax >= Decimal::ZERO);
        }
    }
}
