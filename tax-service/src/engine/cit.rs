//! Company income tax.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use super::{round_money, DateRange};
use crate::models::{BusinessSize, PlanTier};

const DAYS_PER_YEAR: i64 = 365;

/// Rate applied when the estimated annual turnover is at most `up_to`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitBracket {
    pub up_to: Option<Decimal>,
    pub rate: Decimal,
}

/// CIT brackets and capital-allowance policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitRules {
    pub brackets: Vec<CitBracket>,
    /// Annual depreciation rate applied to fixed assets.
    pub depreciation_rate: Decimal,
    pub capital_allowance_enabled: bool,
}

impl Default for CitRules {
    fn default() -> Self {
        Self {
            brackets: vec![
                CitBracket {
                    up_to: Some(Decimal::from(25_000_000u64)),
                    rate: Decimal::ZERO,
                },
                CitBracket {
                    up_to: Some(Decimal::from(100_000_000u64)),
                    rate: Decimal::new(20, 2),
                },
                CitBracket {
                    up_to: None,
                    rate: Decimal::new(30, 2),
                },
            ],
            depreciation_rate: Decimal::new(20, 2),
            capital_allowance_enabled: true,
        }
    }
}

impl CitRules {
    pub fn validate(&self) -> Result<(), AppError> {
        match self.brackets.last() {
            Some(last) if last.up_to.is_none() => {}
            _ => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "CIT brackets must end with an open bracket"
                )))
            }
        }
        let limits: Vec<Decimal> = self.brackets.iter().filter_map(|b| b.up_to).collect();
        if limits.len() + 1 != self.brackets.len() || limits.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "CIT bracket limits must strictly increase with a single open bracket"
            )));
        }
        if self.depreciation_rate < Decimal::ZERO || self.depreciation_rate > Decimal::ONE {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "depreciation rate {} outside 0..=1",
                self.depreciation_rate
            )));
        }
        Ok(())
    }

    /// Rate for an estimated annual turnover.
    pub fn rate_for(&self, annual_estimate: Decimal) -> Decimal {
        self.brackets
            .iter()
            .find(|b| b.up_to.map_or(true, |limit| annual_estimate <= limit))
            .map(|b| b.rate)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Inputs to a CIT computation for one subject and period.
#[derive(Debug, Clone)]
pub struct CitInput {
    pub tier: PlanTier,
    pub business_size: BusinessSize,
    pub profit: Decimal,
    pub fixed_assets: Decimal,
    pub period: DateRange,
}

/// CIT outcome. Ineligible subjects get a zero result with a reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitResult {
    pub eligible: bool,
    pub reason: Option<String>,
    pub annual_estimate: Decimal,
    pub capital_allowance: Decimal,
    pub taxable_profit: Decimal,
    pub rate: Decimal,
    pub amount: Decimal,
}

impl CitResult {
    fn exempt(reason: String) -> Self {
        Self {
            eligible: false,
            reason: Some(reason),
            annual_estimate: Decimal::ZERO,
            capital_allowance: Decimal::ZERO,
            taxable_profit: Decimal::ZERO,
            rate: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// Compute company income tax for the period.
pub fn compute_cit(input: &CitInput, rules: &CitRules) -> Result<CitResult, AppError> {
    if input.profit < Decimal::ZERO {
        return Err(AppError::validation(
            "profit",
            format!("profit must not be negative, got {}", input.profit),
        ));
    }
    if !input.tier.capabilities().runs_cit {
        return Ok(CitResult::exempt(format!(
            "plan tier '{}' does not include company income tax",
            input.tier
        )));
    }
    if input.business_size.is_small() {
        return Ok(CitResult::exempt(
            "small business exempt from company income tax".to_string(),
        ));
    }

    // Single-day (or degenerate) periods annualize over one day.
    let days = Decimal::from(input.period.days().max(1));
    let year = Decimal::from(DAYS_PER_YEAR);
    let annual_estimate = round_money(input.profit / days * year);

    let capital_allowance = if rules.capital_allowance_enabled && input.fixed_assets > Decimal::ZERO
    {
        round_money(input.fixed_assets * rules.depreciation_rate * days / year)
    } else {
        Decimal::ZERO
    };

    let taxable_profit = (input.profit - capital_allowance).max(Decimal::ZERO);
    let rate = rules.rate_for(annual_estimate);

    Ok(CitResult {
        eligible: true,
        reason: None,
        annual_estimate,
        capital_allowance,
        taxable_profit,
        rate,
        amount: round_money(taxable_profit * rate),
    })
}
