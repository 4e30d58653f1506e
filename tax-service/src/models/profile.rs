//! Tax profile model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::plan::PlanTier;

/// Business size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessSize {
    Small,
    Medium,
    Large,
}

impl BusinessSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusinessSize::Small => "small",
            BusinessSize::Medium => "medium",
            BusinessSize::Large => "large",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "small" => BusinessSize::Small,
            "large" => BusinessSize::Large,
            _ => BusinessSize::Medium,
        }
    }

    pub fn is_small(&self) -> bool {
        matches!(self, BusinessSize::Small)
    }
}

impl std::fmt::Display for BusinessSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-subject tax profile.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxProfile {
    pub subject_id: Uuid,
    pub plan_tier: String,
    pub annual_turnover: Decimal,
    pub fixed_assets: Decimal,
    pub tax_id: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_merchant_id: Option<String>,
    pub business_size: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl TaxProfile {
    pub fn parsed_size(&self) -> BusinessSize {
        BusinessSize::from_string(&self.business_size)
    }

    pub fn parsed_tier(&self) -> PlanTier {
        PlanTier::from_string(&self.plan_tier)
    }

    pub fn is_small_business(&self) -> bool {
        self.parsed_size().is_small()
    }
}

/// Registration fields update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateRegistration {
    pub tax_id: Option<String>,
    pub vat_number: Option<String>,
    pub fiscal_merchant_id: Option<String>,
}
