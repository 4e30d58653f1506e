//! Subscription tiers and the computations each one unlocks.

use serde::{Deserialize, Serialize};

/// Subscription tier of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Free,
    Starter,
    Business,
    Enterprise,
}

/// Tax computations enabled for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub runs_cit: bool,
    pub runs_vat: bool,
}

impl PlanTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Starter => "starter",
            PlanTier::Business => "business",
            PlanTier::Enterprise => "enterprise",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "starter" => PlanTier::Starter,
            "business" => PlanTier::Business,
            "enterprise" => PlanTier::Enterprise,
            _ => PlanTier::Free,
        }
    }

    /// Single source of truth for tier gating.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            PlanTier::Free => Capabilities {
                runs_cit: false,
                runs_vat: false,
            },
            PlanTier::Starter => Capabilities {
                runs_cit: false,
                runs_vat: true,
            },
            PlanTier::Business | PlanTier::Enterprise => Capabilities {
                runs_cit: true,
                runs_vat: true,
            },
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_table() {
        assert!(!PlanTier::Free.capabilities().runs_vat);
        assert!(PlanTier::Starter.capabilities().runs_vat);
        assert!(!PlanTier::Starter.capabilities().runs_cit);
        assert!(PlanTier::Business.capabilities().runs_cit);
        assert!(PlanTier::Enterprise.capabilities().runs_cit);
    }

    #[test]
    fn test_unknown_tier_is_free() {
        assert_eq!(PlanTier::from_string("platinum"), PlanTier::Free);
    }
}
