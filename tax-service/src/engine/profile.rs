//! Tax profile maintenance, levy lookups and tax summaries.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

use super::levy::{compute_levy, LevyBreakdown};
use super::{classify, TaxEngine};
use crate::models::{BusinessSize, Capabilities, PlanTier, TaxProfile, UpdateRegistration};
use crate::services::Alert;

/// A saved profile and the size transition the update caused, if any.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub profile: TaxProfile,
    pub transition: Option<(BusinessSize, BusinessSize)>,
}

/// Which registration identifiers a subject has on file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationStatus {
    pub has_tax_id: bool,
    pub has_vat_number: bool,
    pub has_fiscal_merchant_id: bool,
    /// All identifiers required to fiscalize invoices are present.
    pub fiscalization_ready: bool,
    pub missing: Vec<&'static str>,
}

impl RegistrationStatus {
    pub fn of(profile: &TaxProfile) -> Self {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        let has_tax_id = present(&profile.tax_id);
        let has_vat_number = present(&profile.vat_number);
        let has_fiscal_merchant_id = present(&profile.fiscal_merchant_id);

        let mut missing = Vec::new();
        if !has_tax_id {
            missing.push("tax_id");
        }
        if !has_vat_number {
            missing.push("vat_number");
        }
        if !has_fiscal_merchant_id {
            missing.push("fiscal_merchant_id");
        }

        Self {
            has_tax_id,
            has_vat_number,
            has_fiscal_merchant_id,
            fiscalization_ready: has_tax_id && has_fiscal_merchant_id,
            missing,
        }
    }
}

/// Classification, applicable rates and registration status of a subject.
#[derive(Debug, Clone, Serialize)]
pub struct TaxSummary {
    pub subject_id: Uuid,
    pub plan_tier: PlanTier,
    pub capabilities: Capabilities,
    pub business_size: BusinessSize,
    pub is_small_business: bool,
    pub annual_turnover: Decimal,
    pub fixed_assets: Decimal,
    /// CIT bracket rate for the declared annual turnover; zero when exempt.
    pub cit_rate: Decimal,
    pub levy_rate: Decimal,
    /// Zero when the plan does not track VAT.
    pub vat_rate: Decimal,
    pub registration: RegistrationStatus,
}

impl TaxEngine {
    /// Create a subject's profile on the given tier, or move an existing
    /// profile to it.
    #[instrument(skip(self), fields(subject_id = %subject_id, tier = %tier))]
    pub async fn set_plan_tier(
        &self,
        subject_id: Uuid,
        tier: PlanTier,
    ) -> Result<TaxProfile, AppError> {
        let now = Utc::now();
        let profile = match self.deps.profiles.get_profile(subject_id).await? {
            Some(mut existing) => {
                existing.plan_tier = tier.as_str().to_string();
                existing.updated_utc = now;
                existing
            }
            None => TaxProfile {
                subject_id,
                plan_tier: tier.as_str().to_string(),
                annual_turnover: Decimal::ZERO,
                fixed_assets: Decimal::ZERO,
                tax_id: None,
                vat_number: None,
                fiscal_merchant_id: None,
                business_size: classify(Decimal::ZERO, Decimal::ZERO, &self.rules.thresholds)
                    .as_str()
                    .to_string(),
                created_utc: now,
                updated_utc: now,
            },
        };
        self.deps.profiles.save_profile(&profile).await
    }

    /// Record new turnover and asset figures and reclassify the subject.
    /// A size change raises an alert but never blocks the update.
    #[instrument(skip(self), fields(subject_id = %subject_id))]
    pub async fn update_financials(
        &self,
        subject_id: Uuid,
        annual_turnover: Decimal,
        fixed_assets: Decimal,
    ) -> Result<ProfileUpdate, AppError> {
        if annual_turnover < Decimal::ZERO {
            return Err(AppError::validation(
                "annual_turnover",
                format!("turnover must not be negative, got {}", annual_turnover),
            ));
        }
        if fixed_assets < Decimal::ZERO {
            return Err(AppError::validation(
                "fixed_assets",
                format!("fixed assets must not be negative, got {}", fixed_assets),
            ));
        }

        let mut profile = self.require_profile(subject_id).await?;
        let previous = profile.parsed_size();
        let current = classify(annual_turnover, fixed_assets, &self.rules.thresholds);

        profile.annual_turnover = annual_turnover;
        profile.fixed_assets = fixed_assets;
        profile.business_size = current.as_str().to_string();
        profile.updated_utc = Utc::now();
        let saved = self.deps.profiles.save_profile(&profile).await?;

        let transition = (previous != current).then_some((previous, current));
        if let Some((from, to)) = transition {
            info!(from = %from, to = %to, "Business size changed");
            self.deps
                .alerts
                .emit(Alert::BusinessSizeChanged {
                    subject_id,
                    from,
                    to,
                })
                .await;
        }

        Ok(ProfileUpdate {
            profile: saved,
            transition,
        })
    }

    #[instrument(skip(self, update), fields(subject_id = %subject_id))]
    pub async fn update_registration(
        &self,
        subject_id: Uuid,
        update: UpdateRegistration,
    ) -> Result<TaxProfile, AppError> {
        let mut profile = self.require_profile(subject_id).await?;
        if let Some(tax_id) = update.tax_id {
            profile.tax_id = Some(tax_id);
        }
        if let Some(vat_number) = update.vat_number {
            profile.vat_number = Some(vat_number);
        }
        if let Some(merchant_id) = update.fiscal_merchant_id {
            profile.fiscal_merchant_id = Some(merchant_id);
        }
        profile.updated_utc = Utc::now();
        self.deps.profiles.save_profile(&profile).await
    }

    /// Development levy on `profit` for the subject's current classification.
    #[instrument(skip(self), fields(subject_id = %subject_id))]
    pub async fn compute_levy(
        &self,
        subject_id: Uuid,
        profit: Decimal,
    ) -> Result<LevyBreakdown, AppError> {
        if profit < Decimal::ZERO {
            return Err(AppError::validation(
                "profit",
                format!("profit must not be negative, got {}", profit),
            ));
        }
        let profile = self.require_profile(subject_id).await?;
        let size = classify(
            profile.annual_turnover,
            profile.fixed_assets,
            &self.rules.thresholds,
        );
        compute_levy(profit, size, self.rules.levy_rate)
    }

    #[instrument(skip(self), fields(subject_id = %subject_id))]
    pub async fn get_tax_summary(&self, subject_id: Uuid) -> Result<TaxSummary, AppError> {
        let profile = self.require_profile(subject_id).await?;
        let rules = &self.rules;

        let size = classify(profile.annual_turnover, profile.fixed_assets, &rules.thresholds);
        let tier = profile.parsed_tier();
        let capabilities = tier.capabilities();
        let small = size.is_small();

        let cit_rate = if capabilities.runs_cit && !small {
            rules.cit.rate_for(profile.annual_turnover)
        } else {
            Decimal::ZERO
        };
        let levy_rate = if small { Decimal::ZERO } else { rules.levy_rate };
        let vat_rate = if capabilities.runs_vat {
            rules.vat_rate
        } else {
            Decimal::ZERO
        };

        Ok(TaxSummary {
            subject_id,
            plan_tier: tier,
            capabilities,
            business_size: size,
            is_small_business: small,
            annual_turnover: profile.annual_turnover,
            fixed_assets: profile.fixed_assets,
            cit_rate,
            levy_rate,
            vat_rate,
            registration: RegistrationStatus::of(&profile),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(tax_id: Option<&str>, vat: Option<&str>, merchant: Option<&str>) -> TaxProfile {
        let now = Utc::now();
        TaxProfile {
            subject_id: Uuid::new_v4(),
            plan_tier: "business".to_string(),
            annual_turnover: Decimal::ZERO,
            fixed_assets: Decimal::ZERO,
            tax_id: tax_id.map(str::to_string),
            vat_number: vat.map(str::to_string),
            fiscal_merchant_id: merchant.map(str::to_string),
            business_size: "small".to_string(),
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn test_registration_status_lists_missing_fields() {
        let status = RegistrationStatus::of(&profile(Some("TIN-1"), None, Some("  ")));
        assert!(status.has_tax_id);
        assert!(!status.has_vat_number);
        assert!(!status.has_fiscal_merchant_id);
        assert!(!status.fiscalization_ready);
        assert_eq!(status.missing, vec!["vat_number", "fiscal_merchant_id"]);
    }

    #[test]
    fn test_registration_status_ready() {
        let status = RegistrationStatus::of(&profile(Some("TIN-1"), Some("VAT-9"), Some("M-3")));
        assert!(status.fiscalization_ready);
        assert!(status.missing.is_empty());
    }
}
