//! Report generation and the per-period report cache.

use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::aggregator::{aggregate_entries, LedgerAggregator};
use super::cit::{compute_cit, CitInput};
use super::levy::compute_levy;
use super::vat::{aggregate_vat, VatSummary};
use super::{classify, round_money, DateRange, TaxEngine};
use crate::models::{Basis, PeriodParts, PeriodType, ReportKey, TaxProfile, TaxReport};
use crate::services::metrics::{record_report, REPORT_DURATION};
use crate::services::CogsFigures;

impl TaxEngine {
    /// Return the cached report for the period, computing and storing it when
    /// absent, cached under another basis, or when `force` is set.
    #[instrument(skip(self, parts), fields(subject_id = %subject_id, period_type = %period_type))]
    pub async fn generate_report(
        &self,
        subject_id: Uuid,
        period_type: PeriodType,
        parts: &PeriodParts,
        basis: Basis,
        force: bool,
    ) -> Result<TaxReport, AppError> {
        let range = self.resolve_period(period_type, parts)?;
        let key = ReportKey {
            subject_id,
            period_type,
            start_date: range.start,
            end_date: range.end,
        };

        if !force {
            match self.deps.reports.find_report(&key).await? {
                Some(existing) if existing.basis == basis.as_str() => {
                    info!(report_id = %existing.report_id, "Report cache hit");
                    record_report(period_type.as_str(), "cached");
                    return Ok(existing);
                }
                Some(existing) => {
                    // One report per key; a basis change overwrites it.
                    debug!(
                        report_id = %existing.report_id,
                        cached_basis = %existing.basis,
                        requested_basis = basis.as_str(),
                        "Cached report has a different basis, recomputing"
                    );
                }
                None => {}
            }
        }

        let timer = Instant::now();
        let result = self.compute_report(&key, &range, basis).await;
        REPORT_DURATION
            .with_label_values(&[period_type.as_str()])
            .observe(timer.elapsed().as_secs_f64());

        let computed = match result {
            Ok(report) => report,
            Err(e) => {
                record_report(period_type.as_str(), "error");
                return Err(e);
            }
        };

        let saved = self.deps.reports.upsert_report(&computed).await?;
        record_report(period_type.as_str(), "computed");
        info!(
            report_id = %saved.report_id,
            range = %range,
            assessable_profit = %saved.assessable_profit,
            "Report generated"
        );
        Ok(saved)
    }

    async fn compute_report(
        &self,
        key: &ReportKey,
        range: &DateRange,
        basis: Basis,
    ) -> Result<TaxReport, AppError> {
        let profile = self.require_profile(key.subject_id).await?;

        let aggregator = LedgerAggregator::new(self.deps.ledger.as_ref(), self.rules.reporting_offset);
        let (ledger, cogs) = tokio::join!(
            aggregator.entries(key.subject_id, range),
            self.cogs_or_zero(key.subject_id, range),
        );
        let (entries, window) = ledger?;

        let totals = aggregate_entries(&entries, window, basis);
        let assessable_profit =
            round_money((totals.profit - cogs.cogs_amount).max(Decimal::ZERO));

        let rules = &self.rules;
        let size = classify(profile.annual_turnover, profile.fixed_assets, &rules.thresholds);
        let tier = profile.parsed_tier();
        let capabilities = tier.capabilities();

        let pit = rules.pit.compute(assessable_profit)?;
        let cit = compute_cit(
            &CitInput {
                tier,
                business_size: size,
                profit: assessable_profit,
                fixed_assets: profile.fixed_assets,
                period: *range,
            },
            &rules.cit,
        )?;
        let levy = compute_levy(assessable_profit, size, rules.levy_rate)?;
        let vat = if capabilities.runs_vat {
            aggregate_vat(&entries, window, basis)
        } else {
            VatSummary::default()
        };

        let now = Utc::now();
        Ok(TaxReport {
            report_id: Uuid::new_v4(),
            subject_id: key.subject_id,
            period_type: key.period_type.as_str().to_string(),
            start_date: key.start_date,
            end_date: key.end_date,
            basis: basis.as_str().to_string(),
            business_size: size.as_str().to_string(),
            total_revenue: round_money(totals.revenue),
            total_expenses: round_money(totals.expenses),
            cogs_amount: round_money(cogs.cogs_amount),
            purchases_amount: round_money(cogs.purchases_amount),
            inventory_value: round_money(cogs.current_inventory_value),
            assessable_profit,
            pit_amount: pit.tax,
            pit_effective_rate: pit.effective_rate,
            pit_band: pit.band_label,
            cit_amount: cit.amount,
            cit_rate: cit.rate,
            levy_amount: levy.levy_amount,
            levy_rate: levy.rate,
            vat_collected: round_money(vat.vat_collected),
            taxable_sales: round_money(vat.taxable_sales),
            zero_rated_sales: round_money(vat.zero_rated_sales),
            exempt_sales: round_money(vat.exempt_sales),
            pdf_url: None,
            generated_utc: now,
            created_utc: now,
        })
    }

    /// COGS for the range. Collaborator failures degrade to zeros.
    async fn cogs_or_zero(&self, subject_id: Uuid, range: &DateRange) -> CogsFigures {
        match self
            .deps
            .inventory
            .get_cogs(subject_id, range.start, range.end)
            .await
        {
            Ok(figures) => figures,
            Err(e) => {
                warn!(subject_id = %subject_id, error = %e, "COGS unavailable, using zero");
                CogsFigures::default()
            }
        }
    }

    /// Stored document URL for a report, rendering it on first access.
    /// A renderer failure leaves the URL unset and yields `None`.
    #[instrument(skip(self), fields(subject_id = %subject_id, report_id = %report_id))]
    pub async fn artifact_url(
        &self,
        subject_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<String>, AppError> {
        let report = self
            .deps
            .reports
            .get_report(subject_id, report_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Report {} not found", report_id)))?;

        if let Some(url) = report.pdf_url {
            return Ok(Some(url));
        }

        match self.deps.renderer.render(&report).await {
            Ok(url) => {
                self.deps.reports.set_artifact_url(report_id, &url).await?;
                info!("Report artifact rendered");
                Ok(Some(url))
            }
            Err(e) => {
                warn!(error = %e, "Artifact rendering deferred");
                Ok(None)
            }
        }
    }

    pub async fn require_profile(&self, subject_id: Uuid) -> Result<TaxProfile, AppError> {
        self.deps
            .profiles
            .get_profile(subject_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("No tax profile for subject {}", subject_id))
            })
    }
}
