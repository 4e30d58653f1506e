//! Month-end sweep: regenerate every subject's monthly report.
//!
//! Subjects are walked with a forward-only keyset cursor, one page at a time.
//! A failure for one subject is alerted and counted; only failures to page
//! through subjects abort the run.

use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::TaxEngine;
use crate::config::SweepConfig;
use crate::models::{Basis, PeriodParts, PeriodType};
use crate::services::metrics::SWEEP_SUBJECTS_TOTAL;
use crate::services::Alert;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SweepSummary {
    pub period: String,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_subjects: Vec<Uuid>,
}

#[derive(Clone)]
pub struct Sweeper {
    engine: TaxEngine,
    config: SweepConfig,
}

impl Sweeper {
    pub fn new(engine: TaxEngine, config: SweepConfig) -> Self {
        Self { engine, config }
    }

    #[instrument(skip(self))]
    pub async fn run_month(&self, year: i32, month: u32) -> Result<SweepSummary, AppError> {
        let parts = PeriodParts::month(year, month);
        // Reject a bad period before touching any subject.
        self.engine.resolve_period(PeriodType::Month, &parts)?;

        let mut summary = SweepSummary {
            period: format!("{:04}-{:02}", year, month),
            ..Default::default()
        };
        let page_size = self.config.page_size.max(1);
        let progress_every = self.config.progress_every.max(1);
        let deps = &self.engine.deps;

        info!(period = %summary.period, page_size, "Sweep started");

        let mut cursor: Option<Uuid> = None;
        let mut page: Vec<Uuid> = Vec::with_capacity(page_size as usize);
        loop {
            page.extend(deps.profiles.subject_ids_after(cursor, page_size).await?);
            let Some(last) = page.last().copied() else {
                break;
            };

            for subject_id in page.drain(..) {
                summary.processed += 1;
                match self
                    .engine
                    .generate_report(subject_id, PeriodType::Month, &parts, Basis::Paid, true)
                    .await
                {
                    Ok(_) => {
                        summary.succeeded += 1;
                        SWEEP_SUBJECTS_TOTAL.with_label_values(&["ok"]).inc();
                    }
                    Err(e) => {
                        summary.failed += 1;
                        summary.failed_subjects.push(subject_id);
                        SWEEP_SUBJECTS_TOTAL.with_label_values(&["error"]).inc();
                        warn!(subject_id = %subject_id, error = %e, "Sweep failed for subject");
                        deps.alerts
                            .emit(Alert::SweepSubjectFailed {
                                subject_id,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }

                if summary.processed % progress_every == 0 {
                    info!(
                        processed = summary.processed,
                        failed = summary.failed,
                        "Sweep progress"
                    );
                }
            }

            cursor = Some(last);
            page.shrink_to(page_size as usize);
        }

        info!(
            period = %summary.period,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Sweep finished"
        );
        deps.alerts
            .emit(Alert::SweepSummary {
                period: summary.period.clone(),
                processed: summary.processed,
                succeeded: summary.succeeded,
                failed: summary.failed,
            })
            .await;

        Ok(summary)
    }

    /// Run the sweep, retrying the whole run on transient infrastructure
    /// failures.
    pub async fn run_month_with_retry(
        &self,
        year: i32,
        month: u32,
    ) -> Result<SweepSummary, AppError> {
        let config = RetryConfig::batch(self.config.max_retries);
        retry_with_backoff(&config, "month_end_sweep", || self.run_month(year, month)).await
    }
}
