//! Asynchronous transmission of fiscal records to the tax authority.

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{FiscalSettings, WorkerConfig};
use crate::models::{FiscalRecord, TransmissionStatus};
use crate::services::metrics::record_transmission;
use crate::services::{
    Alert, AlertSink, FiscalStore, QueuedTask, TaskQueue, TransmissionUpdate, FISCAL_TRANSMIT_TASK,
};

/// What the authority receives for one record.
#[derive(Debug, Clone, Serialize)]
pub struct FiscalSubmission {
    pub fiscal_code: String,
    pub invoice_id: Uuid,
    pub subject_id: Uuid,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub vat_breakdown: serde_json::Value,
    pub signature: String,
    pub signed_utc: DateTime<Utc>,
}

impl From<&FiscalRecord> for FiscalSubmission {
    fn from(record: &FiscalRecord) -> Self {
        Self {
            fiscal_code: record.fiscal_code.clone(),
            invoice_id: record.invoice_id,
            subject_id: record.subject_id,
            amount: record.amount,
            vat_amount: record.vat_amount,
            vat_breakdown: record.vat_breakdown.clone(),
            signature: record.signature.clone(),
            signed_utc: record.signed_utc,
        }
    }
}

/// Authority verdict on a submission. Transport failures are errors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorityDecision {
    Validated { transaction_id: String },
    /// Accepted for processing later.
    Deferred { transaction_id: Option<String> },
    Rejected { reason: String },
}

#[async_trait]
pub trait FiscalAuthority: Send + Sync {
    async fn submit(&self, submission: &FiscalSubmission) -> Result<AuthorityDecision, AppError>;
}

#[derive(Debug, Deserialize)]
struct AuthorityResponse {
    status: String,
    transaction_id: Option<String>,
    message: Option<String>,
}

/// HTTP client for the authority's invoice endpoint.
pub struct HttpFiscalAuthority {
    client: Client,
    base_url: String,
    api_key: Secret<String>,
    max_elapsed: Duration,
}

impl HttpFiscalAuthority {
    pub fn new(
        base_url: &str,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build authority client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            max_elapsed: Duration::from_secs(30),
        })
    }

    /// Build a client from settings, or `None` when no endpoint is configured.
    pub fn from_settings(
        settings: &FiscalSettings,
        timeout: Duration,
    ) -> Result<Option<Self>, AppError> {
        match (&settings.authority_url, &settings.api_key) {
            (Some(url), Some(key)) => Ok(Some(Self::new(url, key.clone(), timeout)?)),
            _ => Ok(None),
        }
    }

    async fn post_once(
        &self,
        submission: &FiscalSubmission,
    ) -> Result<AuthorityDecision, backoff::Error<AppError>> {
        let url = format!("{}/v1/invoices", self.base_url);
        let transport = |e: reqwest::Error| {
            backoff::Error::transient(AppError::Transmission(anyhow::Error::new(e)))
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(submission)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        debug!(status = %status, "Authority responded");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(backoff::Error::transient(AppError::Transmission(
                anyhow::anyhow!("authority returned {}: {}", status, body),
            )));
        }
        if status.is_client_error() {
            return Ok(AuthorityDecision::Rejected {
                reason: format!("{}: {}", status, body),
            });
        }

        let parsed: AuthorityResponse = serde_json::from_str(&body).map_err(|e| {
            backoff::Error::permanent(AppError::Transmission(anyhow::anyhow!(
                "unreadable authority response: {}",
                e
            )))
        })?;

        Ok(match (parsed.status.as_str(), parsed.transaction_id) {
            ("validated", Some(transaction_id)) => AuthorityDecision::Validated { transaction_id },
            ("rejected", _) => AuthorityDecision::Rejected {
                reason: parsed
                    .message
                    .unwrap_or_else(|| "rejected without reason".to_string()),
            },
            (_, transaction_id) => AuthorityDecision::Deferred { transaction_id },
        })
    }
}

#[async_trait]
impl FiscalAuthority for HttpFiscalAuthority {
    #[instrument(skip(self, submission), fields(fiscal_code = %submission.fiscal_code))]
    async fn submit(&self, submission: &FiscalSubmission) -> Result<AuthorityDecision, AppError> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };
        retry(backoff, || self.post_once(submission)).await
    }
}

/// Consumes `fiscal.transmit` tasks. Safe to re-run for the same code.
pub struct TransmissionWorker {
    records: Arc<dyn FiscalStore>,
    queue: Arc<dyn TaskQueue>,
    authority: Option<Arc<dyn FiscalAuthority>>,
    alerts: Arc<dyn AlertSink>,
    accredited: bool,
    config: WorkerConfig,
    retry: RetryConfig,
}

impl TransmissionWorker {
    pub fn new(
        records: Arc<dyn FiscalStore>,
        queue: Arc<dyn TaskQueue>,
        authority: Option<Arc<dyn FiscalAuthority>>,
        alerts: Arc<dyn AlertSink>,
        accredited: bool,
        config: WorkerConfig,
    ) -> Self {
        Self {
            records,
            queue,
            authority,
            alerts,
            accredited,
            config,
            retry: RetryConfig {
                initial_backoff: Duration::from_secs(5),
                max_backoff: Duration::from_secs(600),
                ..RetryConfig::default()
            },
        }
    }

    /// Override the re-delivery delay profile.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Poll until cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        if !self.config.enabled {
            info!("Transmission worker disabled by configuration");
            return;
        }
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            lease_ms = self.config.lease_ms,
            "Transmission worker started"
        );

        loop {
            match self.run_once().await {
                Ok(0) => {}
                Ok(n) => debug!(processed = n, "Transmission batch done"),
                Err(e) => error!(error = %e, "Transmission poll failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Transmission worker shutting down");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }
    }

    /// Claim and process one batch. Returns how many tasks were handled.
    pub async fn run_once(&self) -> Result<usize, AppError> {
        let tasks = self
            .queue
            .claim(
                FISCAL_TRANSMIT_TASK,
                self.config.batch_size,
                self.config.lease(),
            )
            .await?;
        let count = tasks.len();
        for task in tasks {
            if let Err(e) = self.process(&task).await {
                warn!(task_id = %task.task_id, error = %e, "Transmission task errored");
                // An unreleased task comes back once its lease runs out.
                if let Err(release) = self
                    .queue
                    .retry_later(task.task_id, self.retry.backoff_duration(0), &e.to_string())
                    .await
                {
                    error!(
                        task_id = %task.task_id,
                        error = %release,
                        "Failed to release transmission task"
                    );
                }
            }
        }
        Ok(count)
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id, attempt = task.attempts))]
    async fn process(&self, task: &QueuedTask) -> Result<(), AppError> {
        let Some(fiscal_code) = task.arg_str("fiscal_code") else {
            warn!("Task has no fiscal_code");
            return self.queue.fail(task.task_id, "missing fiscal_code").await;
        };

        let Some(record) = self.records.find_by_code(fiscal_code).await? else {
            warn!(fiscal_code, "No fiscal record for task");
            return self
                .queue
                .fail(task.task_id, "unknown fiscal code")
                .await;
        };

        let status = record.parsed_status();
        if status.is_final() {
            debug!(fiscal_code, status = %status, "Record already settled");
            return self.queue.complete(task.task_id).await;
        }

        let Some(authority) = &self.authority else {
            self.mark(fiscal_code, TransmissionStatus::PendingConfiguration, None, None, false)
                .await?;
            record_transmission("pending_configuration");
            return self.queue.complete(task.task_id).await;
        };

        if !self.accredited {
            self.mark(fiscal_code, TransmissionStatus::PendingExternal, None, None, false)
                .await?;
            record_transmission("not_accredited");
            return self.queue.complete(task.task_id).await;
        }

        match authority.submit(&FiscalSubmission::from(&record)).await {
            Ok(AuthorityDecision::Validated { transaction_id }) => {
                self.mark(
                    fiscal_code,
                    TransmissionStatus::Validated,
                    Some(transaction_id.clone()),
                    None,
                    true,
                )
                .await?;
                record_transmission("validated");
                info!(fiscal_code, transaction_id = %transaction_id, "Fiscal record validated");
                self.queue.complete(task.task_id).await
            }
            Ok(AuthorityDecision::Deferred { transaction_id }) => {
                self.mark(
                    fiscal_code,
                    TransmissionStatus::PendingExternal,
                    transaction_id,
                    None,
                    true,
                )
                .await?;
                record_transmission("deferred");
                info!(fiscal_code, "Authority deferred validation");
                self.queue.complete(task.task_id).await
            }
            Ok(AuthorityDecision::Rejected { reason }) => {
                self.fail_record(fiscal_code, &reason).await?;
                record_transmission("rejected");
                self.queue.complete(task.task_id).await
            }
            Err(e) if task.attempts >= self.config.max_attempts => {
                let reason = e.to_string();
                self.fail_record(fiscal_code, &reason).await?;
                record_transmission("exhausted");
                self.queue.fail(task.task_id, &reason).await
            }
            Err(e) => {
                let reason = e.to_string();
                self.mark(
                    fiscal_code,
                    TransmissionStatus::Queued,
                    None,
                    Some(reason.clone()),
                    true,
                )
                .await?;
                record_transmission("retry");
                let attempt = u32::try_from(task.attempts.max(0)).unwrap_or(u32::MAX);
                let delay = self.retry.backoff_duration(attempt);
                warn!(
                    fiscal_code,
                    error = %reason,
                    delay_ms = delay.as_millis() as u64,
                    "Transmission failed, will retry"
                );
                self.queue.retry_later(task.task_id, delay, &reason).await
            }
        }
    }

    async fn fail_record(&self, fiscal_code: &str, reason: &str) -> Result<(), AppError> {
        self.mark(
            fiscal_code,
            TransmissionStatus::Failed,
            None,
            Some(reason.to_string()),
            true,
        )
        .await?;
        error!(fiscal_code, error = %reason, "Fiscal transmission failed");
        self.alerts
            .emit(Alert::TransmissionFailed {
                fiscal_code: fiscal_code.to_string(),
                error: reason.to_string(),
            })
            .await;
        Ok(())
    }

    async fn mark(
        &self,
        fiscal_code: &str,
        status: TransmissionStatus,
        external_transaction_id: Option<String>,
        last_error: Option<String>,
        count_attempt: bool,
    ) -> Result<(), AppError> {
        self.records
            .update_transmission(
                fiscal_code,
                &TransmissionUpdate {
                    status,
                    external_transaction_id,
                    last_error,
                    count_attempt,
                },
            )
            .await?;
        Ok(())
    }
}
