//! Fiscalization of revenue invoices.
//!
//! `unfiscalized -> fiscal_code_generated -> signed -> queued_for_transmission`.
//! Transmission itself happens in [`super::TransmissionWorker`].

use chrono::{FixedOffset, SubsecRound, Utc};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::code::fiscal_code;
use super::qr::encode_qr;
use super::signature::{sign, verify_record, SignedFields};
use crate::config::FiscalSettings;
use crate::engine::round_money;
use crate::models::{
    EntryType, FiscalRecord, LedgerEntry, NewFiscalRecord, TransmissionStatus, VatBreakdown,
};
use crate::services::metrics::FISCAL_RECORDS_TOTAL;
use crate::services::{
    FiscalStore, LedgerSource, TaskQueue, TransmissionUpdate, FISCAL_TRANSMIT_TASK,
};

/// Invoice to fiscalize, addressed by its ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalInvoice {
    pub subject_id: Uuid,
    pub invoice_id: Uuid,
}

#[derive(Clone)]
pub struct FiscalPipeline {
    records: Arc<dyn FiscalStore>,
    ledger: Arc<dyn LedgerSource>,
    queue: Arc<dyn TaskQueue>,
    settings: FiscalSettings,
    offset: FixedOffset,
}

impl FiscalPipeline {
    pub fn new(
        records: Arc<dyn FiscalStore>,
        ledger: Arc<dyn LedgerSource>,
        queue: Arc<dyn TaskQueue>,
        settings: FiscalSettings,
        offset: FixedOffset,
    ) -> Self {
        Self {
            records,
            ledger,
            queue,
            settings,
            offset,
        }
    }

    /// Create the invoice's fiscal record and hand it to the transmission
    /// queue. An invoice that already has a record gets that record back
    /// unchanged and nothing is enqueued.
    #[instrument(skip(self), fields(subject_id = %invoice.subject_id, invoice_id = %invoice.invoice_id))]
    pub async fn fiscalize(&self, invoice: &FiscalInvoice) -> Result<FiscalRecord, AppError> {
        if let Some(existing) = self.records.find_by_invoice(invoice.invoice_id).await? {
            info!(fiscal_code = %existing.fiscal_code, "Invoice already fiscalized");
            return Ok(existing);
        }

        let entry = self.load_revenue_entry(invoice).await?;

        let net = round_money(entry.net_amount());
        let vat = round_money(entry.vat_amount);
        let gross = net + vat;
        let created = entry.created_utc.with_timezone(&self.offset).date_naive();

        let code = fiscal_code(
            &self.settings.code_prefix,
            entry.subject_id,
            entry.entry_id,
            gross,
            created,
        );
        if let Some(other) = self.records.find_by_code(&code).await? {
            error!(
                fiscal_code = %code,
                other_invoice_id = %other.invoice_id,
                "Fiscal code collision"
            );
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "fiscal code {} already issued to invoice {}",
                code,
                other.invoice_id
            )));
        }
        info!(fiscal_code = %code, stage = "fiscal_code_generated", "Fiscalization stage");

        let signed_utc = Utc::now().trunc_subsecs(0);
        let fields = SignedFields {
            subject_id: entry.subject_id,
            counterparty_name: entry.counterparty_name.clone(),
            amount: gross,
            vat_amount: vat,
            timestamp: signed_utc,
        };
        let signature = sign(self.settings.signing_secret.expose_secret(), &code, &fields)?;
        let qr_payload = encode_qr(&code, &signature, gross, vat, signed_utc)?;
        info!(fiscal_code = %code, stage = "signed", "Fiscalization stage");

        let status = self.initial_status();
        let new_record = NewFiscalRecord {
            invoice_id: entry.entry_id,
            subject_id: entry.subject_id,
            fiscal_code: code.clone(),
            signature,
            qr_payload,
            amount: gross,
            vat_amount: vat,
            vat_breakdown: VatBreakdown {
                category: entry.parsed_vat_category().as_str().to_string(),
                net_amount: net,
                vat_amount: vat,
                gross_amount: gross,
            },
            signed_utc,
            transmission_status: status,
        };

        let record = match self.records.insert_record(&new_record).await {
            Ok(record) => record,
            // A concurrent call fiscalized the same invoice first.
            Err(AppError::Conflict(e)) => {
                warn!(error = %e, "Concurrent fiscalization, returning stored record");
                return self
                    .records
                    .find_by_invoice(invoice.invoice_id)
                    .await?
                    .ok_or(AppError::Conflict(e));
            }
            Err(e) => return Err(e),
        };
        FISCAL_RECORDS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();

        if status != TransmissionStatus::Queued {
            info!(fiscal_code = %code, status = %status, "Transmission not attempted");
            return Ok(record);
        }

        match self
            .queue
            .enqueue(FISCAL_TRANSMIT_TASK, json!({ "fiscal_code": code }))
            .await
        {
            Ok(task_id) => {
                info!(
                    fiscal_code = %code,
                    task_id = %task_id,
                    stage = "queued_for_transmission",
                    "Fiscalization stage"
                );
                Ok(record)
            }
            Err(e) => {
                warn!(fiscal_code = %code, error = %e, "Enqueue failed, record left pending");
                self.records
                    .update_transmission(
                        &code,
                        &TransmissionUpdate {
                            last_error: Some(e.to_string()),
                            ..TransmissionUpdate::status(TransmissionStatus::Pending)
                        },
                    )
                    .await
            }
        }
    }

    /// Re-queue a record that never reached the queue or ended `failed`.
    #[instrument(skip(self))]
    pub async fn requeue(&self, fiscal_code: &str) -> Result<FiscalRecord, AppError> {
        let record = self
            .records
            .find_by_code(fiscal_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Fiscal record {} not found", fiscal_code))
            })?;
        if record.parsed_status() == TransmissionStatus::Validated {
            return Ok(record);
        }

        // Queued before enqueueing so the worker never sees a settled status.
        let queued = self
            .records
            .update_transmission(
                fiscal_code,
                &TransmissionUpdate::status(TransmissionStatus::Queued),
            )
            .await?;
        self.queue
            .enqueue(FISCAL_TRANSMIT_TASK, json!({ "fiscal_code": fiscal_code }))
            .await?;
        Ok(queued)
    }

    /// Whether the stored record still matches its invoice and signature.
    #[instrument(skip(self))]
    pub async fn verify(&self, fiscal_code: &str) -> Result<bool, AppError> {
        let record = self
            .records
            .find_by_code(fiscal_code)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Fiscal record {} not found", fiscal_code))
            })?;
        let entry = self
            .ledger
            .get_entry(record.subject_id, record.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", record.invoice_id))
            })?;
        verify_record(
            self.settings.signing_secret.expose_secret(),
            &record,
            entry.counterparty_name,
        )
    }

    fn initial_status(&self) -> TransmissionStatus {
        if !self.settings.is_configured() {
            TransmissionStatus::PendingConfiguration
        } else if !self.settings.accredited {
            TransmissionStatus::PendingExternal
        } else {
            TransmissionStatus::Queued
        }
    }

    async fn load_revenue_entry(&self, invoice: &FiscalInvoice) -> Result<LedgerEntry, AppError> {
        let entry = self
            .ledger
            .get_entry(invoice.subject_id, invoice.invoice_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Invoice {} not found", invoice.invoice_id))
            })?;

        if entry.parsed_type() != Some(EntryType::Revenue) {
            return Err(AppError::validation(
                "entry_type",
                format!("only revenue entries can be fiscalized, got '{}'", entry.entry_type),
            ));
        }
        if entry.parsed_status().is_voided() {
            return Err(AppError::validation(
                "payment_status",
                format!("invoice is {}", entry.payment_status),
            ));
        }
        Ok(entry)
    }
}
