//! Persistence seams. `Database` backs them with PostgreSQL and
//! `InMemoryStore` with process memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{
    FiscalRecord, LedgerEntry, NewFiscalRecord, ReportKey, TaxProfile, TaxReport,
    TransmissionStatus,
};

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, subject_id: Uuid) -> Result<Option<TaxProfile>, AppError>;

    /// Insert or supersede the subject's profile.
    async fn save_profile(&self, profile: &TaxProfile) -> Result<TaxProfile, AppError>;

    /// Forward-only page of subject ids strictly after `after`, ascending.
    async fn subject_ids_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError>;
}

/// Read-only view of the invoicing ledger.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Entries created in `[from, to)`, excluding refunded, cancelled and void.
    async fn entries_in_window(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, AppError>;

    async fn get_entry(
        &self,
        subject_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<LedgerEntry>, AppError>;
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn find_report(&self, key: &ReportKey) -> Result<Option<TaxReport>, AppError>;

    async fn get_report(
        &self,
        subject_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<TaxReport>, AppError>;

    /// Create the report, or overwrite the figures of the one already stored
    /// under the same key. Identity is kept and `pdf_url` cleared.
    async fn upsert_report(&self, report: &TaxReport) -> Result<TaxReport, AppError>;

    async fn set_artifact_url(&self, report_id: Uuid, url: &str) -> Result<(), AppError>;
}

#[async_trait]
pub trait FiscalStore: Send + Sync {
    async fn find_by_invoice(&self, invoice_id: Uuid) -> Result<Option<FiscalRecord>, AppError>;

    async fn find_by_code(&self, fiscal_code: &str) -> Result<Option<FiscalRecord>, AppError>;

    /// Insert a record. Fails with `Conflict` when the invoice or fiscal
    /// code already has one.
    async fn insert_record(&self, record: &NewFiscalRecord) -> Result<FiscalRecord, AppError>;

    async fn update_transmission(
        &self,
        fiscal_code: &str,
        update: &TransmissionUpdate,
    ) -> Result<FiscalRecord, AppError>;
}

/// Outcome of a transmission step.
#[derive(Debug, Clone)]
pub struct TransmissionUpdate {
    pub status: TransmissionStatus,
    pub external_transaction_id: Option<String>,
    pub last_error: Option<String>,
    pub count_attempt: bool,
}

impl TransmissionUpdate {
    pub fn status(status: TransmissionStatus) -> Self {
        Self {
            status,
            external_transaction_id: None,
            last_error: None,
            count_attempt: false,
        }
    }
}
