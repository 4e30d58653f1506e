//! Fiscal record model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Transmission state of a fiscal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionStatus {
    /// Created but not (or no longer) on the queue.
    Pending,
    Queued,
    Validated,
    Failed,
    /// Accepted by the authority for later processing, or integration not accredited.
    PendingExternal,
    /// No authority endpoint configured; nothing was attempted.
    PendingConfiguration,
}

impl TransmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransmissionStatus::Pending => "pending",
            TransmissionStatus::Queued => "queued",
            TransmissionStatus::Validated => "validated",
            TransmissionStatus::Failed => "failed",
            TransmissionStatus::PendingExternal => "pending_external",
            TransmissionStatus::PendingConfiguration => "pending_configuration",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "queued" => TransmissionStatus::Queued,
            "validated" => TransmissionStatus::Validated,
            "failed" => TransmissionStatus::Failed,
            "pending_external" => TransmissionStatus::PendingExternal,
            "pending_configuration" => TransmissionStatus::PendingConfiguration,
            _ => TransmissionStatus::Pending,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TransmissionStatus::Validated | TransmissionStatus::Failed
        )
    }
}

impl std::fmt::Display for TransmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// VAT split of a fiscalized invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatBreakdown {
    pub category: String,
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub gross_amount: Decimal,
}

/// Fiscal record, one per fiscalized revenue entry.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FiscalRecord {
    pub record_id: Uuid,
    pub invoice_id: Uuid,
    pub subject_id: Uuid,
    pub fiscal_code: String,
    pub signature: String,
    pub qr_payload: String,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub vat_breakdown: serde_json::Value,
    pub signed_utc: DateTime<Utc>,
    pub transmission_status: String,
    pub transmission_attempts: i32,
    pub external_transaction_id: Option<String>,
    pub last_error: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl FiscalRecord {
    pub fn parsed_status(&self) -> TransmissionStatus {
        TransmissionStatus::from_string(&self.transmission_status)
    }

    pub fn parsed_breakdown(&self) -> Option<VatBreakdown> {
        serde_json::from_value(self.vat_breakdown.clone()).ok()
    }
}

/// Input for inserting a fiscal record.
#[derive(Debug, Clone)]
pub struct NewFiscalRecord {
    pub invoice_id: Uuid,
    pub subject_id: Uuid,
    pub fiscal_code: String,
    pub signature: String,
    pub qr_payload: String,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub vat_breakdown: VatBreakdown,
    pub signed_utc: DateTime<Utc>,
    pub transmission_status: TransmissionStatus,
}
