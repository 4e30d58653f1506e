//! Fiscal record signatures.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::error::AppError;
use service_core::utils::{sign_canonical, verify_canonical};
use uuid::Uuid;

use crate::engine::round_money;
use crate::models::FiscalRecord;

/// Invoice fields covered by the signature, besides the fiscal code.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedFields {
    pub subject_id: Uuid,
    pub counterparty_name: Option<String>,
    pub amount: Decimal,
    pub vat_amount: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl SignedFields {
    fn payload(&self, fiscal_code: &str) -> Value {
        json!({
            "fiscal_code": fiscal_code,
            "subject_id": self.subject_id.to_string(),
            "counterparty_name": self.counterparty_name.as_deref().unwrap_or(""),
            "amount": format!("{:.2}", round_money(self.amount)),
            "vat_amount": format!("{:.2}", round_money(self.vat_amount)),
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

pub fn sign(secret: &str, fiscal_code: &str, fields: &SignedFields) -> Result<String, AppError> {
    sign_canonical(secret, &fields.payload(fiscal_code)).map_err(AppError::ConfigError)
}

/// True only when `signature` was produced over exactly these fields.
pub fn verify_signature(
    secret: &str,
    fiscal_code: &str,
    signature: &str,
    fields: &SignedFields,
) -> Result<bool, AppError> {
    verify_canonical(secret, &fields.payload(fiscal_code), signature).map_err(AppError::ConfigError)
}

/// Check a stored record against its own signature.
pub fn verify_record(
    secret: &str,
    record: &FiscalRecord,
    counterparty_name: Option<String>,
) -> Result<bool, AppError> {
    let fields = SignedFields {
        subject_id: record.subject_id,
        counterparty_name,
        amount: record.amount,
        vat_amount: record.vat_amount,
        timestamp: record.signed_utc,
    };
    verify_signature(secret, &record.fiscal_code, &record.signature, &fields)
}
