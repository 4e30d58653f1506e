//! Compact QR payload for printed receipts.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::engine::round_money;

/// Leading characters of the signature carried in the QR code.
pub const SIGNATURE_PREFIX_LEN: usize = 16;

/// Decoded QR content. Keys are single letters to keep the code small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrContent {
    /// Fiscal code.
    #[serde(rename = "c")]
    pub fiscal_code: String,
    #[serde(rename = "s")]
    pub signature_prefix: String,
    #[serde(rename = "a")]
    pub amount: String,
    #[serde(rename = "v")]
    pub vat_amount: String,
    /// Unix seconds.
    #[serde(rename = "t")]
    pub timestamp: i64,
}

pub fn encode_qr(
    fiscal_code: &str,
    signature: &str,
    amount: Decimal,
    vat_amount: Decimal,
    timestamp: DateTime<Utc>,
) -> Result<String, AppError> {
    let content = QrContent {
        fiscal_code: fiscal_code.to_string(),
        signature_prefix: signature.chars().take(SIGNATURE_PREFIX_LEN).collect(),
        amount: format!("{:.2}", round_money(amount)),
        vat_amount: format!("{:.2}", round_money(vat_amount)),
        timestamp: timestamp.timestamp(),
    };
    let json = serde_json::to_vec(&content)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

pub fn decode_qr(payload: &str) -> Result<QrContent, AppError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| AppError::validation("qr_payload", format!("not base64url: {}", e)))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AppError::validation("qr_payload", format!("malformed content: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_payload_contents() {
        let ts = Utc.with_ymd_and_hms(2026, 5, 14, 9, 30, 0).unwrap();
        let sig = "a".repeat(64);
        let payload = encode_qr(
            "NGTX-20260514-AAAA-BBBB-CCCC",
            &sig,
            "10750".parse().unwrap(),
            "750".parse().unwrap(),
            ts,
        )
        .unwrap();

        assert!(payload
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let content = decode_qr(&payload).unwrap();
        assert_eq!(content.fiscal_code, "NGTX-20260514-AAAA-BBBB-CCCC");
        assert_eq!(content.signature_prefix.len(), SIGNATURE_PREFIX_LEN);
        assert_eq!(content.amount, "10750.00");
        assert_eq!(content.vat_amount, "750.00");
        assert_eq!(content.timestamp, ts.timestamp());
    }

    #[test]
    fn test_payload_fits_small_qr() {
        let payload = encode_qr(
            "NGTX-20260514-AAAA-BBBB-CCCC",
            &"f".repeat(64),
            "999999999.99".parse().unwrap(),
            "74999999.99".parse().unwrap(),
            Utc::now(),
        )
        .unwrap();
        // Version 10 QR, medium error correction, byte mode holds 213 bytes.
        assert!(payload.len() < 213);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_qr("***").unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "qr_payload"));
    }
}
