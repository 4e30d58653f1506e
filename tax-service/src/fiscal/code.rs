//! Fiscal code derivation.
//!
//! Codes look like `NGTX-20260514-3FA9-0C11-B7D2`: a prefix, the invoice
//! creation date, and twelve hex digits of a digest over the invoice identity.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::utils::sha256_hex;
use uuid::Uuid;

use crate::engine::round_money;

const DIGEST_CHARS: usize = 12;
const GROUP: usize = 4;

/// Derive the fiscal code. Same inputs always give the same code.
pub fn fiscal_code(
    prefix: &str,
    subject_id: Uuid,
    invoice_id: Uuid,
    amount: Decimal,
    created: NaiveDate,
) -> String {
    let material = format!(
        "{}|{}|{:.2}|{}",
        subject_id,
        invoice_id,
        round_money(amount),
        created.format("%Y-%m-%d")
    );
    let digest = sha256_hex(&material).to_uppercase();

    let groups: Vec<&str> = digest.as_bytes()[..DIGEST_CHARS]
        .chunks(GROUP)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    format!("{}-{}-{}", prefix, created.format("%Y%m%d"), groups.join("-"))
}
