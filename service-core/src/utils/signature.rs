//! HMAC-SHA256 signing over canonical JSON.
//!
//! The canonical form is compact JSON with object keys sorted at every level,
//! so logically equal payloads always produce the same bytes.

use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Serialize a JSON value with keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let mut sorted = Map::new();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }

    sort(value).to_string()
}

/// Hex SHA-256 digest of a string.
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Generate an HMAC-SHA256 signature over the canonical form of `payload`.
pub fn sign_canonical(secret: &str, payload: &Value) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(canonical_json(payload).as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a canonical signature using constant-time comparison.
pub fn verify_canonical(
    secret: &str,
    payload: &Value,
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = sign_canonical(secret, payload)?;

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = signature.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}
