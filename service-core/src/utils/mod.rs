pub mod signature;

pub use signature::{canonical_json, sha256_hex, sign_canonical, verify_canonical};
