//! Fiscalization: fiscal codes, signatures, QR payloads and transmission.

pub mod code;
pub mod pipeline;
pub mod qr;
pub mod signature;
pub mod transmission;

pub use code::fiscal_code;
pub use pipeline::{FiscalInvoice, FiscalPipeline};
pub use qr::{decode_qr, encode_qr, QrContent};
pub use signature::{sign, verify_record, verify_signature, SignedFields};
pub use transmission::{
    AuthorityDecision, FiscalAuthority, FiscalSubmission, HttpFiscalAuthority, TransmissionWorker,
};
