//! Domain models for tax-service.

mod entry;
mod fiscal;
mod plan;
mod profile;
mod report;

pub use entry::{EntryType, LedgerEntry, PaymentStatus, VatCategory};
pub use fiscal::{FiscalRecord, NewFiscalRecord, TransmissionStatus, VatBreakdown};
pub use plan::{Capabilities, PlanTier};
pub use profile::{BusinessSize, TaxProfile, UpdateRegistration};
pub use report::{Basis, PeriodParts, PeriodType, ReportKey, TaxReport};
