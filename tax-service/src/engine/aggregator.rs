//! Basis-aware revenue/expense aggregation.

use chrono::{DateTime, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::DateRange;
use crate::models::{Basis, EntryType, LedgerEntry};
use crate::services::LedgerSource;

/// Revenue, expenses and pre-COGS profit for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub revenue: Decimal,
    pub expenses: Decimal,
    /// `revenue - expenses`. May be negative; COGS and the zero floor are
    /// applied by the caller.
    pub profit: Decimal,
    pub revenue_entries: usize,
    pub expense_entries: usize,
}

impl Basis {
    /// Whether an entry with this status counts under the basis.
    pub fn includes(&self, entry: &LedgerEntry) -> bool {
        let status = entry.parsed_status();
        if status.is_voided() {
            return false;
        }
        match self {
            Basis::Paid => status.is_paid(),
            Basis::All => true,
        }
    }
}

/// Whether `created` falls in the half-open window `[from, to)`.
pub fn in_window(created: DateTime<Utc>, window: (DateTime<Utc>, DateTime<Utc>)) -> bool {
    created >= window.0 && created < window.1
}

/// Sum entries in the window. Revenue follows the basis, net of discount;
/// expenses count only when paid.
pub fn aggregate_entries(
    entries: &[LedgerEntry],
    window: (DateTime<Utc>, DateTime<Utc>),
    basis: Basis,
) -> LedgerTotals {
    let mut totals = LedgerTotals::default();

    for entry in entries.iter().filter(|e| in_window(e.created_utc, window)) {
        match entry.parsed_type() {
            Some(EntryType::Revenue) if basis.includes(entry) => {
                totals.revenue += entry.net_amount();
                totals.revenue_entries += 1;
            }
            Some(EntryType::Expense) if entry.parsed_status().is_paid() => {
                totals.expenses += entry.amount;
                totals.expense_entries += 1;
            }
            _ => {}
        }
    }

    totals.profit = totals.revenue - totals.expenses;
    totals
}

/// Reads a subject's ledger and aggregates it in the reporting timezone.
#[derive(Clone)]
pub struct LedgerAggregator<'a> {
    ledger: &'a dyn LedgerSource,
    offset: FixedOffset,
}

impl<'a> LedgerAggregator<'a> {
    pub fn new(ledger: &'a dyn LedgerSource, offset: FixedOffset) -> Self {
        Self { ledger, offset }
    }

    /// Entries created inside the range, in the reporting timezone.
    #[instrument(skip(self), fields(subject_id = %subject_id, range = %range))]
    pub async fn entries(
        &self,
        subject_id: Uuid,
        range: &DateRange,
    ) -> Result<(Vec<LedgerEntry>, (DateTime<Utc>, DateTime<Utc>)), AppError> {
        let window = range.utc_window(self.offset);
        let entries = self
            .ledger
            .entries_in_window(subject_id, window.0, window.1)
            .await?;
        debug!(count = entries.len(), "Ledger entries loaded");
        Ok((entries, window))
    }

    pub async fn aggregate(
        &self,
        subject_id: Uuid,
        range: &DateRange,
        basis: Basis,
    ) -> Result<LedgerTotals, AppError> {
        let (entries, window) = self.entries(subject_id, range).await?;
        Ok(aggregate_entries(&entries, window, basis))
    }
}
