//! Process-memory backing for every store seam. Used for local runs without
//! PostgreSQL and by the test suite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{FiscalRecord, LedgerEntry, NewFiscalRecord, ReportKey, TaxProfile, TaxReport};
use crate::services::alerts::{Alert, AlertSink};
use crate::services::queue::{delay_to_chrono, QueuedTask, TaskQueue, TaskState};
use crate::services::store::{
    FiscalStore, LedgerSource, ProfileStore, ReportStore, TransmissionUpdate,
};

#[derive(Default)]
struct Inner {
    profiles: BTreeMap<Uuid, TaxProfile>,
    entries: Vec<LedgerEntry>,
    reports: HashMap<ReportKey, TaxReport>,
    fiscal: Vec<FiscalRecord>,
    tasks: Vec<QueuedTask>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a ledger entry. The ledger is owned elsewhere in production, so
    /// there is no trait method for this.
    pub async fn insert_entry(&self, entry: LedgerEntry) {
        self.inner.lock().await.entries.push(entry);
    }

    pub async fn set_entry_status(&self, entry_id: Uuid, status: &str) {
        let mut inner = self.inner.lock().await;
        if let Some(entry) = inner.entries.iter_mut().find(|e| e.entry_id == entry_id) {
            entry.payment_status = status.to_string();
        }
    }

    pub async fn report_count(&self) -> usize {
        self.inner.lock().await.reports.len()
    }

    pub async fn fiscal_count(&self) -> usize {
        self.inner.lock().await.fiscal.len()
    }

    /// Every task ever enqueued, in any state.
    pub async fn tasks(&self) -> Vec<QueuedTask> {
        self.inner.lock().await.tasks.clone()
    }
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_profile(&self, subject_id: Uuid) -> Result<Option<TaxProfile>, AppError> {
        Ok(self.inner.lock().await.profiles.get(&subject_id).cloned())
    }

    async fn save_profile(&self, profile: &TaxProfile) -> Result<TaxProfile, AppError> {
        let mut inner = self.inner.lock().await;
        let mut saved = profile.clone();
        if let Some(existing) = inner.profiles.get(&profile.subject_id) {
            saved.created_utc = existing.created_utc;
        }
        inner.profiles.insert(saved.subject_id, saved.clone());
        Ok(saved)
    }

    async fn subject_ids_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let inner = self.inner.lock().await;
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        let ids = match after {
            Some(cursor) => inner
                .profiles
                .range((std::ops::Bound::Excluded(cursor), std::ops::Bound::Unbounded))
                .map(|(id, _)| *id)
                .take(limit)
                .collect(),
            None => inner.profiles.keys().copied().take(limit).collect(),
        };
        Ok(ids)
    }
}

#[async_trait]
impl LedgerSource for InMemoryStore {
    async fn entries_in_window(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let inner = self.inner.lock().await;
        let mut entries: Vec<LedgerEntry> = inner
            .entries
            .iter()
            .filter(|e| {
                e.subject_id == subject_id
                    && e.created_utc >= from
                    && e.created_utc < to
                    && !e.parsed_status().is_voided()
            })
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_utc);
        Ok(entries)
    }

    async fn get_entry(
        &self,
        subject_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<LedgerEntry>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .iter()
            .find(|e| e.subject_id == subject_id && e.entry_id == entry_id)
            .cloned())
    }
}

#[async_trait]
impl ReportStore for InMemoryStore {
    async fn find_report(&self, key: &ReportKey) -> Result<Option<TaxReport>, AppError> {
        Ok(self.inner.lock().await.reports.get(key).cloned())
    }

    async fn get_report(
        &self,
        subject_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<TaxReport>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .reports
            .values()
            .find(|r| r.subject_id == subject_id && r.report_id == report_id)
            .cloned())
    }

    async fn upsert_report(&self, report: &TaxReport) -> Result<TaxReport, AppError> {
        let key = report.key()?;
        let mut inner = self.inner.lock().await;
        let saved = match inner.reports.get_mut(&key) {
            Some(existing) => {
                existing.overwrite_figures(report);
                existing.clone()
            }
            None => {
                let mut fresh = report.clone();
                fresh.pdf_url = None;
                inner.reports.insert(key, fresh.clone());
                fresh
            }
        };
        Ok(saved)
    }

    async fn set_artifact_url(&self, report_id: Uuid, url: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        if let Some(report) = inner.reports.values_mut().find(|r| r.report_id == report_id) {
            report.pdf_url = Some(url.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl FiscalStore for InMemoryStore {
    async fn find_by_invoice(&self, invoice_id: Uuid) -> Result<Option<FiscalRecord>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner.fiscal.iter().find(|r| r.invoice_id == invoice_id).cloned())
    }

    async fn find_by_code(&self, fiscal_code: &str) -> Result<Option<FiscalRecord>, AppError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .fiscal
            .iter()
            .find(|r| r.fiscal_code == fiscal_code)
            .cloned())
    }

    async fn insert_record(&self, record: &NewFiscalRecord) -> Result<FiscalRecord, AppError> {
        let mut inner = self.inner.lock().await;
        if inner
            .fiscal
            .iter()
            .any(|r| r.invoice_id == record.invoice_id || r.fiscal_code == record.fiscal_code)
        {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Fiscal record already exists for invoice {} or code {}",
                record.invoice_id,
                record.fiscal_code
            )));
        }

        let now = Utc::now();
        let saved = FiscalRecord {
            record_id: Uuid::new_v4(),
            invoice_id: record.invoice_id,
            subject_id: record.subject_id,
            fiscal_code: record.fiscal_code.clone(),
            signature: record.signature.clone(),
            qr_payload: record.qr_payload.clone(),
            amount: record.amount,
            vat_amount: record.vat_amount,
            vat_breakdown: serde_json::to_value(&record.vat_breakdown)?,
            signed_utc: record.signed_utc,
            transmission_status: record.transmission_status.as_str().to_string(),
            transmission_attempts: 0,
            external_transaction_id: None,
            last_error: None,
            created_utc: now,
            updated_utc: now,
        };
        inner.fiscal.push(saved.clone());
        Ok(saved)
    }

    async fn update_transmission(
        &self,
        fiscal_code: &str,
        update: &TransmissionUpdate,
    ) -> Result<FiscalRecord, AppError> {
        let mut inner = self.inner.lock().await;
        let record = inner
            .fiscal
            .iter_mut()
            .find(|r| r.fiscal_code == fiscal_code)
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("Fiscal record {} not found", fiscal_code))
            })?;

        record.transmission_status = update.status.as_str().to_string();
        if update.external_transaction_id.is_some() {
            record.external_transaction_id = update.external_transaction_id.clone();
        }
        record.last_error = update.last_error.clone();
        if update.count_attempt {
            record.transmission_attempts += 1;
        }
        record.updated_utc = Utc::now();
        Ok(record.clone())
    }
}

#[async_trait]
impl TaskQueue for InMemoryStore {
    async fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<Uuid, AppError> {
        let now = Utc::now();
        let task = QueuedTask {
            task_id: Uuid::new_v4(),
            task_name: task_name.to_string(),
            payload,
            state: TaskState::Ready.as_str().to_string(),
            attempts: 0,
            last_error: None,
            available_utc: now,
            claimed_utc: None,
            created_utc: now,
        };
        let task_id = task.task_id;
        self.inner.lock().await.tasks.push(task);
        Ok(task_id)
    }

    async fn claim(
        &self,
        task_name: &str,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedTask>, AppError> {
        let now = Utc::now();
        let expired_before = now - delay_to_chrono(lease);
        let limit = usize::try_from(limit.max(0)).unwrap_or(0);
        let mut inner = self.inner.lock().await;
        let mut claimed = Vec::new();
        for task in inner.tasks.iter_mut() {
            if claimed.len() >= limit {
                break;
            }
            if task.task_name != task_name {
                continue;
            }
            let due = match task.parsed_state() {
                TaskState::Ready => task.available_utc <= now,
                TaskState::Claimed => task.claimed_utc.is_some_and(|at| at <= expired_before),
                TaskState::Done | TaskState::Dead => false,
            };
            if due {
                task.state = TaskState::Claimed.as_str().to_string();
                task.attempts += 1;
                task.claimed_utc = Some(now);
                claimed.push(task.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), AppError> {
        self.set_task(task_id, TaskState::Done, None, None).await
    }

    async fn retry_later(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), AppError> {
        let available = Utc::now() + delay_to_chrono(delay);
        self.set_task(task_id, TaskState::Ready, Some(error), Some(available))
            .await
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), AppError> {
        self.set_task(task_id, TaskState::Dead, Some(error), None)
            .await
    }
}

impl InMemoryStore {
    async fn set_task(
        &self,
        task_id: Uuid,
        state: TaskState,
        error: Option<&str>,
        available: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.task_id == task_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Task {} not found", task_id)))?;
        task.state = state.as_str().to_string();
        task.last_error = error.map(str::to_string);
        task.claimed_utc = None;
        if let Some(at) = available {
            task.available_utc = at;
        }
        Ok(())
    }
}

/// Alert sink that keeps every alert for later inspection.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn emit(&self, alert: Alert) {
        self.alerts.lock().await.push(alert);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LEASE: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_claim_respects_availability_and_limit() {
        let store = InMemoryStore::new();
        for i in 0..3 {
            store.enqueue("t", json!({ "i": i })).await.unwrap();
        }
        store.enqueue("other", json!({})).await.unwrap();

        let first = store.claim("t", 2, LEASE).await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(first.iter().all(|t| t.attempts == 1));

        let second = store.claim("t", 10, LEASE).await.unwrap();
        assert_eq!(second.len(), 1);

        store
            .retry_later(first[0].task_id, Duration::from_secs(3600), "later")
            .await
            .unwrap();
        assert!(store.claim("t", 10, LEASE).await.unwrap().is_empty());

        store
            .retry_later(first[1].task_id, Duration::ZERO, "now")
            .await
            .unwrap();
        let again = store.claim("t", 10, LEASE).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].attempts, 2);
    }

    #[tokio::test]
    async fn test_expired_claim_is_redelivered() {
        let store = InMemoryStore::new();
        let task_id = store.enqueue("t", json!({})).await.unwrap();

        let first = store.claim("t", 10, LEASE).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(first[0].claimed_utc.is_some());

        // Lease still held
        assert!(store.claim("t", 10, LEASE).await.unwrap().is_empty());

        // Claimer went away without releasing
        let again = store.claim("t", 10, Duration::ZERO).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].task_id, task_id);
        assert_eq!(again[0].attempts, 2);

        store.complete(task_id).await.unwrap();
        assert!(store.claim("t", 10, Duration::ZERO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subject_paging_is_forward_only() {
        let store = InMemoryStore::new();
        let mut ids: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            let now = Utc::now();
            store
                .save_profile(&TaxProfile {
                    subject_id: *id,
                    plan_tier: "business".to_string(),
                    annual_turnover: Default::default(),
                    fixed_assets: Default::default(),
                    tax_id: None,
                    vat_number: None,
                    fiscal_merchant_id: None,
                    business_size: "small".to_string(),
                    created_utc: now,
                    updated_utc: now,
                })
                .await
                .unwrap();
        }
        ids.sort();

        let page1 = store.subject_ids_after(None, 2).await.unwrap();
        assert_eq!(page1, ids[..2].to_vec());
        let page2 = store.subject_ids_after(Some(page1[1]), 2).await.unwrap();
        assert_eq!(page2, ids[2..4].to_vec());
        let page3 = store.subject_ids_after(Some(page2[1]), 2).await.unwrap();
        assert_eq!(page3, ids[4..].to_vec());
    }
}
