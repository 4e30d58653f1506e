//! Common test utilities for tax-service integration tests.
//!
//! Everything runs against the in-memory store, so no database is needed.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use secrecy::Secret;
use service_core::error::AppError;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tax_service::config::{FiscalSettings, TaxRules, WorkerConfig};
use tax_service::engine::{EngineDeps, TaxEngine};
use tax_service::fiscal::{
    AuthorityDecision, FiscalAuthority, FiscalPipeline, FiscalSubmission, TransmissionWorker,
};
use tax_service::models::{LedgerEntry, PlanTier, TaxReport};
use tax_service::services::{
    ArtifactRenderer, CogsFigures, InMemoryStore, InventoryBridge, LedgerSource, QueuedTask,
    RecordingAlertSink, TaskQueue,
};
use tokio::sync::Mutex;
use uuid::Uuid;

pub const SIGNING_SECRET: &str = "test-signing-secret";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,tax_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn d(s: &str) -> Decimal {
    s.parse().expect("valid decimal")
}

/// 10:00 UTC on the given day.
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 10, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn revenue(
    subject_id: Uuid,
    amount: &str,
    vat_category: Option<&str>,
    vat_amount: &str,
    status: &str,
    created_utc: DateTime<Utc>,
) -> LedgerEntry {
    LedgerEntry {
        entry_id: Uuid::new_v4(),
        subject_id,
        entry_type: "revenue".to_string(),
        amount: d(amount),
        discount: None,
        payment_status: status.to_string(),
        vat_category: vat_category.map(str::to_string),
        vat_amount: d(vat_amount),
        counterparty_name: Some("Adaeze Stores".to_string()),
        created_utc,
        due_date: None,
    }
}

pub fn expense(subject_id: Uuid, amount: &str, status: &str, created_utc: DateTime<Utc>) -> LedgerEntry {
    LedgerEntry {
        entry_id: Uuid::new_v4(),
        subject_id,
        entry_type: "expense".to_string(),
        amount: d(amount),
        discount: None,
        payment_status: status.to_string(),
        vat_category: None,
        vat_amount: Decimal::ZERO,
        counterparty_name: None,
        created_utc,
        due_date: None,
    }
}

/// Inventory bridge with fixed figures, or one that always fails.
pub struct FakeInventory {
    figures: Option<CogsFigures>,
}

impl FakeInventory {
    pub fn with_cogs(cogs: &str) -> Self {
        Self {
            figures: Some(CogsFigures {
                cogs_amount: d(cogs),
                purchases_amount: d(cogs),
                current_inventory_value: Decimal::ZERO,
            }),
        }
    }

    pub fn failing() -> Self {
        Self { figures: None }
    }
}

#[async_trait]
impl InventoryBridge for FakeInventory {
    async fn get_cogs(
        &self,
        _subject_id: Uuid,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<CogsFigures, AppError> {
        self.figures.clone().ok_or_else(|| {
            AppError::dependency("inventory", anyhow::anyhow!("inventory service down"))
        })
    }
}

/// Renderer that counts calls and can be switched off.
#[derive(Default)]
pub struct FakeRenderer {
    pub calls: AtomicUsize,
    pub broken: bool,
}

#[async_trait]
impl ArtifactRenderer for FakeRenderer {
    async fn render(&self, report: &TaxReport) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.broken {
            return Err(AppError::dependency(
                "artifact_renderer",
                anyhow::anyhow!("renderer unavailable"),
            ));
        }
        Ok(format!("https://files.test/reports/{}.pdf", report.report_id))
    }
}

/// Ledger that fails for chosen subjects and delegates otherwise.
pub struct FlakyLedger {
    pub inner: Arc<InMemoryStore>,
    pub failing: HashSet<Uuid>,
}

#[async_trait]
impl LedgerSource for FlakyLedger {
    async fn entries_in_window(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        if self.failing.contains(&subject_id) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "ledger read timed out"
            )));
        }
        self.inner.entries_in_window(subject_id, from, to).await
    }

    async fn get_entry(
        &self,
        subject_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<LedgerEntry>, AppError> {
        self.inner.get_entry(subject_id, entry_id).await
    }
}

/// Fiscal authority that replays scripted outcomes. Once the script runs out
/// every submission is validated.
#[derive(Default)]
pub struct ScriptedAuthority {
    script: Mutex<VecDeque<Result<AuthorityDecision, String>>>,
    pub submissions: Mutex<Vec<FiscalSubmission>>,
}

impl ScriptedAuthority {
    pub fn new(script: Vec<Result<AuthorityDecision, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            submissions: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl FiscalAuthority for ScriptedAuthority {
    async fn submit(&self, submission: &FiscalSubmission) -> Result<AuthorityDecision, AppError> {
        self.submissions.lock().await.push(submission.clone());
        match self.script.lock().await.pop_front() {
            Some(Ok(decision)) => Ok(decision),
            Some(Err(message)) => Err(AppError::Transmission(anyhow::anyhow!(message))),
            None => Ok(AuthorityDecision::Validated {
                transaction_id: format!("TX-{}", submission.fiscal_code),
            }),
        }
    }
}

/// Queue whose next `broken_releases` complete/retry calls fail.
pub struct UnreliableQueue {
    inner: Arc<InMemoryStore>,
    broken_releases: AtomicUsize,
}

impl UnreliableQueue {
    pub fn new(inner: Arc<InMemoryStore>, broken_releases: usize) -> Self {
        Self {
            inner,
            broken_releases: AtomicUsize::new(broken_releases),
        }
    }

    fn release_broken(&self) -> bool {
        self.broken_releases
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TaskQueue for UnreliableQueue {
    async fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<Uuid, AppError> {
        self.inner.enqueue(task_name, payload).await
    }

    async fn claim(
        &self,
        task_name: &str,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedTask>, AppError> {
        self.inner.claim(task_name, limit, lease).await
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), AppError> {
        if self.release_broken() {
            return Err(AppError::DatabaseError(anyhow::anyhow!("connection lost")));
        }
        self.inner.complete(task_id).await
    }

    async fn retry_later(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), AppError> {
        if self.release_broken() {
            return Err(AppError::DatabaseError(anyhow::anyhow!("connection lost")));
        }
        self.inner.retry_later(task_id, delay, error).await
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), AppError> {
        self.inner.fail(task_id, error).await
    }
}

pub fn fiscal_settings(configured: bool, accredited: bool) -> FiscalSettings {
    FiscalSettings {
        authority_url: configured.then(|| "https://authority.test".to_string()),
        api_key: configured.then(|| Secret::new("authority-key".to_string())),
        accredited,
        signing_secret: Secret::new(SIGNING_SECRET.to_string()),
        code_prefix: "NGTX".to_string(),
    }
}

/// Engine and fiscal pipeline wired to one in-memory store.
pub struct TestContext {
    pub store: Arc<InMemoryStore>,
    pub alerts: Arc<RecordingAlertSink>,
    pub renderer: Arc<FakeRenderer>,
    pub engine: TaxEngine,
    pub pipeline: FiscalPipeline,
}

pub struct ContextBuilder {
    inventory: Arc<dyn InventoryBridge>,
    renderer: FakeRenderer,
    failing_subjects: HashSet<Uuid>,
    fiscal: FiscalSettings,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self {
            inventory: Arc::new(FakeInventory::with_cogs("0")),
            renderer: FakeRenderer::default(),
            failing_subjects: HashSet::new(),
            fiscal: fiscal_settings(true, true),
        }
    }
}

impl ContextBuilder {
    pub fn inventory(mut self, inventory: impl InventoryBridge + 'static) -> Self {
        self.inventory = Arc::new(inventory);
        self
    }

    pub fn broken_renderer(mut self) -> Self {
        self.renderer.broken = true;
        self
    }

    pub fn ledger_fails_for(mut self, subject_id: Uuid) -> Self {
        self.failing_subjects.insert(subject_id);
        self
    }

    pub fn fiscal(mut self, settings: FiscalSettings) -> Self {
        self.fiscal = settings;
        self
    }

    pub fn build(self) -> TestContext {
        init_tracing();
        let store = Arc::new(InMemoryStore::new());
        let alerts = Arc::new(RecordingAlertSink::new());
        let renderer = Arc::new(self.renderer);
        let rules = TaxRules::default();

        let ledger: Arc<dyn LedgerSource> = if self.failing_subjects.is_empty() {
            store.clone()
        } else {
            Arc::new(FlakyLedger {
                inner: store.clone(),
                failing: self.failing_subjects,
            })
        };

        let engine = TaxEngine::new(
            EngineDeps {
                profiles: store.clone(),
                ledger,
                reports: store.clone(),
                inventory: self.inventory,
                renderer: renderer.clone(),
                alerts: alerts.clone(),
            },
            rules.clone(),
        );
        let pipeline = FiscalPipeline::new(
            store.clone(),
            store.clone(),
            store.clone(),
            self.fiscal,
            rules.reporting_offset,
        );

        TestContext {
            store,
            alerts,
            renderer,
            engine,
            pipeline,
        }
    }
}

impl TestContext {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    /// New subject on `tier` with the given annual figures.
    pub async fn subject(&self, tier: PlanTier, turnover: &str, assets: &str) -> Uuid {
        let subject_id = Uuid::new_v4();
        self.engine
            .set_plan_tier(subject_id, tier)
            .await
            .expect("Failed to create profile");
        self.engine
            .update_financials(subject_id, d(turnover), d(assets))
            .await
            .expect("Failed to set financials");
        subject_id
    }

    pub fn worker(
        &self,
        authority: Option<Arc<dyn FiscalAuthority>>,
        accredited: bool,
        max_attempts: i32,
    ) -> TransmissionWorker {
        TransmissionWorker::new(
            self.store.clone(),
            self.store.clone(),
            authority,
            self.alerts.clone(),
            accredited,
            worker_config(max_attempts, 300_000),
        )
    }

    /// Accredited worker over `queue` with a short claim lease.
    pub fn leased_worker(
        &self,
        queue: Arc<dyn TaskQueue>,
        authority: Arc<dyn FiscalAuthority>,
        lease_ms: u64,
    ) -> TransmissionWorker {
        TransmissionWorker::new(
            self.store.clone(),
            queue,
            Some(authority),
            self.alerts.clone(),
            true,
            worker_config(5, lease_ms),
        )
    }
}

fn worker_config(max_attempts: i32, lease_ms: u64) -> WorkerConfig {
    WorkerConfig {
        enabled: true,
        poll_interval_ms: 10,
        max_attempts,
        batch_size: 10,
        lease_ms,
    }
}
