//! Database service for tax-service.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{FiscalRecord, LedgerEntry, NewFiscalRecord, ReportKey, TaxProfile, TaxReport};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::queue::{delay_to_chrono, QueuedTask, TaskQueue, TaskState};
use crate::services::store::{
    FiscalStore, LedgerSource, ProfileStore, ReportStore, TransmissionUpdate,
};

const PROFILE_COLUMNS: &str = "subject_id, plan_tier, annual_turnover, fixed_assets, tax_id, \
     vat_number, fiscal_merchant_id, business_size, created_utc, updated_utc";

const ENTRY_COLUMNS: &str = "entry_id, subject_id, entry_type, amount, discount, payment_status, \
     vat_category, vat_amount, counterparty_name, created_utc, due_date";

const REPORT_COLUMNS: &str = "report_id, subject_id, period_type, start_date, end_date, basis, \
     business_size, total_revenue, total_expenses, cogs_amount, purchases_amount, inventory_value, \
     assessable_profit, pit_amount, pit_effective_rate, pit_band, cit_amount, cit_rate, \
     levy_amount, levy_rate, vat_collected, taxable_sales, zero_rated_sales, exempt_sales, \
     pdf_url, generated_utc, created_utc";

const FISCAL_COLUMNS: &str = "record_id, invoice_id, subject_id, fiscal_code, signature, \
     qr_payload, amount, vat_amount, vat_breakdown, signed_utc, transmission_status, \
     transmission_attempts, external_transaction_id, last_error, created_utc, updated_utc";

const TASK_COLUMNS: &str =
    "task_id, task_name, payload, state, attempts, last_error, available_utc, claimed_utc, created_utc";

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{}: {}", context, e))
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "tax-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Profiles
// -----------------------------------------------------------------------------

#[async_trait]
impl ProfileStore for Database {
    #[instrument(skip(self), fields(subject_id = %subject_id))]
    async fn get_profile(&self, subject_id: Uuid) -> Result<Option<TaxProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_profile"])
            .start_timer();

        let profile = sqlx::query_as::<_, TaxProfile>(&format!(
            "SELECT {} FROM tax_profiles WHERE subject_id = $1",
            PROFILE_COLUMNS
        ))
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get profile", e))?;

        timer.observe_duration();
        Ok(profile)
    }

    #[instrument(skip(self, profile), fields(subject_id = %profile.subject_id))]
    async fn save_profile(&self, profile: &TaxProfile) -> Result<TaxProfile, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["save_profile"])
            .start_timer();

        let saved = sqlx::query_as::<_, TaxProfile>(&format!(
            r#"
            INSERT INTO tax_profiles ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (subject_id) DO UPDATE SET
                plan_tier = EXCLUDED.plan_tier,
                annual_turnover = EXCLUDED.annual_turnover,
                fixed_assets = EXCLUDED.fixed_assets,
                tax_id = EXCLUDED.tax_id,
                vat_number = EXCLUDED.vat_number,
                fiscal_merchant_id = EXCLUDED.fiscal_merchant_id,
                business_size = EXCLUDED.business_size,
                updated_utc = EXCLUDED.updated_utc
            RETURNING {cols}
            "#,
            cols = PROFILE_COLUMNS
        ))
        .bind(profile.subject_id)
        .bind(&profile.plan_tier)
        .bind(profile.annual_turnover)
        .bind(profile.fixed_assets)
        .bind(&profile.tax_id)
        .bind(&profile.vat_number)
        .bind(&profile.fiscal_merchant_id)
        .bind(&profile.business_size)
        .bind(profile.created_utc)
        .bind(profile.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to save profile", e))?;

        timer.observe_duration();
        Ok(saved)
    }

    #[instrument(skip(self))]
    async fn subject_ids_after(
        &self,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Uuid>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["subject_ids_after"])
            .start_timer();

        let ids: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT subject_id FROM tax_profiles
            WHERE ($1::uuid IS NULL OR subject_id > $1)
            ORDER BY subject_id
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to page subjects", e))?;

        timer.observe_duration();
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

// -----------------------------------------------------------------------------
// Ledger
// -----------------------------------------------------------------------------

#[async_trait]
impl LedgerSource for Database {
    #[instrument(skip(self), fields(subject_id = %subject_id))]
    async fn entries_in_window(
        &self,
        subject_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["entries_in_window"])
            .start_timer();

        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {} FROM ledger_entries
            WHERE subject_id = $1
              AND created_utc >= $2 AND created_utc < $3
              AND payment_status NOT IN ('refunded', 'cancelled', 'canceled', 'void')
            ORDER BY created_utc
            "#,
            ENTRY_COLUMNS
        ))
        .bind(subject_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load ledger entries", e))?;

        timer.observe_duration();
        Ok(entries)
    }

    #[instrument(skip(self), fields(subject_id = %subject_id, entry_id = %entry_id))]
    async fn get_entry(
        &self,
        subject_id: Uuid,
        entry_id: Uuid,
    ) -> Result<Option<LedgerEntry>, AppError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            "SELECT {} FROM ledger_entries WHERE subject_id = $1 AND entry_id = $2",
            ENTRY_COLUMNS
        ))
        .bind(subject_id)
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get ledger entry", e))
    }
}

// -----------------------------------------------------------------------------
// Reports
// -----------------------------------------------------------------------------

#[async_trait]
impl ReportStore for Database {
    #[instrument(skip(self), fields(subject_id = %key.subject_id, period_type = %key.period_type))]
    async fn find_report(&self, key: &ReportKey) -> Result<Option<TaxReport>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_report"])
            .start_timer();

        let report = sqlx::query_as::<_, TaxReport>(&format!(
            r#"
            SELECT {} FROM tax_reports
            WHERE subject_id = $1 AND period_type = $2 AND start_date = $3 AND end_date = $4
            "#,
            REPORT_COLUMNS
        ))
        .bind(key.subject_id)
        .bind(key.period_type.as_str())
        .bind(key.start_date)
        .bind(key.end_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find report", e))?;

        timer.observe_duration();
        Ok(report)
    }

    #[instrument(skip(self), fields(subject_id = %subject_id, report_id = %report_id))]
    async fn get_report(
        &self,
        subject_id: Uuid,
        report_id: Uuid,
    ) -> Result<Option<TaxReport>, AppError> {
        sqlx::query_as::<_, TaxReport>(&format!(
            "SELECT {} FROM tax_reports WHERE subject_id = $1 AND report_id = $2",
            REPORT_COLUMNS
        ))
        .bind(subject_id)
        .bind(report_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get report", e))
    }

    /// Concurrent writers for one key race; the last one wins.
    #[instrument(skip(self, report), fields(subject_id = %report.subject_id, period_type = %report.period_type))]
    async fn upsert_report(&self, report: &TaxReport) -> Result<TaxReport, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_report"])
            .start_timer();

        let saved = sqlx::query_as::<_, TaxReport>(&format!(
            r#"
            INSERT INTO tax_reports ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23, $24, NULL, $25, $26)
            ON CONFLICT (subject_id, period_type, start_date, end_date) DO UPDATE SET
                basis = EXCLUDED.basis,
                business_size = EXCLUDED.business_size,
                total_revenue = EXCLUDED.total_revenue,
                total_expenses = EXCLUDED.total_expenses,
                cogs_amount = EXCLUDED.cogs_amount,
                purchases_amount = EXCLUDED.purchases_amount,
                inventory_value = EXCLUDED.inventory_value,
                assessable_profit = EXCLUDED.assessable_profit,
                pit_amount = EXCLUDED.pit_amount,
                pit_effective_rate = EXCLUDED.pit_effective_rate,
                pit_band = EXCLUDED.pit_band,
                cit_amount = EXCLUDED.cit_amount,
                cit_rate = EXCLUDED.cit_rate,
                levy_amount = EXCLUDED.levy_amount,
                levy_rate = EXCLUDED.levy_rate,
                vat_collected = EXCLUDED.vat_collected,
                taxable_sales = EXCLUDED.taxable_sales,
                zero_rated_sales = EXCLUDED.zero_rated_sales,
                exempt_sales = EXCLUDED.exempt_sales,
                pdf_url = NULL,
                generated_utc = EXCLUDED.generated_utc
            RETURNING {cols}
            "#,
            cols = REPORT_COLUMNS
        ))
        .bind(report.report_id)
        .bind(report.subject_id)
        .bind(&report.period_type)
        .bind(report.start_date)
        .bind(report.end_date)
        .bind(&report.basis)
        .bind(&report.business_size)
        .bind(report.total_revenue)
        .bind(report.total_expenses)
        .bind(report.cogs_amount)
        .bind(report.purchases_amount)
        .bind(report.inventory_value)
        .bind(report.assessable_profit)
        .bind(report.pit_amount)
        .bind(report.pit_effective_rate)
        .bind(&report.pit_band)
        .bind(report.cit_amount)
        .bind(report.cit_rate)
        .bind(report.levy_amount)
        .bind(report.levy_rate)
        .bind(report.vat_collected)
        .bind(report.taxable_sales)
        .bind(report.zero_rated_sales)
        .bind(report.exempt_sales)
        .bind(report.generated_utc)
        .bind(report.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("Failed to upsert report", e))?;

        timer.observe_duration();
        Ok(saved)
    }

    #[instrument(skip(self, url), fields(report_id = %report_id))]
    async fn set_artifact_url(&self, report_id: Uuid, url: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE tax_reports SET pdf_url = $2 WHERE report_id = $1")
            .bind(report_id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to set artifact url", e))?;
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Fiscal records
// -----------------------------------------------------------------------------

#[async_trait]
impl FiscalStore for Database {
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn find_by_invoice(&self, invoice_id: Uuid) -> Result<Option<FiscalRecord>, AppError> {
        sqlx::query_as::<_, FiscalRecord>(&format!(
            "SELECT {} FROM fiscal_records WHERE invoice_id = $1",
            FISCAL_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find fiscal record", e))
    }

    #[instrument(skip(self))]
    async fn find_by_code(&self, fiscal_code: &str) -> Result<Option<FiscalRecord>, AppError> {
        sqlx::query_as::<_, FiscalRecord>(&format!(
            "SELECT {} FROM fiscal_records WHERE fiscal_code = $1",
            FISCAL_COLUMNS
        ))
        .bind(fiscal_code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find fiscal record", e))
    }

    #[instrument(skip(self, record), fields(invoice_id = %record.invoice_id, fiscal_code = %record.fiscal_code))]
    async fn insert_record(&self, record: &NewFiscalRecord) -> Result<FiscalRecord, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_fiscal_record"])
            .start_timer();

        let breakdown = serde_json::to_value(&record.vat_breakdown)?;
        let now = Utc::now();

        let saved = sqlx::query_as::<_, FiscalRecord>(&format!(
            r#"
            INSERT INTO fiscal_records ({cols})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 0, NULL, NULL, $12, $12)
            RETURNING {cols}
            "#,
            cols = FISCAL_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(record.invoice_id)
        .bind(record.subject_id)
        .bind(&record.fiscal_code)
        .bind(&record.signature)
        .bind(&record.qr_payload)
        .bind(record.amount)
        .bind(record.vat_amount)
        .bind(breakdown)
        .bind(record.signed_utc)
        .bind(record.transmission_status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Fiscal record already exists for invoice {} or code {}",
                    record.invoice_id,
                    record.fiscal_code
                ))
            }
            _ => db_error("Failed to insert fiscal record", e),
        })?;

        timer.observe_duration();
        Ok(saved)
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_transmission(
        &self,
        fiscal_code: &str,
        update: &TransmissionUpdate,
    ) -> Result<FiscalRecord, AppError> {
        sqlx::query_as::<_, FiscalRecord>(&format!(
            r#"
            UPDATE fiscal_records SET
                transmission_status = $2,
                external_transaction_id = COALESCE($3, external_transaction_id),
                last_error = $4,
                transmission_attempts = transmission_attempts + CASE WHEN $5 THEN 1 ELSE 0 END,
                updated_utc = NOW()
            WHERE fiscal_code = $1
            RETURNING {}
            "#,
            FISCAL_COLUMNS
        ))
        .bind(fiscal_code)
        .bind(update.status.as_str())
        .bind(&update.external_transaction_id)
        .bind(&update.last_error)
        .bind(update.count_attempt)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update transmission", e))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Fiscal record {} not found", fiscal_code)))
    }
}

// -----------------------------------------------------------------------------
// Task queue
// -----------------------------------------------------------------------------

#[async_trait]
impl TaskQueue for Database {
    #[instrument(skip(self, payload))]
    async fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<Uuid, AppError> {
        let task_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO task_queue (task_id, task_name, payload, state, attempts, available_utc, created_utc)
            VALUES ($1, $2, $3, $4, 0, NOW(), NOW())
            "#,
        )
        .bind(task_id)
        .bind(task_name)
        .bind(payload)
        .bind(TaskState::Ready.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to enqueue task", e))?;
        Ok(task_id)
    }

    #[instrument(skip(self))]
    async fn claim(
        &self,
        task_name: &str,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedTask>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_tasks"])
            .start_timer();

        let tasks = sqlx::query_as::<_, QueuedTask>(&format!(
            r#"
            UPDATE task_queue SET state = 'claimed', attempts = attempts + 1, claimed_utc = NOW()
            WHERE task_id IN (
                SELECT task_id FROM task_queue
                WHERE task_name = $1
                  AND (
                    (state = 'ready' AND available_utc <= NOW())
                    OR (state = 'claimed' AND claimed_utc <= NOW() - make_interval(secs => $3))
                  )
                ORDER BY available_utc
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {}
            "#,
            TASK_COLUMNS
        ))
        .bind(task_name)
        .bind(limit)
        .bind(lease.as_secs_f64())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to claim tasks", e))?;

        timer.observe_duration();
        Ok(tasks)
    }

    async fn complete(&self, task_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE task_queue SET state = 'done', last_error = NULL, claimed_utc = NULL WHERE task_id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to complete task", e))?;
        Ok(())
    }

    async fn retry_later(
        &self,
        task_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> Result<(), AppError> {
        let available = Utc::now() + delay_to_chrono(delay);
        sqlx::query(
            "UPDATE task_queue SET state = 'ready', last_error = $2, available_utc = $3, claimed_utc = NULL \
             WHERE task_id = $1",
        )
        .bind(task_id)
        .bind(error)
        .bind(available)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to reschedule task", e))?;
        Ok(())
    }

    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE task_queue SET state = 'dead', last_error = $2, claimed_utc = NULL WHERE task_id = $1")
            .bind(task_id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to mark task dead", e))?;
        Ok(())
    }
}
