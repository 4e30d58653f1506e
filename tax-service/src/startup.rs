//! Application startup and lifecycle management.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{Datelike, FixedOffset, NaiveTime, TimeZone, Utc};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::TaxConfig;
use crate::engine::period::previous_month;
use crate::engine::{EngineDeps, Sweeper, TaxEngine};
use crate::fiscal::{FiscalAuthority, FiscalPipeline, HttpFiscalAuthority, TransmissionWorker};
use crate::services::{
    get_metrics, init_metrics, ArtifactRenderer, Database, DisabledRenderer, HttpArtifactRenderer,
    HttpInventoryBridge, InventoryBridge, NoInventory, TracingAlertSink,
};

/// State for health check endpoints.
#[derive(Clone)]
struct HealthState {
    db: Arc<Database>,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "tax-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "tax-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for readiness probes.
async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    config: TaxConfig,
    db: Arc<Database>,
    engine: TaxEngine,
    pipeline: FiscalPipeline,
    worker: Arc<TransmissionWorker>,
    shutdown: CancellationToken,
}

impl Application {
    pub async fn build(config: TaxConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build without running migrations, for harnesses that apply them.
    pub async fn build_without_migrations(config: TaxConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: TaxConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            config.database.url.expose_secret(),
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }
        let db = Arc::new(db);

        let timeout = config.http_timeout();
        let inventory: Arc<dyn InventoryBridge> = match &config.inventory_service_url {
            Some(url) => Arc::new(HttpInventoryBridge::new(url, timeout)?),
            None => {
                tracing::warn!("INVENTORY_SERVICE_URL not set, COGS will be zero");
                Arc::new(NoInventory)
            }
        };
        let renderer: Arc<dyn ArtifactRenderer> = match &config.artifact_service_url {
            Some(url) => Arc::new(HttpArtifactRenderer::new(url, timeout)?),
            None => Arc::new(DisabledRenderer),
        };
        let alerts = Arc::new(TracingAlertSink);

        let engine = TaxEngine::new(
            EngineDeps {
                profiles: db.clone(),
                ledger: db.clone(),
                reports: db.clone(),
                inventory,
                renderer,
                alerts: alerts.clone(),
            },
            config.rules.clone(),
        );

        let pipeline = FiscalPipeline::new(
            db.clone(),
            db.clone(),
            db.clone(),
            config.fiscal.clone(),
            config.rules.reporting_offset,
        );

        let authority: Option<Arc<dyn FiscalAuthority>> =
            match HttpFiscalAuthority::from_settings(&config.fiscal, timeout)? {
                Some(client) => Some(Arc::new(client)),
                None => {
                    tracing::warn!("Fiscal authority not configured, records stay pending_configuration");
                    None
                }
            };
        let worker = Arc::new(TransmissionWorker::new(
            db.clone(),
            db.clone(),
            authority,
            alerts,
            config.fiscal.accredited,
            config.worker.clone(),
        ));

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();
        tracing::info!(http_port = port, "Tax service listener bound");

        Ok(Self {
            port,
            listener,
            config,
            db,
            engine,
            pipeline,
            worker,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn engine(&self) -> &TaxEngine {
        &self.engine
    }

    pub fn pipeline(&self) -> &FiscalPipeline {
        &self.pipeline
    }

    /// Token that stops the background tasks when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Serve health and metrics, and run the transmission worker and the
    /// month-end sweep scheduler, until the server fails or the token is
    /// cancelled.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let worker = self.worker.clone();
        let worker_token = self.shutdown.clone();
        let worker_handle = tokio::spawn(async move { worker.run(worker_token).await });

        let sweep_handle = if self.config.sweep.enabled {
            let sweeper = Sweeper::new(self.engine.clone(), self.config.sweep.clone());
            let offset = self.config.rules.reporting_offset;
            let token = self.shutdown.clone();
            Some(tokio::spawn(async move {
                run_sweep_schedule(sweeper, offset, token).await
            }))
        } else {
            tracing::info!("Month-end sweep disabled by configuration");
            None
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(HealthState {
                db: self.db.clone(),
            });

        tracing::info!(
            service = "tax-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.port,
            "Service ready to accept connections"
        );

        let token = self.shutdown.clone();
        let served = axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;

        self.shutdown.cancel();
        let _ = worker_handle.await;
        if let Some(handle) = sweep_handle {
            let _ = handle.await;
        }

        served.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Sweep the previous month shortly after each month starts in the
/// reporting timezone.
async fn run_sweep_schedule(sweeper: Sweeper, offset: FixedOffset, shutdown: CancellationToken) {
    loop {
        let wait = until_next_month_start(offset);
        tracing::info!(wait_secs = wait.as_secs(), "Next month-end sweep scheduled");

        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("Sweep scheduler shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let today = Utc::now().with_timezone(&offset).date_naive();
        let (year, month) = previous_month(today);
        match sweeper.run_month_with_retry(year, month).await {
            Ok(summary) => tracing::info!(
                period = %summary.period,
                failed = summary.failed,
                "Month-end sweep completed"
            ),
            Err(e) => tracing::error!(error = %e, year, month, "Month-end sweep aborted"),
        }
    }
}

/// Time until 01:00 on the first day of next month in `offset`.
fn until_next_month_start(offset: FixedOffset) -> Duration {
    let now = Utc::now().with_timezone(&offset);
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let at = chrono::NaiveDate::from_ymd_opt(year, month, 1)
        .zip(NaiveTime::from_hms_opt(1, 0, 0))
        .and_then(|(date, time)| offset.from_local_datetime(&date.and_time(time)).single());

    match at {
        Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(60)),
        None => Duration::from_secs(24 * 3600),
    }
}
