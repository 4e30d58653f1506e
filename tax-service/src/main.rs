//! Tax Service entry point.

use tax_service::config::TaxConfig;
use tax_service::startup::Application;

use service_core::observability::init_tracing;
use tokio::signal;

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = TaxConfig::from_env().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting tax-service");

    // Secrets are never logged
    tracing::info!(
        service_name = %config.service_name,
        http_port = %config.common.port,
        db_max_connections = %config.database.max_connections,
        db_min_connections = %config.database.min_connections,
        inventory_configured = config.inventory_service_url.is_some(),
        artifacts_configured = config.artifact_service_url.is_some(),
        fiscal_configured = config.fiscal.is_configured(),
        fiscal_accredited = config.fiscal.accredited,
        reporting_offset = %config.rules.reporting_offset,
        "Configuration loaded"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to build application");
        std::io::Error::other(format!("Application build error: {}", e))
    })?;
    let shutdown = app.shutdown_token();

    let mut server = tokio::spawn(app.run_until_stopped());

    tokio::select! {
        result = &mut server => {
            match result {
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Application error");
                    return Err(e);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Application task panicked");
                    return Err(std::io::Error::other(e.to_string()));
                }
                Ok(Ok(())) => {}
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("Graceful shutdown initiated");
            shutdown.cancel();
            // Let the worker and scheduler finish their current step.
            let _ = server.await;
        }
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}
