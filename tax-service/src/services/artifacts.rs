//! Report document rendering collaborator.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use service_core::error::AppError;
use std::time::Duration;

use crate::models::TaxReport;

/// Renders a report to a stored document and returns its URL.
#[async_trait]
pub trait ArtifactRenderer: Send + Sync {
    async fn render(&self, report: &TaxReport) -> Result<String, AppError>;
}

/// Renderer used when no artifact service is configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledRenderer;

#[async_trait]
impl ArtifactRenderer for DisabledRenderer {
    async fn render(&self, _report: &TaxReport) -> Result<String, AppError> {
        Err(AppError::dependency(
            "artifact_renderer",
            anyhow::anyhow!("no artifact service configured"),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct RenderResponse {
    url: String,
}

/// HTTP client for the document rendering service.
#[derive(Clone)]
pub struct HttpArtifactRenderer {
    client: Client,
    base_url: String,
}

impl HttpArtifactRenderer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build renderer client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ArtifactRenderer for HttpArtifactRenderer {
    async fn render(&self, report: &TaxReport) -> Result<String, AppError> {
        let url = format!("{}/v1/render/tax-report", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(report)
            .send()
            .await
            .map_err(|e| AppError::dependency("artifact_renderer", anyhow::Error::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::dependency(
                "artifact_renderer",
                anyhow::anyhow!("renderer returned {}: {}", status, body),
            ));
        }

        let rendered: RenderResponse = response
            .json()
            .await
            .map_err(|e| AppError::dependency("artifact_renderer", anyhow::Error::new(e)))?;
        Ok(rendered.url)
    }
}
