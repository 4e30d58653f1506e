//! Inventory subsystem client, consulted only for cost-of-goods figures.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;
use uuid::Uuid;

/// COGS figures for a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CogsFigures {
    pub cogs_amount: Decimal,
    pub purchases_amount: Decimal,
    pub current_inventory_value: Decimal,
}

#[async_trait]
pub trait InventoryBridge: Send + Sync {
    async fn get_cogs(
        &self,
        subject_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CogsFigures, AppError>;
}

/// Used when no inventory service is configured: every subject has zero COGS.
#[derive(Debug, Default, Clone)]
pub struct NoInventory;

#[async_trait]
impl InventoryBridge for NoInventory {
    async fn get_cogs(
        &self,
        _subject_id: Uuid,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<CogsFigures, AppError> {
        Ok(CogsFigures::default())
    }
}

/// HTTP client for the inventory service's COGS endpoint.
#[derive(Clone)]
pub struct HttpInventoryBridge {
    client: Client,
    base_url: String,
}

impl HttpInventoryBridge {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("Failed to build inventory client: {}", e))
        })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl InventoryBridge for HttpInventoryBridge {
    async fn get_cogs(
        &self,
        subject_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CogsFigures, AppError> {
        let url = format!("{}/v1/subjects/{}/cogs", self.base_url, subject_id);

        let response = self
            .client
            .get(&url)
            .query(&[("start", start.to_string()), ("end", end.to_string())])
            .send()
            .await
            .map_err(|e| AppError::dependency("inventory", anyhow::Error::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::dependency(
                "inventory",
                anyhow::anyhow!("inventory service returned {}: {}", status, body),
            ));
        }

        response
            .json::<CogsFigures>()
            .await
            .map_err(|e| AppError::dependency("inventory", anyhow::Error::new(e)))
    }
}
