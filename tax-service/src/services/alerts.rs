//! Alert events for conditions an operator should see.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::models::BusinessSize;
use crate::services::metrics::record_alert;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    BusinessSizeChanged {
        subject_id: Uuid,
        from: BusinessSize,
        to: BusinessSize,
    },
    TransmissionFailed {
        fiscal_code: String,
        error: String,
    },
    SweepSubjectFailed {
        subject_id: Uuid,
        error: String,
    },
    SweepSummary {
        period: String,
        processed: usize,
        succeeded: usize,
        failed: usize,
    },
}

impl Alert {
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::BusinessSizeChanged { .. } => "business_size_changed",
            Alert::TransmissionFailed { .. } => "transmission_failed",
            Alert::SweepSubjectFailed { .. } => "sweep_subject_failed",
            Alert::SweepSummary { .. } => "sweep_summary",
        }
    }
}

/// Receives alerts. Emission must never fail the caller.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: Alert);
}

/// Logs alerts as structured events and counts them.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(&self, alert: Alert) {
        record_alert(alert.kind());
        let payload = serde_json::to_string(&alert).unwrap_or_default();
        match &alert {
            Alert::SweepSummary { failed: 0, .. } | Alert::BusinessSizeChanged { .. } => {
                tracing::info!(alert_kind = alert.kind(), alert = %payload, "Alert raised");
            }
            _ => {
                tracing::warn!(alert_kind = alert.kind(), alert = %payload, "Alert raised");
            }
        }
    }
}
