//! Durable task queue consumed by background workers.
//!
//! Producers enqueue and return immediately. Consumers claim due tasks,
//! and either complete them, push them back with a delay, or mark them dead.
//! A claim is a lease: a task still claimed once the lease runs out is handed
//! to the next claimer. Delivery is at-least-once; handlers must be idempotent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use std::time::Duration;
use uuid::Uuid;

/// Task name for fiscal record transmission.
pub const FISCAL_TRANSMIT_TASK: &str = "fiscal.transmit";

/// Lifecycle of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Ready,
    Claimed,
    Done,
    Dead,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Ready => "ready",
            TaskState::Claimed => "claimed",
            TaskState::Done => "done",
            TaskState::Dead => "dead",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "claimed" => TaskState::Claimed,
            "done" => TaskState::Done,
            "dead" => TaskState::Dead,
            _ => TaskState::Ready,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct QueuedTask {
    pub task_id: Uuid,
    pub task_name: String,
    pub payload: serde_json::Value,
    pub state: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub available_utc: DateTime<Utc>,
    pub claimed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl QueuedTask {
    pub fn parsed_state(&self) -> TaskState {
        TaskState::from_string(&self.state)
    }

    /// Read a string argument from the payload.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, task_name: &str, payload: serde_json::Value) -> Result<Uuid, AppError>;

    /// Claim up to `limit` tasks that are either ready and due, or claimed
    /// longer than `lease` ago. Claiming counts an attempt.
    async fn claim(
        &self,
        task_name: &str,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<QueuedTask>, AppError>;

    async fn complete(&self, task_id: Uuid) -> Result<(), AppError>;

    /// Release a claimed task so it becomes ready again after `delay`.
    async fn retry_later(&self, task_id: Uuid, delay: Duration, error: &str)
        -> Result<(), AppError>;

    /// Stop delivering the task.
    async fn fail(&self, task_id: Uuid, error: &str) -> Result<(), AppError>;
}

pub(crate) fn delay_to_chrono(delay: Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60))
}
