//! `Task` — internal work item queued by C9 and re-queued by C5.

use crate::types::{Priority, TaskId, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Internal unit of work. Owned by C4 while queued, by C5 while executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub r#type: TaskType,
    pub priority: Priority,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Key used for partition assignment in C4 (e.g. `namespace/module`).
    #[serde(default)]
    pub partition_key: Option<String>,
}

impl Task {
    pub fn new(id: TaskId, r#type: TaskType, priority: Priority, payload: serde_json::Value) -> Self {
        Self {
            id,
            r#type,
            priority,
            payload,
            metadata: HashMap::new(),
            retry_count: 0,
            max_retries: 5,
            created_at: Utc::now(),
            scheduled_at: None,
            partition_key: None,
        }
    }

    pub fn with_partition_key(mut self, key: impl Into<String>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| at <= now)
    }

    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }

    /// Ordering key used within a partition: `(priority desc, scheduledAt
    /// asc, createdAt asc)`.
    pub fn order_key(&self) -> (std::cmp::Reverse<Priority>, DateTime<Utc>, DateTime<Utc>) {
        let effective_schedule = self.scheduled_at.unwrap_or(self.created_at);
        (
            std::cmp::Reverse(self.priority),
            effective_schedule,
            self.created_at,
        )
    }
}
