//! Dead-letter queue.
//!
//! A bounded ring buffer of tasks that exhausted retries. Supports
//! inspection and selective re-queue (which resets `retryCount` to 0) plus
//! a periodic sweep that drops entries past their retention window.

use crate::config::DlqConfig;
use crate::model::Task;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub task: Task,
    pub error: String,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
}

pub struct DeadLetterQueue {
    config: DlqConfig,
    entries: Mutex<VecDeque<DeadLetterEntry>>,
}

impl DeadLetterQueue {
    pub fn new(config: DlqConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a task that exhausted retries. No-op if the DLQ is disabled.
    /// Evicts the oldest entry when the bound is reached.
    pub fn push(&self, task: Task, error: impl Into<String>) {
        if !self.config.enabled {
            return;
        }
        let attempts = task.retry_count;
        let mut entries = self.entries.lock();
        if entries.len() >= self.config.max_size {
            entries.pop_front();
        }
        entries.push_back(DeadLetterEntry {
            task,
            error: error.into(),
            timestamp: Utc::now(),
            attempts,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot all entries for inspection.
    pub fn list(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Re-queue the entry matching `task_id`, resetting `retryCount` to 0.
    pub fn requeue(&self, task_id: crate::types::TaskId) -> Option<Task> {
        let mut entries = self.entries.lock();
        let idx = entries.iter().position(|e| e.task.id == task_id)?;
        let mut entry = entries.remove(idx)?;
        entry.task.retry_count = 0;
        entry.task.scheduled_at = None;
        Some(entry.task)
    }

    /// Drop entries older than the configured retention.
    pub fn sweep(&self) -> usize {
        let retention = chrono::Duration::seconds(self.config.retention_secs as i64);
        let cutoff = Utc::now() - retention;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.timestamp > cutoff);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskId, TaskType};
    use serde_json::json;

    fn cfg() -> DlqConfig {
        DlqConfig { enabled: true, max_size: 2, retention_secs: 3600 }
    }

    fn task(id: u64) -> Task {
        Task::new(TaskId(id), TaskType::Parse, 5, json!({}))
    }

    #[test]
    fn evicts_oldest_when_bound_reached() {
        let dlq = DeadLetterQueue::new(cfg());
        dlq.push(task(1), "e1");
        dlq.push(task(2), "e2");
        dlq.push(task(3), "e3");
        let ids: Vec<u64> = dlq.list().iter().map(|e| e.task.id.0).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn requeue_resets_retry_count() {
        let dlq = DeadLetterQueue::new(cfg());
        let mut t = task(1);
        t.retry_count = 5;
        dlq.push(t, "boom");
        let requeued = dlq.requeue(TaskId(1)).expect("entry should exist");
        assert_eq!(requeued.retry_count, 0);
        assert!(dlq.is_empty());
    }

    #[test]
    fn disabled_dlq_drops_entries() {
        let mut c = cfg();
        c.enabled = false;
        let dlq = DeadLetterQueue::new(c);
        dlq.push(task(1), "boom");
        assert!(dlq.is_empty());
    }
}
