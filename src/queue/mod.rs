//! Partitioned Queue (C4) — bounded, partitioned, priority-ordered work
//! queue with backpressure and scheduled-task promotion.

pub mod partition;

use crate::config::{PartitionStrategy, QueueConfig};
use crate::error::QueueError;
use crate::model::Task;
use crate::types::TaskId;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use partition::Partition;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};

/// Snapshot of queue-wide metrics.
#[derive(Debug, Clone)]
pub struct QueueMetrics {
    pub total_depth: usize,
    pub oldest_item_age_ms: Option<i64>,
    pub per_partition_lag: Vec<usize>,
}

struct ScheduledEntry {
    scheduled_at: DateTime<Utc>,
    task: Task,
    partition: usize,
}

impl PartialEq for ScheduledEntry {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_at == other.scheduled_at
    }
}
impl Eq for ScheduledEntry {}

impl PartialOrd for ScheduledEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Reversed so the `BinaryHeap` (max-heap) pops the *earliest*
/// `scheduledAt` first — a min-heap by time.
impl Ord for ScheduledEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.scheduled_at.cmp(&self.scheduled_at)
    }
}

/// Bounded, partitioned work queue.
pub struct PartitionedQueue {
    partitions: Vec<Partition>,
    scheduled: Mutex<BinaryHeap<ScheduledEntry>>,
    config: QueueConfig,
    round_robin_counter: AtomicU64,
    next_task_id: AtomicU64,
    total_depth: AtomicUsize,
}

impl PartitionedQueue {
    pub fn new(config: QueueConfig) -> Self {
        let partitions = (0..config.partition_count).map(Partition::new).collect();
        Self {
            partitions,
            scheduled: Mutex::new(BinaryHeap::new()),
            config,
            round_robin_counter: AtomicU64::new(0),
            next_task_id: AtomicU64::new(1),
            total_depth: AtomicUsize::new(0),
        }
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Allocate a process-local task id.
    pub fn next_task_id(&self) -> TaskId {
        TaskId(self.next_task_id.fetch_add(1, AtomicOrdering::Relaxed))
    }

    /// Assign a task to a partition per the configured strategy.
    pub fn partition_for(&self, task: &Task, key: Option<&str>) -> usize {
        let n = self.partitions.len().max(1);
        match self.config.partition_strategy {
            PartitionStrategy::Hash => {
                let basis = key.or(task.partition_key.as_deref()).unwrap_or("");
                let mut hasher = DefaultHasher::new();
                basis.hash(&mut hasher);
                (hasher.finish() as usize) % n
            }
            PartitionStrategy::RoundRobin => {
                (self.round_robin_counter.fetch_add(1, AtomicOrdering::Relaxed) as usize) % n
            }
            PartitionStrategy::Priority => {
                // High-priority lane is partition 0; remaining priorities
                // spread round-robin across the rest.
                if task.priority >= 8 || n == 1 {
                    0
                } else {
                    1 + (self.round_robin_counter.fetch_add(1, AtomicOrdering::Relaxed) as usize)
                        % (n - 1)
                }
            }
        }
    }

    /// Enqueue a task, failing fast under backpressure.
    pub fn enqueue(&self, task: Task, key: Option<&str>) -> Result<(), QueueError> {
        let depth = self.total_depth.load(AtomicOrdering::Relaxed);
        if depth >= self.config.backpressure_threshold {
            return Err(QueueError::Overflow {
                depth,
                threshold: self.config.backpressure_threshold,
            });
        }

        let partition = self.partition_for(&task, key);
        let now = Utc::now();
        if task.is_ready(now) {
            self.partitions[partition].push(task);
        } else {
            let scheduled_at = task.scheduled_at.unwrap_or(now);
            self.scheduled.lock().push(ScheduledEntry {
                scheduled_at,
                task,
                partition,
            });
        }
        self.total_depth.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(())
    }

    pub fn dequeue(&self, partition: usize, n: usize) -> Result<Vec<Task>, QueueError> {
        let p = self
            .partitions
            .get(partition)
            .ok_or(QueueError::NoSuchPartition(partition))?;
        let popped = p.pop_n(n);
        self.total_depth.fetch_sub(popped.len(), AtomicOrdering::Relaxed);
        Ok(popped)
    }

    /// Pull up to `batch_size` tasks across all partitions, round-robin.
    pub fn dequeue_batch(&self) -> Vec<Task> {
        let batch_size = self.config.batch_size;
        let mut out = Vec::with_capacity(batch_size);
        if self.partitions.is_empty() {
            return out;
        }
        let mut idx = 0;
        while out.len() < batch_size {
            let before = out.len();
            if let Some(task) = self.partitions[idx % self.partitions.len()].pop_one() {
                out.push(task);
                self.total_depth.fetch_sub(1, AtomicOrdering::Relaxed);
            }
            idx += 1;
            if idx % self.partitions.len() == 0 && out.len() == before {
                break; // a full round with no progress: all partitions empty.
            }
        }
        out
    }

    /// Pull the globally `n` highest-priority tasks, ignoring partition
    /// boundaries.
    pub fn dequeue_by_priority(&self, n: usize) -> Vec<Task> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let best = self
                .partitions
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.peek_priority().map(|pr| (i, pr)))
                .max_by_key(|(_, pr)| *pr);
            match best {
                Some((idx, _)) => {
                    if let Some(task) = self.partitions[idx].pop_one() {
                        self.total_depth.fetch_sub(1, AtomicOrdering::Relaxed);
                        out.push(task);
                    }
                }
                None => break,
            }
        }
        out
    }

    /// Requeue policy: exponential backoff with jitter;
    /// exhausted retries return `None` so the caller (C7) dead-letters
    /// instead.
    pub fn requeue(&self, mut task: Task, key: Option<&str>) -> Option<RequeueOutcome> {
        task.retry_count += 1;
        if task.retries_exhausted() {
            return Some(RequeueOutcome::Exhausted(task));
        }
        let delay = backoff_with_jitter(
            task.retry_count,
            self.config.retry_base_delay_ms,
            self.config.retry_max_delay_ms,
            self.config.retry_multiplier,
            self.config.retry_jitter_fraction,
        );
        task.scheduled_at = Some(Utc::now() + chrono::Duration::milliseconds(delay as i64));
        match self.enqueue(task, key) {
            Ok(()) => Some(RequeueOutcome::Requeued),
            Err(_) => None,
        }
    }

    /// Promote scheduled tasks whose `scheduledAt` has elapsed into their
    /// partitions. Run periodically by a background sweep.
    pub fn sweep_scheduled(&self, now: DateTime<Utc>) -> usize {
        let mut promoted = 0;
        let mut scheduled = self.scheduled.lock();
        while let Some(entry) = scheduled.peek() {
            if entry.scheduled_at > now {
                break;
            }
            let entry = scheduled.pop().expect("peeked Some above");
            self.partitions[entry.partition].push(entry.task);
            promoted += 1;
        }
        promoted
    }

    pub fn metrics(&self) -> QueueMetrics {
        let now = Utc::now();
        let oldest_item_age_ms = self
            .partitions
            .iter()
            .filter_map(|p| p.oldest_created_at())
            .min()
            .map(|oldest| (now - oldest).num_milliseconds());
        QueueMetrics {
            total_depth: self.total_depth.load(AtomicOrdering::Relaxed),
            oldest_item_age_ms,
            per_partition_lag: self.partitions.iter().map(|p| p.len()).collect(),
        }
    }
}

#[derive(Debug)]
pub enum RequeueOutcome {
    Requeued,
    Exhausted(Task),
}

/// `base * multiplier^attempt`, capped at `max`, with +/- jitter fraction
/// applied multiplicatively.
pub fn backoff_with_jitter(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    multiplier: f64,
    jitter_fraction: f64,
) -> u64 {
    let raw = (base_ms as f64) * multiplier.powi(attempt as i32);
    let capped = raw.min(max_ms as f64);
    let jitter_span = capped * jitter_fraction;
    let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_span;
    (capped + jitter).max(0.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskType;
    use serde_json::json;

    fn cfg() -> QueueConfig {
        QueueConfig {
            backpressure_threshold: 3,
            ..QueueConfig::default()
        }
    }

    fn task(priority: u8) -> Task {
        Task::new(TaskId(1), TaskType::Parse, priority, json!({}))
    }

    #[test]
    fn enqueue_fails_over_backpressure_threshold() {
        let q = PartitionedQueue::new(cfg());
        for _ in 0..3 {
            q.enqueue(task(5), Some("ns/mod")).unwrap();
        }
        let err = q.enqueue(task(5), Some("ns/mod")).unwrap_err();
        assert!(matches!(err, QueueError::Overflow { .. }));
    }

    #[test]
    fn hash_strategy_is_stable_for_same_key() {
        let q = PartitionedQueue::new(QueueConfig::default());
        let t = task(5);
        let p1 = q.partition_for(&t, Some("ns/mod"));
        let p2 = q.partition_for(&t, Some("ns/mod"));
        assert_eq!(p1, p2);
    }

    #[test]
    fn requeue_exhausts_after_max_retries() {
        let q = PartitionedQueue::new(QueueConfig::default());
        let mut t = task(5).with_max_retries(1);
        t.retry_count = 1;
        match q.requeue(t, None) {
            Some(RequeueOutcome::Exhausted(_)) => {}
            other => panic!("expected exhausted outcome, got {other:?}"),
        }
    }

    #[test]
    fn sweep_promotes_due_scheduled_tasks() {
        let q = PartitionedQueue::new(QueueConfig::default());
        let mut t = task(5);
        t.scheduled_at = Some(Utc::now() + chrono::Duration::milliseconds(-10));
        q.enqueue(t, Some("ns/mod")).unwrap();
        let promoted = q.sweep_scheduled(Utc::now());
        assert_eq!(promoted, 1);
    }

    #[test]
    fn backoff_grows_and_respects_cap() {
        let d0 = backoff_with_jitter(0, 100, 1000, 2.0, 0.0);
        let d3 = backoff_with_jitter(3, 100, 1000, 2.0, 0.0);
        assert!(d3 >= d0);
        assert!(d3 <= 1000);
    }
}
