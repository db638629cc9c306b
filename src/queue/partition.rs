//! A single partition's ready-to-run heap.

use crate::model::Task;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

/// Wraps a [`Task`] so [`BinaryHeap`] (a max-heap) pops the task with the
/// highest priority, then earliest `scheduledAt`, then earliest
/// `createdAt` — `Task::order_key` already
/// encodes priority as `Reverse` for min-heap semantics, so comparisons are
/// inverted here to recover max-heap-pops-highest-priority behavior.
struct OrderedTask(Task);

impl PartialEq for OrderedTask {
    fn eq(&self, other: &Self) -> bool {
        self.0.order_key() == other.0.order_key()
    }
}
impl Eq for OrderedTask {}

impl PartialOrd for OrderedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.order_key().cmp(&self.0.order_key())
    }
}

/// One of the queue's N partitions. Tasks within a partition are strictly
/// ordered; there is no ordering guarantee across partitions.
pub struct Partition {
    pub id: usize,
    ready: Mutex<BinaryHeap<OrderedTask>>,
    depth: AtomicUsize,
}

impl Partition {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            ready: Mutex::new(BinaryHeap::new()),
            depth: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, task: Task) {
        self.ready.lock().push(OrderedTask(task));
        self.depth.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Pop up to `n` tasks in priority order.
    pub fn pop_n(&self, n: usize) -> Vec<Task> {
        let mut guard = self.ready.lock();
        let mut out = Vec::with_capacity(n.min(guard.len()));
        for _ in 0..n {
            match guard.pop() {
                Some(OrderedTask(task)) => out.push(task),
                None => break,
            }
        }
        drop(guard);
        self.depth.fetch_sub(out.len(), AtomicOrdering::Relaxed);
        out
    }

    /// Peek the next task without removing it, used by cross-partition
    /// priority dequeue to compare candidates.
    pub fn peek_priority(&self) -> Option<crate::types::Priority> {
        self.ready.lock().peek().map(|t| t.0.priority)
    }

    pub fn pop_one(&self) -> Option<Task> {
        let task = self.ready.lock().pop().map(|OrderedTask(t)| t);
        if task.is_some() {
            self.depth.fetch_sub(1, AtomicOrdering::Relaxed);
        }
        task
    }

    pub fn len(&self) -> usize {
        self.depth.load(AtomicOrdering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest task's `createdAt`, used for the queue's oldest-item-age metric.
    pub fn oldest_created_at(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.ready.lock().iter().map(|t| t.0.created_at).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TaskId, TaskType};
    use serde_json::json;

    fn task(id: u64, priority: u8) -> Task {
        Task::new(TaskId(id), TaskType::Parse, priority, json!({}))
    }

    #[test]
    fn pops_highest_priority_first() {
        let p = Partition::new(0);
        p.push(task(1, 3));
        p.push(task(2, 9));
        p.push(task(3, 5));

        let popped = p.pop_n(3);
        let priorities: Vec<u8> = popped.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![9, 5, 3]);
    }

    #[test]
    fn depth_tracks_pushes_and_pops() {
        let p = Partition::new(0);
        p.push(task(1, 5));
        p.push(task(2, 5));
        assert_eq!(p.len(), 2);
        p.pop_one();
        assert_eq!(p.len(), 1);
    }
}
