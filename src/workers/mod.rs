//! Worker Pool (C5) — auto-scaled workers pulling tasks from C4 and
//! dispatching to a registered handler keyed by task type.

pub mod handlers;

use crate::config::WorkersConfig;
use crate::error::{IngestError, WorkerError};
use crate::model::Task;
use crate::queue::PartitionedQueue;
use crate::types::TaskType;
use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Busy,
    Erroring,
    Restarting,
}

#[derive(Debug, Clone)]
pub struct WorkerState {
    pub id: usize,
    pub status: WorkerStatus,
    pub current_task_id: Option<crate::types::TaskId>,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub consecutive_errors: u32,
}

impl WorkerState {
    fn new(id: usize) -> Self {
        Self {
            id,
            status: WorkerStatus::Idle,
            current_task_id: None,
            last_heartbeat: chrono::Utc::now(),
            consecutive_errors: 0,
        }
    }
}

/// Dispatch target for one [`TaskType`].
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, IngestError>;
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned()
    }
}

struct RunningWorker {
    state: Arc<SyncMutex<WorkerState>>,
    stop: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

/// A pool of workers pulling from the partitioned queue.
pub struct WorkerPool {
    queue: Arc<PartitionedQueue>,
    registry: Arc<HandlerRegistry>,
    config: WorkersConfig,
    workers: SyncMutex<Vec<RunningWorker>>,
    next_id: AtomicUsize,
    last_scale_at: SyncMutex<Instant>,
}

impl WorkerPool {
    pub fn new(queue: Arc<PartitionedQueue>, registry: Arc<HandlerRegistry>, config: WorkersConfig) -> Self {
        Self {
            queue,
            registry,
            config,
            workers: SyncMutex::new(Vec::new()),
            next_id: AtomicUsize::new(0),
            last_scale_at: SyncMutex::new(Instant::now()),
        }
    }

    /// Start the pool at its configured minimum size.
    pub fn start(self: &Arc<Self>) {
        for _ in 0..self.config.min {
            self.spawn_worker();
        }
    }

    /// Signal every worker to stop after its current task and join them.
    pub async fn stop(&self) {
        let running = std::mem::take(&mut *self.workers.lock());
        for w in &running {
            w.stop.store(true, Ordering::Relaxed);
        }
        for w in running {
            let _ = w.join.await;
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    pub fn states(&self) -> Vec<WorkerState> {
        self.workers.lock().iter().map(|w| w.state.lock().clone()).collect()
    }

    fn spawn_worker(self: &Arc<Self>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(SyncMutex::new(WorkerState::new(id)));
        let stop = Arc::new(AtomicBool::new(false));
        let pool = Arc::clone(self);
        let worker_state = Arc::clone(&state);
        let worker_stop = Arc::clone(&stop);
        let join = tokio::spawn(async move {
            pool.run_worker(id, worker_state, worker_stop).await;
        });
        self.workers.lock().push(RunningWorker { state, stop, join });
    }

    async fn run_worker(self: Arc<Self>, id: usize, state: Arc<SyncMutex<WorkerState>>, stop: Arc<AtomicBool>) {
        loop {
            if stop.load(Ordering::Relaxed) {
                return;
            }
            let Some(task) = self.queue.dequeue_by_priority(1).into_iter().next() else {
                state.lock().status = WorkerStatus::Idle;
                tokio::time::sleep(Duration::from_millis(50)).await;
                continue;
            };

            {
                let mut s = state.lock();
                s.status = WorkerStatus::Busy;
                s.current_task_id = Some(task.id);
                s.last_heartbeat = chrono::Utc::now();
            }

            let outcome = self.dispatch(&task).await;

            let mut s = state.lock();
            s.last_heartbeat = chrono::Utc::now();
            s.current_task_id = None;
            match outcome {
                Ok(_) => {
                    s.consecutive_errors = 0;
                    s.status = WorkerStatus::Idle;
                }
                Err(err) => {
                    s.consecutive_errors += 1;
                    s.status = WorkerStatus::Erroring;
                    tracing::warn!(target: "workers", "worker {id} task {} failed: {err}", task.id);
                    if s.consecutive_errors >= self.config.consecutive_error_restart_threshold {
                        s.status = WorkerStatus::Restarting;
                        drop(s);
                        tracing::warn!(target: "workers", "restarting worker {id} after {} consecutive errors", self.config.consecutive_error_restart_threshold);
                        self.queue.requeue(task, None);
                        self.spawn_worker();
                        return;
                    }
                    drop(s);
                    self.queue.requeue(task, None);
                }
            }
        }
    }

    async fn dispatch(&self, task: &crate::model::Task) -> Result<serde_json::Value, IngestError> {
        let handler = self
            .registry
            .get(task.r#type)
            .ok_or(WorkerError::NoHandler(task.r#type))?;
        let fut = handler.handle(task);
        match tokio::time::timeout(Duration::from_millis(self.config.task_timeout_ms), fut).await {
            Ok(result) => result,
            Err(_) => Err(WorkerError::Timeout(task.id).into()),
        }
    }

    /// Auto-scale evaluation: call periodically from a background sweep
    ///.
    pub fn maybe_scale(self: &Arc<Self>) {
        let mut last_scale = self.last_scale_at.lock();
        if last_scale.elapsed() < Duration::from_millis(self.config.scale_cooldown_ms) {
            return;
        }
        let states = self.states();
        let worker_count = states.len();
        let busy = states.iter().filter(|s| s.status == WorkerStatus::Busy).count();
        let depth = self.queue.metrics().total_depth;

        if depth > self.config.scale_up_queue_depth && busy == worker_count && worker_count < self.config.max {
            self.spawn_worker();
            *last_scale = Instant::now();
            return;
        }

        let idle_ratio = if worker_count == 0 { 0.0 } else { (worker_count - busy) as f64 / worker_count as f64 };
        if idle_ratio > self.config.scale_down_idle_ratio && worker_count > self.config.min {
            if let Some(w) = self.workers.lock().pop() {
                w.stop.store(true, Ordering::Relaxed);
            }
            *last_scale = Instant::now();
        }
    }
}
