//! Pipeline Orchestrator (C9) — lifecycle state machine, component wiring,
//! and ingress priority assignment.

use crate::cache::CacheIndex;
use crate::checkpoints::graph::GraphIndex;
use crate::checkpoints::CheckpointStore;
use crate::config::Settings;
use crate::context::PipelineContext;
use crate::error::{IngestError, IngestResult};
use crate::fanout::SessionManager;
use crate::model::{ChangeEvent, Task};
use crate::parsing::{ExportMap, FsFileSource, StopList};
use crate::queue::PartitionedQueue;
use crate::sink::{EmbeddingClient, KnowledgeGraphSink};
use crate::types::{clamp_priority, EventKind, Priority, TaskType};
use crate::workers::handlers::{EnrichmentHandler, EntityUpsertHandler, ParseHandler, RelationshipUpsertHandler};
use crate::workers::{HandlerRegistry, WorkerPool};
use crate::writer::BatchWriter;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Stopped,
    Starting,
    Running,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    Error,
}

impl PipelineState {
    /// Linear transitions only: invalid transitions fail.
    fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Stopped, Starting)
                | (Starting, Running)
                | (Starting, Error)
                | (Running, Pausing)
                | (Running, Stopping)
                | (Running, Error)
                | (Pausing, Paused)
                | (Paused, Resuming)
                | (Resuming, Running)
                | (Stopping, Stopped)
                | (Error, Stopped)
        )
    }
}

/// Priority base and bumps for incoming events.
const BASE_PRIORITY: i32 = 5;
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx"];
const SMALL_FILE_BYTES: u64 = 10 * 1024;

pub fn assign_priority(event: &ChangeEvent) -> Priority {
    let mut priority = BASE_PRIORITY;
    let extension = event.file_path.rsplit('.').next().unwrap_or("");
    if SOURCE_EXTENSIONS.contains(&extension) {
        priority += 2;
    }
    if event.size < SMALL_FILE_BYTES {
        priority += 1;
    }
    if event.event_type == EventKind::Modified {
        priority += 1;
    }
    clamp_priority(priority)
}

pub struct Pipeline {
    state: RwLock<PipelineState>,
    settings: Settings,
    current_epoch: Arc<AtomicU64>,
    queue: Mutex<Option<Arc<PartitionedQueue>>>,
    workers: Mutex<Option<Arc<WorkerPool>>>,
    writer: Mutex<Option<Arc<BatchWriter>>>,
    sink: Arc<dyn KnowledgeGraphSink>,
    embedding_client: Option<Arc<dyn EmbeddingClient>>,
    fanout: Option<SessionManager>,
    checkpoints: CheckpointStore,
    workspace_root: std::path::PathBuf,
}

impl Pipeline {
    pub fn new(settings: Settings, sink: Arc<dyn KnowledgeGraphSink>, embedding_client: Option<Arc<dyn EmbeddingClient>>, workspace_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            state: RwLock::new(PipelineState::Stopped),
            settings,
            current_epoch: Arc::new(AtomicU64::new(0)),
            queue: Mutex::new(None),
            workers: Mutex::new(None),
            writer: Mutex::new(None),
            sink,
            embedding_client,
            fanout: None,
            checkpoints: CheckpointStore::new(GraphIndex::new()),
            workspace_root: workspace_root.into(),
        }
    }

    /// Attach the subscription fan-out layer so upserts are pushed to
    /// connected sessions as they occur.
    pub fn with_fanout(mut self, fanout: SessionManager) -> Self {
        self.fanout = Some(fanout);
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.read()
    }

    /// Handle to the checkpoint store, for administrative operations
    /// outside the hot path — it reads the same graph the upsert handlers
    /// populate, independent of pipeline start/stop cycles.
    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn transition(&self, next: PipelineState) -> IngestResult<()> {
        let mut state = self.state.write();
        if !state.can_transition_to(next) {
            return Err(IngestError::PipelineNotRunning(format!("{:?} -> {:?} is not a valid transition", *state, next)));
        }
        tracing::info!(target: "orchestrator", "pipeline {:?} -> {:?}", *state, next);
        *state = next;
        Ok(())
    }

    /// Initializes C4/C5/C6 in that order and registers handlers
    ///.
    pub fn start(self: &Arc<Self>) -> IngestResult<()> {
        self.transition(PipelineState::Starting)?;
        self.current_epoch.fetch_add(1, Ordering::Relaxed);

        let queue = Arc::new(PartitionedQueue::new(self.settings.queue.clone()));
        let writer = Arc::new(BatchWriter::new(self.sink.clone(), self.settings.batching.clone(), self.current_epoch.clone()));

        let ctx = Arc::new(PipelineContext {
            cache: CacheIndex::new(),
            export_map: Arc::new(Mutex::new(ExportMap::new())),
            stoplist: Arc::new(StopList::default()),
            file_source: Arc::new(FsFileSource::new(self.workspace_root.clone())),
            queue: queue.clone(),
            writer: writer.clone(),
            embedding_client: self.embedding_client.clone(),
            fanout: self.fanout.clone(),
            graph: self.checkpoints.graph().clone(),
        });

        let mut registry = HandlerRegistry::new();
        registry.register(TaskType::Parse, Arc::new(ParseHandler::new(ctx.clone())));
        registry.register(TaskType::EntityUpsert, Arc::new(EntityUpsertHandler::new(ctx.clone())));
        registry.register(TaskType::RelationshipUpsert, Arc::new(RelationshipUpsertHandler::new(ctx.clone())));
        registry.register(TaskType::Enrichment, Arc::new(EnrichmentHandler::new(ctx.clone())));

        let workers = Arc::new(WorkerPool::new(queue.clone(), Arc::new(registry), self.settings.workers.clone()));
        workers.start();

        *self.queue.lock() = Some(queue);
        *self.workers.lock() = Some(workers);
        *self.writer.lock() = Some(writer);

        self.transition(PipelineState::Running)
    }

    /// Stops accepting new events but drains the queue.
    pub fn pause(&self) -> IngestResult<()> {
        self.transition(PipelineState::Pausing)?;
        self.transition(PipelineState::Paused)
    }

    pub fn resume(&self) -> IngestResult<()> {
        self.transition(PipelineState::Resuming)?;
        self.transition(PipelineState::Running)
    }

    /// Reverses `start`'s init order: workers, then a final writer flush.
    pub async fn stop(&self) -> IngestResult<()> {
        self.transition(PipelineState::Stopping)?;
        if let Some(workers) = self.workers.lock().take() {
            workers.stop().await;
        }
        if let Some(writer) = self.writer.lock().take() {
            writer.flush().await;
        }
        *self.queue.lock() = None;
        self.transition(PipelineState::Stopped)
    }

    /// Accept one change event: assign priority, enqueue a `parse` task.
    pub fn ingest_change_event(&self, event: ChangeEvent) -> IngestResult<()> {
        if self.state() != PipelineState::Running {
            return Err(IngestError::PipelineNotRunning(format!("{:?}", self.state())));
        }
        event.validate().map_err(IngestError::InvalidInput)?;
        let priority = assign_priority(&event);
        let queue = self.queue.lock().clone().ok_or_else(|| IngestError::PipelineNotRunning("queue not initialized".to_string()))?;
        let payload = serde_json::json!({ "filePath": event.file_path });
        let task = Task::new(queue.next_task_id(), TaskType::Parse, priority, payload).with_partition_key(event.partition_key());
        queue.enqueue(task, None)?;
        Ok(())
    }

    pub fn ingest_change_events(&self, events: Vec<ChangeEvent>) -> Vec<IngestResult<()>> {
        events.into_iter().map(|e| self.ingest_change_event(e)).collect()
    }

    pub fn queue_handle(&self) -> Option<Arc<PartitionedQueue>> {
        self.queue.lock().clone()
    }

    pub fn worker_pool_handle(&self) -> Option<Arc<WorkerPool>> {
        self.workers.lock().clone()
    }

    /// One round of the background sweeps that run alongside the
    /// worker tasks: scheduled-task promotion, auto-scale evaluation, and
    /// idle-session termination. Call on a fixed interval from the driving
    /// binary; each sweep is independently cheap and non-blocking.
    pub fn tick_background_sweeps(&self) {
        if let Some(queue) = self.queue_handle() {
            let promoted = queue.sweep_scheduled(chrono::Utc::now());
            if promoted > 0 {
                tracing::debug!(target: "orchestrator", "promoted {promoted} scheduled task(s)");
            }
        }
        if let Some(workers) = self.worker_pool_handle() {
            workers.maybe_scale();
        }
        if let Some(fanout) = &self.fanout {
            fanout.sweep_idle_sessions();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn event(file_path: &str, size: u64, event_type: EventKind) -> ChangeEvent {
        ChangeEvent {
            id: "evt-1".to_string(),
            namespace: "ns".to_string(),
            module: "mod".to_string(),
            file_path: file_path.to_string(),
            event_type,
            timestamp: chrono::Utc::now(),
            size,
            diff_hash: "h".to_string(),
            metadata: Default::default(),
        }
    }

    #[test]
    fn base_priority_for_large_non_source_created_file() {
        let e = event("README.md", 50_000, EventKind::Created);
        assert_eq!(assign_priority(&e), 5);
    }

    #[test]
    fn bumps_stack_and_cap_at_max() {
        let e = event("src/a.ts", 100, EventKind::Modified);
        assert_eq!(assign_priority(&e), 9);
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let state = PipelineState::Stopped;
        assert!(!state.can_transition_to(PipelineState::Paused));
        assert!(state.can_transition_to(PipelineState::Starting));
    }
}
