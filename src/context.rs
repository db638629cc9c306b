//! Wiring shared by the worker pool's handlers: the pieces
//! of C1-C4 and C6 a `parse` task needs to run end to end and enqueue its
//! own follow-up tasks.

use crate::cache::CacheIndex;
use crate::checkpoints::graph::GraphIndex;
use crate::fanout::SessionManager;
use crate::parsing::{ExportMap, FsFileSource, StopList};
use crate::queue::PartitionedQueue;
use crate::sink::EmbeddingClient;
use crate::writer::BatchWriter;
use parking_lot::Mutex;
use std::sync::Arc;

// The type-resolution budget (C3) is per-file, not part of this shared
// context — `parse_file` constructs one scaled to each file's size and
// complexity rather than spending from a single pipeline-wide counter.
pub struct PipelineContext {
    pub cache: CacheIndex,
    pub export_map: Arc<Mutex<ExportMap>>,
    pub stoplist: Arc<StopList>,
    pub file_source: Arc<FsFileSource>,
    pub queue: Arc<PartitionedQueue>,
    pub writer: Arc<BatchWriter>,
    pub embedding_client: Option<Arc<dyn EmbeddingClient>>,
    /// Pushes `entity_upsert`/`relationship_upsert` events to subscribers
    /// as upserts occur. Absent in contexts with no fan-out transport, e.g.
    /// tests.
    pub fanout: Option<SessionManager>,
    /// Local read mirror of committed graph state, populated at the same
    /// upsert point as `fanout`, feeding C11's BFS and time-travel reads.
    pub graph: GraphIndex,
}
