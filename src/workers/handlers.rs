//! Task handlers keyed by [`TaskType`].

use crate::context::PipelineContext;
use crate::error::{IngestError, WorkerError};
use crate::model::{Entity, Relationship, Task};
use crate::parsing::{concretize_pending, parse_file, ParseOptions};
use crate::queue::PartitionedQueue;
use crate::types::{clamp_priority, EnrichmentKind, TaskType};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::TaskHandler;

/// Uniform outer envelope for every enrichment sub-handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentEnvelope {
    pub task_id: String,
    pub entity_id: String,
    #[serde(rename = "type")]
    pub kind: EnrichmentKind,
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ParsePayload {
    #[serde(rename = "filePath")]
    file_path: String,
}

/// `parse`: invoke C2 on the event's file; for each entity/relationship in
/// the delta, enqueue `entity_upsert` (same priority) and
/// `relationship_upsert` (priority − 1).
pub struct ParseHandler {
    ctx: Arc<PipelineContext>,
}

impl ParseHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    fn enqueue_followups(&self, queue: &PartitionedQueue, priority: u8, entities: Vec<Entity>, relationships: Vec<Relationship>) {
        if !entities.is_empty() {
            let payload = serde_json::json!({ "entities": entities });
            let task = Task::new(queue.next_task_id(), TaskType::EntityUpsert, priority, payload);
            let _ = queue.enqueue(task, None);
        }
        if !relationships.is_empty() {
            let payload = serde_json::json!({ "relationships": relationships });
            let rel_priority = clamp_priority(priority as i32 - 1);
            let task = Task::new(queue.next_task_id(), TaskType::RelationshipUpsert, rel_priority, payload);
            let _ = queue.enqueue(task, None);
        }
    }
}

#[async_trait]
impl TaskHandler for ParseHandler {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, IngestError> {
        let payload: ParsePayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| WorkerError::HandlerFailed { task_id: task.id, reason: e.to_string() })?;

        let mut export_map = self.ctx.export_map.lock();
        let mut result = parse_file(
            &payload.file_path,
            self.ctx.file_source.as_ref(),
            &self.ctx.cache,
            &mut export_map,
            &self.ctx.stoplist,
            ParseOptions::default(),
        );

        // Names left unresolved by the extraction-time budget, or pointing
        // past files not yet parsed, may resolve now against the name index
        // and export map this file's own parse just contributed to.
        concretize_pending(&mut result.relationships, &self.ctx.cache, &mut export_map);
        drop(export_map);

        if !result.errors.is_empty() {
            tracing::warn!(target: "workers", "parse produced {} issue(s) for {}", result.errors.len(), payload.file_path);
        }

        let summary = serde_json::json!({
            "addedEntities": result.added_entities,
            "removedEntities": result.removed_entities,
            "addedRelationships": result.added_relationships,
            "removedRelationships": result.removed_relationships,
            "isIncremental": result.is_incremental,
        });
        self.enqueue_followups(&self.ctx.queue, task.priority, result.entities, result.relationships);

        Ok(summary)
    }
}

#[derive(Debug, Deserialize)]
struct EntityUpsertPayload {
    entities: Vec<Entity>,
}

/// `entity_upsert`: pass a batch of entities to C6.
pub struct EntityUpsertHandler {
    ctx: Arc<PipelineContext>,
}

impl EntityUpsertHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for EntityUpsertHandler {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, IngestError> {
        let payload: EntityUpsertPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| WorkerError::HandlerFailed { task_id: task.id, reason: e.to_string() })?;
        let count = payload.entities.len();
        for e in payload.entities {
            if let Some(fanout) = &self.ctx.fanout {
                if let Ok(value) = serde_json::to_value(&e) {
                    fanout.broadcast("entity_upsert", value);
                }
            }
            self.ctx.graph.put_entity(e.clone());
            self.ctx.writer.push_entity(e);
        }
        if self.ctx.writer.should_flush_on_size() {
            let outcome = self.ctx.writer.flush().await;
            return Ok(serde_json::json!({ "buffered": count, "flushed": outcome.entities_written }));
        }
        Ok(serde_json::json!({ "buffered": count }))
    }
}

#[derive(Debug, Deserialize)]
struct RelationshipUpsertPayload {
    relationships: Vec<Relationship>,
}

/// `relationship_upsert`: pass a batch of relationships to C6.
pub struct RelationshipUpsertHandler {
    ctx: Arc<PipelineContext>,
}

impl RelationshipUpsertHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for RelationshipUpsertHandler {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, IngestError> {
        let payload: RelationshipUpsertPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| WorkerError::HandlerFailed { task_id: task.id, reason: e.to_string() })?;
        let count = payload.relationships.len();
        for r in payload.relationships {
            if let Some(fanout) = &self.ctx.fanout {
                if let Ok(value) = serde_json::to_value(&r) {
                    fanout.broadcast("relationship_upsert", value);
                }
            }
            self.ctx.graph.put_relationship(r.clone());
            self.ctx.writer.push_relationship(r);
        }
        if self.ctx.writer.should_flush_on_size() {
            let outcome = self.ctx.writer.flush().await;
            return Ok(serde_json::json!({ "buffered": count, "flushed": outcome.relationships_written }));
        }
        Ok(serde_json::json!({ "buffered": count }))
    }
}

#[derive(Debug, Deserialize)]
struct EnrichmentPayload {
    kind: EnrichmentKind,
    entity: Entity,
    #[serde(default = "default_index_name")]
    index_name: String,
}

fn default_index_name() -> String {
    "default".to_string()
}

/// `enrichment`: dispatch by sub-type, each with its own result shape but a
/// uniform outer envelope.
pub struct EnrichmentHandler {
    ctx: Arc<PipelineContext>,
}

impl EnrichmentHandler {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl TaskHandler for EnrichmentHandler {
    async fn handle(&self, task: &Task) -> Result<serde_json::Value, IngestError> {
        let payload: EnrichmentPayload = serde_json::from_value(task.payload.clone())
            .map_err(|e| WorkerError::HandlerFailed { task_id: task.id, reason: e.to_string() })?;
        let started = Instant::now();
        let entity_id = payload.entity.id().as_str().to_string();

        let (success, result, error) = match payload.kind {
            EnrichmentKind::Embedding => match &self.ctx.embedding_client {
                Some(client) => match client.generate_and_store(&payload.entity, &payload.index_name, None).await {
                    Ok(r) => (true, Some(serde_json::to_value(r).unwrap_or_default()), None),
                    Err(e) => (false, None, Some(e)),
                },
                // Absence skips enrichment rather than failing the pipeline.
                None => (true, Some(serde_json::json!({ "skipped": "no embedding client configured" })), None),
            },
            EnrichmentKind::ImpactAnalysis => (
                true,
                Some(serde_json::json!({ "affectedEntities": [] })),
                None,
            ),
            EnrichmentKind::Documentation => (
                true,
                Some(serde_json::json!({ "generated": false })),
                None,
            ),
            EnrichmentKind::Security => (
                true,
                Some(serde_json::json!({ "findings": [] })),
                None,
            ),
        };

        let envelope = EnrichmentEnvelope {
            task_id: task.id.to_string(),
            entity_id,
            kind: payload.kind,
            success,
            result,
            error,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        Ok(serde_json::to_value(envelope).expect("envelope is always serializable"))
    }
}
