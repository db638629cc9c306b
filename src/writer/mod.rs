//! Batch/Streaming Writer (C6) — buffers fragments and emits batches to the
//! external knowledge-graph sink under size, timeout, or explicit-flush
//! triggers.

pub mod dag;
pub mod idempotency;

use crate::config::BatchingConfig;
use crate::error::WriteError;
use crate::model::{Entity, Relationship};
use crate::sink::{BulkAck, KnowledgeGraphSink};
use idempotency::IdempotencySet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

struct Tagged<T> {
    item: T,
    epoch: u64,
    enqueued_at: Instant,
}

/// Outcome of a single flush: what landed, and what must be handed to the
/// error/retry layer (C7) for dead-lettering.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub entities_written: usize,
    pub relationships_written: usize,
    pub dead_lettered_entities: Vec<(Entity, WriteError)>,
    pub dead_lettered_relationships: Vec<(Relationship, WriteError)>,
}

/// Fixed backoff schedule for the writer's own batch retries — distinct
/// from C7's configurable retry handler, which wraps calls made by other
/// components.
const RETRY_BASE_MS: u64 = 100;
const RETRY_MAX_MS: u64 = 5_000;
const RETRY_MULTIPLIER: f64 = 2.0;
const RETRY_JITTER: f64 = 0.2;

pub struct BatchWriter {
    sink: Arc<dyn KnowledgeGraphSink>,
    config: BatchingConfig,
    entity_buffer: Mutex<Vec<Tagged<Entity>>>,
    relationship_buffer: Mutex<Vec<Tagged<Relationship>>>,
    idempotency: IdempotencySet,
    current_epoch: Arc<AtomicU64>,
    in_flight: Arc<Semaphore>,
}

impl BatchWriter {
    pub fn new(sink: Arc<dyn KnowledgeGraphSink>, config: BatchingConfig, current_epoch: Arc<AtomicU64>) -> Self {
        let idempotency = IdempotencySet::new(Duration::from_secs(config.idempotency_ttl_secs));
        let in_flight = Arc::new(Semaphore::new(config.max_concurrent_batches.max(1)));
        Self {
            sink,
            config,
            entity_buffer: Mutex::new(Vec::new()),
            relationship_buffer: Mutex::new(Vec::new()),
            idempotency,
            current_epoch,
            in_flight,
        }
    }

    pub fn push_entity(&self, entity: Entity) {
        let epoch = self.current_epoch.load(Ordering::Relaxed);
        self.entity_buffer.lock().expect("writer mutex poisoned").push(Tagged {
            item: entity,
            epoch,
            enqueued_at: Instant::now(),
        });
    }

    pub fn push_relationship(&self, relationship: Relationship) {
        let epoch = self.current_epoch.load(Ordering::Relaxed);
        self.relationship_buffer
            .lock()
            .expect("writer mutex poisoned")
            .push(Tagged {
                item: relationship,
                epoch,
                enqueued_at: Instant::now(),
            });
    }

    pub fn entity_buffer_len(&self) -> usize {
        self.entity_buffer.lock().expect("writer mutex poisoned").len()
    }

    pub fn relationship_buffer_len(&self) -> usize {
        self.relationship_buffer.lock().expect("writer mutex poisoned").len()
    }

    /// Whether either buffer has reached its configured trigger size.
    pub fn should_flush_on_size(&self) -> bool {
        self.entity_buffer_len() >= self.config.entity_batch_size
            || self.relationship_buffer_len() >= self.config.relationship_batch_size
    }

    fn drain_fresh<T>(buffer: &Mutex<Vec<Tagged<T>>>, current_epoch: u64, epoch_ttl: Duration) -> (Vec<T>, usize) {
        let drained: Vec<Tagged<T>> = std::mem::take(&mut *buffer.lock().expect("writer mutex poisoned"));
        let mut fresh = Vec::with_capacity(drained.len());
        let mut dropped_stale = 0;
        for tagged in drained {
            let stale = tagged.epoch != current_epoch || tagged.enqueued_at.elapsed() > epoch_ttl;
            if stale {
                dropped_stale += 1;
            } else {
                fresh.push(tagged.item);
            }
        }
        (fresh, dropped_stale)
    }

    /// Flush both buffers, splitting into entities-then-relationships when
    /// DAG ordering requires it, retrying transient failures with backoff
    /// up to the configured attempt cap.
    pub async fn flush(&self) -> FlushOutcome {
        let current_epoch = self.current_epoch.load(Ordering::Relaxed);
        let epoch_ttl = Duration::from_secs(self.config.epoch_ttl_secs);

        let (entities, stale_entities) = Self::drain_fresh(&self.entity_buffer, current_epoch, epoch_ttl);
        let (relationships, stale_rels) = Self::drain_fresh(&self.relationship_buffer, current_epoch, epoch_ttl);
        if stale_entities > 0 || stale_rels > 0 {
            tracing::warn!(
                target: "writer",
                "dropped {stale_entities} stale entities and {stale_rels} stale relationships (epoch {current_epoch})"
            );
        }
        if entities.is_empty() && relationships.is_empty() {
            return FlushOutcome::default();
        }

        let key = idempotency::batch_key(
            &entities
                .iter()
                .map(|e| e.id().as_str().to_string())
                .chain(relationships.iter().map(|r| r.id.0.clone()))
                .collect::<Vec<_>>(),
        );
        if !self.idempotency.check_and_insert(&key) {
            tracing::warn!(target: "writer", "suppressed duplicate batch {key}");
            return FlushOutcome::default();
        }

        let _permit = self.in_flight.acquire().await.expect("semaphore not closed");

        let mut outcome = FlushOutcome::default();
        if dag::needs_split(&entities, &relationships) {
            self.commit_entities(&entities, &mut outcome).await;
            self.commit_relationships(&relationships, &mut outcome).await;
        } else {
            let mut entity_outcome = FlushOutcome::default();
            let mut relationship_outcome = FlushOutcome::default();
            tokio::join!(
                self.commit_entities(&entities, &mut entity_outcome),
                self.commit_relationships(&relationships, &mut relationship_outcome),
            );
            outcome.entities_written = entity_outcome.entities_written;
            outcome.dead_lettered_entities = entity_outcome.dead_lettered_entities;
            outcome.relationships_written = relationship_outcome.relationships_written;
            outcome.dead_lettered_relationships = relationship_outcome.dead_lettered_relationships;
        }
        outcome
    }

    async fn commit_entities(&self, entities: &[Entity], outcome: &mut FlushOutcome) {
        if entities.is_empty() {
            return;
        }
        match self.write_with_retry(|| self.sink.create_entities_bulk(entities)).await {
            Ok(ack) => outcome.entities_written += ack.count,
            Err(err) => {
                if entities.len() <= self.config.per_item_retry_threshold {
                    for e in entities {
                        match self.write_with_retry(|| self.sink.create_entities_bulk(std::slice::from_ref(e))).await {
                            Ok(ack) => outcome.entities_written += ack.count,
                            Err(per_item_err) => outcome.dead_lettered_entities.push((e.clone(), per_item_err)),
                        }
                    }
                } else {
                    for e in entities {
                        outcome
                            .dead_lettered_entities
                            .push((e.clone(), WriteError::Persistent(err.to_string())));
                    }
                }
            }
        }
    }

    async fn commit_relationships(&self, relationships: &[Relationship], outcome: &mut FlushOutcome) {
        if relationships.is_empty() {
            return;
        }
        match self
            .write_with_retry(|| self.sink.create_relationships_bulk(relationships))
            .await
        {
            Ok(ack) => outcome.relationships_written += ack.count,
            Err(err) => {
                if relationships.len() <= self.config.per_item_retry_threshold {
                    for r in relationships {
                        match self
                            .write_with_retry(|| self.sink.create_relationships_bulk(std::slice::from_ref(r)))
                            .await
                        {
                            Ok(ack) => outcome.relationships_written += ack.count,
                            Err(per_item_err) => outcome.dead_lettered_relationships.push((r.clone(), per_item_err)),
                        }
                    }
                } else {
                    for r in relationships {
                        outcome
                            .dead_lettered_relationships
                            .push((r.clone(), WriteError::Persistent(err.to_string())));
                    }
                }
            }
        }
    }

    /// Retry a transient failure with exponential backoff up to
    /// `max_batch_retry_attempts`; a persistent failure is returned
    /// immediately so the caller can fall back to per-item retry.
    async fn write_with_retry<F, Fut>(&self, mut call: F) -> Result<BulkAck, WriteError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<BulkAck, WriteError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Ok(ack) => return Ok(ack),
                Err(WriteError::Transient(reason)) if attempt < self.config.max_batch_retry_attempts => {
                    let delay = crate::queue::backoff_with_jitter(
                        attempt,
                        RETRY_BASE_MS,
                        RETRY_MAX_MS,
                        RETRY_MULTIPLIER,
                        RETRY_JITTER,
                    );
                    tracing::warn!(target: "writer", "transient write failure (attempt {attempt}): {reason}, retrying in {delay}ms");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileEntity;
    use crate::sink::InMemorySink;

    fn cfg() -> BatchingConfig {
        BatchingConfig {
            entity_batch_size: 2,
            relationship_batch_size: 2,
            embedding_batch_size: 2,
            timeout_ms: 500,
            max_concurrent_batches: 4,
            idempotency_ttl_secs: 300,
            epoch_ttl_secs: 300,
            max_batch_retry_attempts: 2,
            per_item_retry_threshold: 10,
        }
    }

    fn file_entity(path: &str) -> Entity {
        Entity::File(FileEntity {
            id: FileEntity::compute_id(path),
            path: path.to_string(),
            extension: "ts".to_string(),
            size: 1,
            line_count: 1,
            language: "typescript".to_string(),
            dependencies: vec![],
            is_test: false,
            is_config: false,
            hash: "h".to_string(),
        })
    }

    #[tokio::test]
    async fn flush_writes_buffered_entities() {
        let sink = Arc::new(InMemorySink::new());
        let writer = BatchWriter::new(sink.clone(), cfg(), Arc::new(AtomicU64::new(1)));
        writer.push_entity(file_entity("src/a.ts"));
        writer.push_entity(file_entity("src/b.ts"));
        let outcome = writer.flush().await;
        assert_eq!(outcome.entities_written, 2);
        assert_eq!(sink.entity_count(), 2);
    }

    #[tokio::test]
    async fn stale_epoch_fragments_are_dropped_without_writing() {
        let sink = Arc::new(InMemorySink::new());
        let epoch = Arc::new(AtomicU64::new(1));
        let writer = BatchWriter::new(sink.clone(), cfg(), epoch.clone());
        writer.push_entity(file_entity("src/a.ts"));
        epoch.store(2, Ordering::Relaxed);
        let outcome = writer.flush().await;
        assert_eq!(outcome.entities_written, 0);
        assert_eq!(sink.entity_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_flush_is_idempotent() {
        let sink = Arc::new(InMemorySink::new());
        let writer = BatchWriter::new(sink.clone(), cfg(), Arc::new(AtomicU64::new(1)));
        writer.push_entity(file_entity("src/a.ts"));
        writer.flush().await;
        writer.push_entity(file_entity("src/a.ts"));
        let outcome = writer.flush().await;
        assert_eq!(outcome.entities_written, 0);
    }
}
