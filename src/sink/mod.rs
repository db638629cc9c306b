//! The external knowledge-graph sink.
//!
//! The pipeline never speaks to a concrete graph database directly; it
//! depends on this trait so the writer (C6) stays testable without a real
//! backing store.

pub mod embedding;

use crate::error::WriteError;
use crate::model::{Entity, Relationship};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Mutex;

pub use embedding::{EmbeddingClient, EmbeddingResult, InMemoryEmbeddingClient};

/// Uniform bulk-write acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkAck {
    pub success: bool,
    pub count: usize,
}

/// The three idempotent bulk endpoints a knowledge-graph backend exposes.
#[async_trait]
pub trait KnowledgeGraphSink: Send + Sync {
    async fn create_entities_bulk(&self, entities: &[Entity]) -> Result<BulkAck, WriteError>;
    async fn create_relationships_bulk(
        &self,
        relationships: &[Relationship],
    ) -> Result<BulkAck, WriteError>;
}

/// An in-process sink for tests and the demo binary: keeps the ids it has
/// seen so bulk calls are trivially idempotent, exactly like the real
/// backend is required to be.
#[derive(Default)]
pub struct InMemorySink {
    entity_ids: Mutex<HashSet<String>>,
    relationship_ids: Mutex<HashSet<String>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity_count(&self) -> usize {
        self.entity_ids.lock().expect("sink mutex poisoned").len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationship_ids.lock().expect("sink mutex poisoned").len()
    }
}

#[async_trait]
impl KnowledgeGraphSink for InMemorySink {
    async fn create_entities_bulk(&self, entities: &[Entity]) -> Result<BulkAck, WriteError> {
        let mut seen = self.entity_ids.lock().expect("sink mutex poisoned");
        let mut written = 0;
        for e in entities {
            if seen.insert(e.id().as_str().to_string()) {
                written += 1;
            }
        }
        Ok(BulkAck {
            success: true,
            count: written,
        })
    }

    async fn create_relationships_bulk(
        &self,
        relationships: &[Relationship],
    ) -> Result<BulkAck, WriteError> {
        let mut seen = self.relationship_ids.lock().expect("sink mutex poisoned");
        let mut written = 0;
        for r in relationships {
            if seen.insert(r.id.0.clone()) {
                written += 1;
            }
        }
        Ok(BulkAck {
            success: true,
            count: written,
        })
    }
}

/// Speaks to a real knowledge-graph service over HTTP, via its
/// `createEntitiesBulk` / `createRelationshipsBulk` endpoints.
pub struct HttpSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSink {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    fn classify(status: reqwest::StatusCode, body: String) -> WriteError {
        if status.is_server_error() || status == reqwest::StatusCode::REQUEST_TIMEOUT {
            WriteError::Transient(format!("{status}: {body}"))
        } else {
            WriteError::Persistent(format!("{status}: {body}"))
        }
    }
}

#[async_trait]
impl KnowledgeGraphSink for HttpSink {
    async fn create_entities_bulk(&self, entities: &[Entity]) -> Result<BulkAck, WriteError> {
        let resp = self
            .client
            .post(format!("{}/entities:bulk", self.base_url))
            .json(&entities)
            .send()
            .await
            .map_err(|e| WriteError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }
        resp.json().await.map_err(|e| WriteError::Transient(e.to_string()))
    }

    async fn create_relationships_bulk(
        &self,
        relationships: &[Relationship],
    ) -> Result<BulkAck, WriteError> {
        let resp = self
            .client
            .post(format!("{}/relationships:bulk", self.base_url))
            .json(&relationships)
            .send()
            .await
            .map_err(|e| WriteError::Transient(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, body));
        }
        resp.json().await.map_err(|e| WriteError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileEntity;

    fn file_entity(path: &str) -> Entity {
        Entity::File(FileEntity {
            id: FileEntity::compute_id(path),
            path: path.to_string(),
            extension: "ts".to_string(),
            size: 10,
            line_count: 1,
            language: "typescript".to_string(),
            dependencies: vec![],
            is_test: false,
            is_config: false,
            hash: "deadbeef".to_string(),
        })
    }

    #[tokio::test]
    async fn in_memory_sink_dedupes_by_id() {
        let sink = InMemorySink::new();
        let e = file_entity("src/a.ts");
        sink.create_entities_bulk(&[e.clone()]).await.unwrap();
        let ack = sink.create_entities_bulk(&[e]).await.unwrap();
        assert_eq!(ack.count, 0);
        assert_eq!(sink.entity_count(), 1);
    }
}
