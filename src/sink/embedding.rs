//! The embedding service dependency.
//!
//! Absence skips enrichment rather than failing the pipeline: callers treat
//! `None` clients and transport errors the same way — best-effort.

use crate::model::Entity;
use crate::types::CheckpointId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResult {
    pub entity_id: String,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, Value>,
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn generate_and_store(
        &self,
        entity: &Entity,
        index_name: &str,
        checkpoint_id: Option<CheckpointId>,
    ) -> Result<EmbeddingResult, String>;
}

/// Deterministic stand-in used by tests and the demo binary: derives a
/// fixed-length vector from the entity id's bytes rather than calling a
/// real model.
#[derive(Default)]
pub struct InMemoryEmbeddingClient {
    calls: Mutex<usize>,
}

impl InMemoryEmbeddingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_count(&self) -> usize {
        *self.calls.lock().expect("embedding client mutex poisoned")
    }
}

#[async_trait]
impl EmbeddingClient for InMemoryEmbeddingClient {
    async fn generate_and_store(
        &self,
        entity: &Entity,
        index_name: &str,
        checkpoint_id: Option<CheckpointId>,
    ) -> Result<EmbeddingResult, String> {
        *self.calls.lock().expect("embedding client mutex poisoned") += 1;
        let id = entity.id().as_str();
        let vector: Vec<f32> = id.bytes().take(8).map(|b| b as f32 / 255.0).collect();
        let mut metadata = HashMap::new();
        metadata.insert("indexName".to_string(), Value::String(index_name.to_string()));
        if let Some(cp) = checkpoint_id {
            metadata.insert("checkpointId".to_string(), Value::String(cp.to_string()));
        }
        Ok(EmbeddingResult {
            entity_id: id.to_string(),
            vector,
            metadata,
        })
    }
}
