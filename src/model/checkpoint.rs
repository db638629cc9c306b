//! `Checkpoint` — a named subgraph snapshot seeded by entity ids (C11).

use crate::model::{Entity, Relationship};
use crate::types::{CheckpointId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointReason {
    Daily,
    Incident,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub reason: CheckpointReason,
    pub seed_entity_ids: Vec<EntityId>,
    pub hop_limit: u32,
    pub window: TimeWindow,
    pub timestamp: DateTime<Utc>,
}

/// Export format for a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointExport {
    pub checkpoint: Checkpoint,
    pub members: Vec<EntityId>,
    pub relationships: Option<Vec<Relationship>>,
}

/// Summary: counts of member entities by their coarse entity-variant tag.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CheckpointSummary {
    pub total: usize,
    pub files: usize,
    pub directories: usize,
    pub modules: usize,
    pub symbols: usize,
}

impl CheckpointSummary {
    pub fn from_entities(entities: &[Entity]) -> Self {
        let mut summary = Self {
            total: entities.len(),
            ..Default::default()
        };
        for e in entities {
            match e {
                Entity::File(_) => summary.files += 1,
                Entity::Directory(_) => summary.directories += 1,
                Entity::Module(_) => summary.modules += 1,
                Entity::Symbol(_) => summary.symbols += 1,
            }
        }
        summary
    }
}
