//! `CachedFileInfo` — C1's per-file cache record.

use crate::model::{Relationship, Symbol};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Owned by C1; created on first successful parse, mutated only by C2's
/// commit step, destroyed on a file-deleted event.
#[derive(Debug, Clone)]
pub struct CachedFileInfo {
    pub file_rel: String,
    pub content_hash: String,
    pub entity_ids: Vec<crate::types::EntityId>,
    pub relationship_keys: Vec<String>,
    /// Keyed by `path:name`, the same key used by C1's global symbol index.
    pub symbol_map: HashMap<String, Symbol>,
    pub relationships: Vec<Relationship>,
    pub last_modified: DateTime<Utc>,
}

impl CachedFileInfo {
    pub fn new(
        file_rel: String,
        content_hash: String,
        symbols: Vec<Symbol>,
        relationships: Vec<Relationship>,
    ) -> Self {
        let entity_ids = symbols.iter().map(|s| s.id.clone()).collect();
        let relationship_keys = relationships.iter().map(|r| r.canonical_key()).collect();
        let symbol_map = symbols
            .into_iter()
            .map(|s| (s.symbol_map_key(), s))
            .collect();
        Self {
            file_rel,
            content_hash,
            entity_ids,
            relationship_keys,
            symbol_map,
            relationships,
            last_modified: Utc::now(),
        }
    }
}
