//! Change Checkpoints (C11) — named subgraph snapshots with time-travel
//! traversal, read against the local [`graph::GraphIndex`] mirror
//!.

pub mod graph;

use crate::error::{CheckpointError, IngestResult};
use crate::model::{Checkpoint, CheckpointExport, CheckpointReason, CheckpointSummary, Entity, Relationship, TimeWindow};
use crate::types::{CheckpointId, EntityId, RelationKind};
use dashmap::DashMap;
use graph::GraphIndex;
use std::sync::Arc;

const DEFAULT_HOP_LIMIT: u32 = 2;

/// One page of a checkpoint's member entities.
#[derive(Debug, Clone)]
pub struct MembersPage {
    pub entities: Vec<Entity>,
    pub next_offset: Option<usize>,
}

#[derive(Clone, Default)]
pub struct CheckpointStore {
    graph: GraphIndex,
    checkpoints: Arc<DashMap<CheckpointId, Checkpoint>>,
    /// Materialized membership at creation time, kept separate from the
    /// live graph so a checkpoint's members don't drift as later upserts
    /// extend the same neighborhood — membership is materialized once, at
    /// creation time.
    members: Arc<DashMap<CheckpointId, Vec<EntityId>>>,
}

impl CheckpointStore {
    pub fn new(graph: GraphIndex) -> Self {
        Self { graph, checkpoints: Arc::new(DashMap::new()), members: Arc::new(DashMap::new()) }
    }

    pub fn graph(&self) -> &GraphIndex {
        &self.graph
    }

    /// Create a checkpoint: bounded BFS from `seed_entity_ids`, materialized
    /// immediately.
    pub fn create(
        &self,
        reason: CheckpointReason,
        seed_entity_ids: Vec<EntityId>,
        hop_limit: Option<u32>,
        window: TimeWindow,
    ) -> IngestResult<Checkpoint> {
        for seed in &seed_entity_ids {
            if self.graph.get_entity(seed).is_none() {
                return Err(CheckpointError::SeedNotFound(seed.as_str().to_string()).into());
            }
        }
        let hop_limit = hop_limit.unwrap_or(DEFAULT_HOP_LIMIT);
        let result = self.graph.bfs(&seed_entity_ids, hop_limit, window.since, window.until);

        let checkpoint = Checkpoint {
            id: CheckpointId(uuid::Uuid::new_v4()),
            reason,
            seed_entity_ids,
            hop_limit,
            window,
            timestamp: chrono::Utc::now(),
        };
        self.members.insert(checkpoint.id, result.members);
        self.checkpoints.insert(checkpoint.id, checkpoint.clone());
        tracing::info!(target: "checkpoints", "created checkpoint {} ({:?}, {} members)", checkpoint.id, checkpoint.reason, self.members.get(&checkpoint.id).map(|m| m.len()).unwrap_or(0));
        Ok(checkpoint)
    }

    pub fn list(&self) -> Vec<Checkpoint> {
        self.checkpoints.iter().map(|e| e.value().clone()).collect()
    }

    pub fn get(&self, id: CheckpointId) -> IngestResult<Checkpoint> {
        self.checkpoints.get(&id).map(|r| r.clone()).ok_or_else(|| CheckpointError::NotFound(id.to_string()).into())
    }

    fn member_ids(&self, id: CheckpointId) -> IngestResult<Vec<EntityId>> {
        self.members.get(&id).map(|r| r.clone()).ok_or_else(|| CheckpointError::NotFound(id.to_string()).into())
    }

    /// Page through member entities, `offset`/`limit` over the materialized
    /// id list.
    pub fn get_members(&self, id: CheckpointId, offset: usize, limit: usize) -> IngestResult<MembersPage> {
        let ids = self.member_ids(id)?;
        let page_ids = ids.iter().skip(offset).take(limit);
        let entities: Vec<Entity> = page_ids.filter_map(|eid| self.graph.get_entity(eid)).collect();
        let next_offset = if offset + limit < ids.len() { Some(offset + limit) } else { None };
        Ok(MembersPage { entities, next_offset })
    }

    pub fn summary(&self, id: CheckpointId) -> IngestResult<CheckpointSummary> {
        let ids = self.member_ids(id)?;
        let entities: Vec<Entity> = ids.iter().filter_map(|eid| self.graph.get_entity(eid)).collect();
        Ok(CheckpointSummary::from_entities(&entities))
    }

    /// Canonical JSON export format: `{checkpoint, members,
    /// relationships?}`. Relationships are included when every endpoint of
    /// at least one edge among the members is itself a member.
    pub fn export(&self, id: CheckpointId, include_relationships: bool) -> IngestResult<CheckpointExport> {
        let checkpoint = self.get(id)?;
        let ids = self.member_ids(id)?;
        let relationships = if include_relationships {
            let member_set: std::collections::HashSet<&EntityId> = ids.iter().collect();
            let mut collected = Vec::new();
            for eid in &ids {
                for rel in self.outgoing_within(eid, &member_set) {
                    collected.push(rel);
                }
            }
            Some(collected)
        } else {
            None
        };
        Ok(CheckpointExport { checkpoint, members: ids, relationships })
    }

    fn outgoing_within(&self, from: &EntityId, member_set: &std::collections::HashSet<&EntityId>) -> Vec<Relationship> {
        self.graph
            .bfs(std::slice::from_ref(from), 1, None, None)
            .relationships
            .into_iter()
            .filter(|r| r.to_entity_id.as_ref().is_some_and(|to| member_set.contains(to)))
            .collect()
    }

    /// Import a previously exported checkpoint. With `use_original_id` the
    /// checkpoint's original id is preserved (round-trip fidelity); otherwise
    /// a fresh id is minted.
    pub fn import(&self, export: CheckpointExport, use_original_id: bool) -> Checkpoint {
        let mut checkpoint = export.checkpoint;
        if !use_original_id {
            checkpoint.id = CheckpointId(uuid::Uuid::new_v4());
        }
        self.members.insert(checkpoint.id, export.members);
        self.checkpoints.insert(checkpoint.id, checkpoint.clone());
        checkpoint
    }

    pub fn delete(&self, id: CheckpointId) -> IngestResult<()> {
        self.checkpoints.remove(&id).ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;
        self.members.remove(&id);
        Ok(())
    }

    /// Time-travel traversal from a single start node, independent of any
    /// materialized checkpoint: yields the entities/relationships reachable
    /// from a start node, filtered by the same hop/time/relation bounds.
    pub fn time_travel(
        &self,
        start: &EntityId,
        max_depth: u32,
        since: Option<chrono::DateTime<chrono::Utc>>,
        until: Option<chrono::DateTime<chrono::Utc>>,
        relation_filter: Option<RelationKind>,
    ) -> graph::BfsResult {
        self.graph.traverse(start, max_depth, since, until, relation_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::FileEntity;
    use crate::model::relationship::ToRef;

    fn file(path: &str) -> Entity {
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
            hash: "h".to_string(),
        })
    }

    fn store_with_chain() -> (CheckpointStore, EntityId, EntityId) {
        let graph = GraphIndex::new();
        let a = file("a.ts");
        let b = file("b.ts");
        let (a_id, b_id) = (a.id().clone(), b.id().clone());
        graph.put_entity(a);
        graph.put_entity(b);
        graph.put_relationship(Relationship::new(RelationKind::DependsOn, a_id.clone(), ToRef::Entity { id: b_id.clone() }, 0.9));
        (CheckpointStore::new(graph), a_id, b_id)
    }

    #[test]
    fn create_materializes_members_via_bfs() {
        let (store, a_id, b_id) = store_with_chain();
        let checkpoint = store.create(CheckpointReason::Manual, vec![a_id], Some(1), TimeWindow { since: None, until: None }).unwrap();
        let members = store.get_members(checkpoint.id, 0, 10).unwrap();
        assert!(members.entities.iter().any(|e| e.id() == &b_id));
    }

    #[test]
    fn create_rejects_unknown_seed() {
        let (store, _a, _b) = store_with_chain();
        let unknown = EntityId::new("file:missing.ts");
        let result = store.create(CheckpointReason::Manual, vec![unknown], None, TimeWindow { since: None, until: None });
        assert!(result.is_err());
    }

    #[test]
    fn export_then_import_preserves_id_when_requested() {
        let (store, a_id, _b_id) = store_with_chain();
        let checkpoint = store.create(CheckpointReason::Daily, vec![a_id], None, TimeWindow { since: None, until: None }).unwrap();
        let export = store.export(checkpoint.id, true).unwrap();

        let store2 = CheckpointStore::new(store.graph().clone());
        let imported = store2.import(export, true);
        assert_eq!(imported.id, checkpoint.id);
        assert_eq!(store2.get(checkpoint.id).unwrap().reason, CheckpointReason::Daily);
    }

    #[test]
    fn delete_removes_checkpoint_and_members() {
        let (store, a_id, _b_id) = store_with_chain();
        let checkpoint = store.create(CheckpointReason::Incident, vec![a_id], None, TimeWindow { since: None, until: None }).unwrap();
        store.delete(checkpoint.id).unwrap();
        assert!(store.get(checkpoint.id).is_err());
    }
}
