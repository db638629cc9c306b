//! In-memory mirror of committed graph state (C11's read path).
//!
//! The external knowledge-graph sink (§6) is write-only from this pipeline's
//! point of view: `createEntitiesBulk`/`createRelationshipsBulk` take
//! entities in, nothing comes back out. Checkpoints need to read a graph to
//! do BFS and time-travel traversal, so this index mirrors every entity and
//! relationship this pipeline has upserted, the same `DashMap`-backed,
//! cheaply-cloneable idiom [`crate::cache::CacheIndex`] uses for C1.

use crate::model::{Entity, Relationship};
use crate::types::EntityId;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct GraphIndex {
    entities: Arc<DashMap<EntityId, Entity>>,
    /// Adjacency list keyed by source entity; relationships to entities not
    /// (yet) present in `entities` are kept, mirroring the unresolved-ref
    /// tolerance of the external store this index shadows.
    outgoing: Arc<DashMap<EntityId, Vec<Relationship>>>,
}

impl GraphIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_entity(&self, entity: Entity) {
        self.entities.insert(entity.id().clone(), entity);
    }

    pub fn put_relationship(&self, relationship: Relationship) {
        self.outgoing.entry(relationship.from_entity_id.clone()).or_default().push(relationship);
    }

    pub fn get_entity(&self, id: &EntityId) -> Option<Entity> {
        self.entities.get(id).map(|r| r.clone())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn edges_from(&self, id: &EntityId) -> Vec<Relationship> {
        self.outgoing.get(id).map(|r| r.clone()).unwrap_or_default()
    }

    /// Bounded BFS from `seeds`, at most `hop_limit` hops, optionally
    /// restricted to relationships created within `[since, until]` when a
    /// window is given.
    pub fn bfs(
        &self,
        seeds: &[EntityId],
        hop_limit: u32,
        since: Option<chrono::DateTime<chrono::Utc>>,
        until: Option<chrono::DateTime<chrono::Utc>>,
    ) -> BfsResult {
        let mut visited: std::collections::HashSet<EntityId> = seeds.iter().cloned().collect();
        let mut members: Vec<EntityId> = seeds.to_vec();
        let mut relationships: Vec<Relationship> = Vec::new();
        let mut frontier = seeds.to_vec();

        for _ in 0..hop_limit {
            let mut next_frontier = Vec::new();
            for id in &frontier {
                for rel in self.edges_from(id) {
                    if !in_window(rel.created_at, since, until) {
                        continue;
                    }
                    let Some(target) = rel.to_entity_id.clone() else {
                        relationships.push(rel);
                        continue;
                    };
                    relationships.push(rel.clone());
                    if visited.insert(target.clone()) {
                        members.push(target.clone());
                        next_frontier.push(target);
                    }
                }
            }
            if next_frontier.is_empty() {
                break;
            }
            frontier = next_frontier;
        }

        BfsResult { members, relationships }
    }

    /// Traversal for time-travel queries: same BFS, but relationship-type
    /// filtered and capped by `maxDepth`.
    pub fn traverse(
        &self,
        start: &EntityId,
        max_depth: u32,
        since: Option<chrono::DateTime<chrono::Utc>>,
        until: Option<chrono::DateTime<chrono::Utc>>,
        relation_filter: Option<crate::types::RelationKind>,
    ) -> BfsResult {
        let result = self.bfs(&[start.clone()], max_depth, since, until);
        match relation_filter {
            None => result,
            Some(kind) => {
                let relationships: Vec<Relationship> = result.relationships.into_iter().filter(|r| r.r#type == kind).collect();
                let mut members: std::collections::HashSet<EntityId> = std::collections::HashSet::new();
                members.insert(start.clone());
                for r in &relationships {
                    members.insert(r.from_entity_id.clone());
                    if let Some(to) = &r.to_entity_id {
                        members.insert(to.clone());
                    }
                }
                BfsResult { members: members.into_iter().collect(), relationships }
            }
        }
    }
}

fn in_window(
    at: chrono::DateTime<chrono::Utc>,
    since: Option<chrono::DateTime<chrono::Utc>>,
    until: Option<chrono::DateTime<chrono::Utc>>,
) -> bool {
    since.is_none_or(|s| at >= s) && until.is_none_or(|u| at <= u)
}

#[derive(Debug, Clone, Default)]
pub struct BfsResult {
    pub members: Vec<EntityId>,
    pub relationships: Vec<Relationship>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::FileEntity;
    use crate::model::relationship::ToRef;
    use crate::types::RelationKind;

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

    #[test]
    fn bfs_stops_at_hop_limit() {
        let graph = GraphIndex::new();
        let a = file("a.ts");
        let b = file("b.ts");
        let c = file("c.ts");
        let (a_id, b_id, c_id) = (a.id().clone(), b.id().clone(), c.id().clone());
        graph.put_entity(a);
        graph.put_entity(b);
        graph.put_entity(c);
        graph.put_relationship(Relationship::new(RelationKind::DependsOn, a_id.clone(), ToRef::Entity { id: b_id.clone() }, 0.9));
        graph.put_relationship(Relationship::new(RelationKind::DependsOn, b_id.clone(), ToRef::Entity { id: c_id.clone() }, 0.9));

        let one_hop = graph.bfs(&[a_id.clone()], 1, None, None);
        assert!(one_hop.members.contains(&b_id));
        assert!(!one_hop.members.contains(&c_id));

        let two_hop = graph.bfs(&[a_id], 2, None, None);
        assert!(two_hop.members.contains(&c_id));
    }

    #[test]
    fn time_window_excludes_out_of_range_edges() {
        let graph = GraphIndex::new();
        let a = file("a.ts");
        let b = file("b.ts");
        let (a_id, b_id) = (a.id().clone(), b.id().clone());
        graph.put_entity(a);
        graph.put_entity(b);
        graph.put_relationship(Relationship::new(RelationKind::DependsOn, a_id.clone(), ToRef::Entity { id: b_id.clone() }, 0.9));

        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        let result = graph.bfs(&[a_id], 1, Some(future), None);
        assert!(result.relationships.is_empty());
    }
}
