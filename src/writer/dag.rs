//! DAG ordering within a batch.
//!
//! A relationship must never be written before the entities it references
//! *when those entities land in the same batch*. Cross-batch ordering is
//! not guaranteed — the external store tolerates forward references via the
//! unresolved-ref scheme.

use crate::model::{Entity, Relationship};
use std::collections::HashSet;

/// Whether any relationship in this batch references an entity that is
/// also being written in this same batch — if so, the batch must be split
/// into an entities-first, relationships-second sequential commit.
pub fn needs_split(entities: &[Entity], relationships: &[Relationship]) -> bool {
    let entity_ids: HashSet<&str> = entities.iter().map(|e| e.id().as_str()).collect();
    relationships.iter().any(|r| {
        entity_ids.contains(r.from_entity_id.as_str())
            || r.to_entity_id
                .as_ref()
                .is_some_and(|id| entity_ids.contains(id.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileEntity, ToRef};
    use crate::types::RelationKind;

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

    #[test]
    fn split_required_when_relationship_endpoint_is_in_batch() {
        let a = file_entity("src/a.ts");
        let b = file_entity("src/b.ts");
        let rel = Relationship::new(
            RelationKind::DependsOn,
            a.id().clone(),
            Some(ToRef::Entity { id: b.id().clone() }),
            0.9,
        );
        assert!(needs_split(&[a, b], &[rel]));
    }

    #[test]
    fn split_not_required_when_endpoints_absent() {
        let a = file_entity("src/a.ts");
        let rel = Relationship::new(
            RelationKind::DependsOn,
            crate::types::EntityId::new("file:src/elsewhere.ts"),
            Some(ToRef::External {
                name: "lodash".to_string(),
                ambiguous: false,
                candidate_count: 0,
            }),
            0.4,
        );
        assert!(!needs_split(&[a], &[rel]));
    }
}
