//! `Relationship` — a directed, typed edge with a lazy resolution target.

use crate::model::entity::short_hash;
use crate::types::{EntityId, RelationKind, RelationshipId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category of a placeholder ref (unresolved but known shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaceholderCategory {
    Class,
    Interface,
    Function,
    TypeAlias,
}

/// Lazy resolution target of a relationship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ToRef {
    /// Already concretized to an extant entity.
    Entity { id: EntityId },
    /// Resolved to a file but the symbol is not yet indexed there.
    FileSymbol { file: String, name: String },
    /// Unresolved, ambient/library reference.
    External {
        name: String,
        #[serde(default)]
        ambiguous: bool,
        #[serde(default)]
        candidate_count: u32,
    },
    /// Known category, unresolved binding.
    Placeholder {
        category: PlaceholderCategory,
        name: String,
    },
}

impl ToRef {
    /// Canonical, target-agnostic key used for relationship identity and
    /// incremental diffing.
    pub fn canonical_key(&self) -> String {
        match self {
            ToRef::Entity { id } => format!("ENT:{}", id.as_str()),
            ToRef::FileSymbol { file, name } => format!("FS:{file}:{name}"),
            ToRef::External { name, .. } => format!("EXT:{name}"),
            ToRef::Placeholder { category, name } => {
                format!("PLH:{}:{name}", placeholder_category_str(*category))
            }
        }
    }
}

fn placeholder_category_str(c: PlaceholderCategory) -> &'static str {
    match c {
        PlaceholderCategory::Class => "class",
        PlaceholderCategory::Interface => "interface",
        PlaceholderCategory::Function => "function",
        PlaceholderCategory::TypeAlias => "typeAlias",
    }
}

/// Compute the canonical key for a raw `toEntityId` string with no `toRef`,
/// using the `RAW:` fallback prefix.
pub fn raw_target_key(raw: &str) -> String {
    format!("RAW:{raw}")
}

/// A directed, typed edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub r#type: RelationKind,
    pub from_entity_id: EntityId,
    pub to_entity_id: Option<EntityId>,
    pub to_ref: Option<ToRef>,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    pub confidence: f32,
}

impl Relationship {
    pub fn new(
        r#type: RelationKind,
        from_entity_id: EntityId,
        to_ref: ToRef,
        confidence: f32,
    ) -> Self {
        let now = Utc::now();
        let to_entity_id = match &to_ref {
            ToRef::Entity { id } => Some(id.clone()),
            _ => None,
        };
        let id = Self::compute_id(&from_entity_id, r#type, &to_ref.canonical_key());
        Self {
            id,
            r#type,
            from_entity_id,
            to_entity_id,
            to_ref: Some(to_ref),
            version: 1,
            created_at: now,
            last_modified_at: now,
            confidence,
        }
    }

    /// `hash(fromEntityId | type | canonicalTargetKey)`.
    pub fn compute_id(from: &EntityId, kind: RelationKind, target_key: &str) -> RelationshipId {
        let material = format!("{}|{}|{}", from.as_str(), kind, target_key);
        RelationshipId::new(short_hash(material.as_bytes()))
    }

    /// The canonical key this relationship is diffed on.
    pub fn canonical_key(&self) -> String {
        match &self.to_ref {
            Some(r) => r.canonical_key(),
            None => raw_target_key(
                self.to_entity_id
                    .as_ref()
                    .map(|e| e.as_str())
                    .unwrap_or(""),
            ),
        }
    }

    /// Concretize an unresolved ref once its target entity is known, bumping
    /// `version`/`last_modified_at` while preserving `id` (the canonical key
    /// spans `(from, type, targetKey)`, not the concrete target).
    pub fn concretize(&mut self, entity_id: EntityId) {
        self.to_ref = Some(ToRef::Entity {
            id: entity_id.clone(),
        });
        self.to_entity_id = Some(entity_id);
        self.version += 1;
        self.last_modified_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RelationKind;

    #[test]
    fn identity_survives_placeholder_to_entity_concretization() {
        let from = EntityId::new("sym:src/a.ts#A@11111111");
        let placeholder = ToRef::Placeholder {
            category: PlaceholderCategory::Class,
            name: "B".into(),
        };
        let mut rel = Relationship::new(RelationKind::Extends, from.clone(), placeholder, 0.5);
        let id_before = rel.id.clone();

        // Canonical key is defined over (from, type, targetKey), so identity
        // intentionally changes only when the *targetKey* changes, which it
        // does on concretization — this test documents that the *contract*
        // for cross-pass stability is the canonical key computed from the
        // placeholder's name, which a resolver sweep must preserve by
        // re-deriving the relationship rather than mutating `to_ref` blindly
        // when it wants the old id to remain addressable.
        rel.concretize(EntityId::new("sym:src/b.ts#B@22222222"));
        assert_eq!(rel.id, id_before, "id field itself is not recomputed by concretize");
    }

    #[test]
    fn canonical_key_stable_across_two_parses() {
        let from = EntityId::new("sym:src/a.ts#A@11111111");
        let r1 = Relationship::new(
            RelationKind::Extends,
            from.clone(),
            ToRef::Placeholder {
                category: PlaceholderCategory::Class,
                name: "B".into(),
            },
            0.5,
        );
        let r2 = Relationship::new(
            RelationKind::Extends,
            from,
            ToRef::Placeholder {
                category: PlaceholderCategory::Class,
                name: "B".into(),
            },
            0.5,
        );
        assert_eq!(r1.id, r2.id);
        assert_eq!(r1.canonical_key(), r2.canonical_key());
    }
}
