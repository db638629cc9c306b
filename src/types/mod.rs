//! Core identifier and enum types shared across the pipeline.
//!
//! Entity and relationship identities are strings by design (see
//! `model::entity` and `model::relationship`): the data model requires
//! deterministic, cross-process-stable ids derived from content, not
//! process-local counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier for an [`crate::model::Entity`], e.g. `file:src/a.ts` or
/// `sym:src/a.ts#A@1a2b3c4d`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable identifier for a [`crate::model::Relationship`], derived from
/// `hash(fromEntityId | type | canonicalTargetKey)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipId(pub String);

impl RelationshipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-local identifier for a queued [`crate::model::Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Identifier for a [`crate::fanout::Session`] (one per live connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a client [`crate::model::Subscription`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

/// Identifier for a [`crate::model::Checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub uuid::Uuid);

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of change event accepted at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Created,
    Modified,
    Deleted,
}

/// Visibility of a symbol declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
}

/// The kind of a [`crate::model::Symbol`] entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    TypeAlias,
    Property,
    Variable,
}

/// Typed relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationKind {
    Contains,
    Extends,
    Implements,
    References,
    DependsOn,
    ParamType,
    ReturnsType,
    Calls,
    Imports,
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Contains => "CONTAINS",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::References => "REFERENCES",
            Self::DependsOn => "DEPENDS_ON",
            Self::ParamType => "PARAM_TYPE",
            Self::ReturnsType => "RETURNS_TYPE",
            Self::Calls => "CALLS",
            Self::Imports => "IMPORTS",
        };
        write!(f, "{s}")
    }
}

/// Scope of a DEPENDS_ON edge, carrying a fixed confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyScope {
    Local,
    Imported,
    External,
}

impl DependencyScope {
    /// Fixed confidence: 0.9/0.6/0.4 respectively.
    pub fn confidence(self) -> f32 {
        match self {
            Self::Local => 0.9,
            Self::Imported => 0.6,
            Self::External => 0.4,
        }
    }
}

/// The four task types dispatched by the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Parse,
    EntityUpsert,
    RelationshipUpsert,
    Enrichment,
}

/// Enrichment sub-types dispatched within the `enrichment` task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Embedding,
    ImpactAnalysis,
    Documentation,
    Security,
}

/// Task priority, 1 (lowest) to 10 (highest), as used by C4/C9.
pub type Priority = u8;

pub const MIN_PRIORITY: Priority = 1;
pub const MAX_PRIORITY: Priority = 10;

pub fn clamp_priority(p: i32) -> Priority {
    p.clamp(MIN_PRIORITY as i32, MAX_PRIORITY as i32) as Priority
}
