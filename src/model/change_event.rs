//! `ChangeEvent` — the external trigger that enters the pipeline at C9.

use crate::types::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// External signal that a file was created, modified, or deleted.
///
/// Consumed once at ingress; the event itself is embedded in the `parse`
/// task's payload so it survives requeues and retries without needing to be
/// re-fetched from the ingress collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    pub namespace: String,
    pub module: String,
    pub file_path: String,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub diff_hash: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ChangeEvent {
    /// Validate required fields per the InvalidInput error kind.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("event id must not be empty".into());
        }
        if self.file_path.trim().is_empty() {
            return Err("file_path must not be empty".into());
        }
        if self.namespace.trim().is_empty() {
            return Err("namespace must not be empty".into());
        }
        Ok(())
    }

    /// The partition key used by C4's hash strategy: `namespace/module`.
    pub fn partition_key(&self) -> String {
        format!("{}/{}", self.namespace, self.module)
    }

    /// Whether the file path looks like a test file, used by C9 priority
    /// assignment's source-file-extension bump and by C2's `isTest` flag.
    pub fn is_test_path(&self) -> bool {
        let lower = self.file_path.to_lowercase();
        lower.contains(".test.") || lower.contains(".spec.") || lower.contains("__tests__")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ChangeEvent {
        ChangeEvent {
            id: "e1".into(),
            namespace: "demo".into(),
            module: "svc".into(),
            file_path: "src/a.ts".into(),
            event_type: EventKind::Created,
            timestamp: Utc::now(),
            size: 120,
            diff_hash: "h1".into(),
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn rejects_empty_id() {
        let mut e = sample();
        e.id.clear();
        assert!(e.validate().is_err());
    }

    #[test]
    fn partition_key_combines_namespace_and_module() {
        assert_eq!(sample().partition_key(), "demo/svc");
    }
}
