//! Declarative event filters.
//!
//! A normalized filter is an intersection of predicates over the event
//! payload. Matching never calls into user code: predicates are data, not
//! closures, so a malicious or buggy filter cannot block a broadcast.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One predicate over a single JSON-pointer-style field path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals { field: String, value: Value },
    In { field: String, values: Vec<Value> },
    Prefix { field: String, prefix: String },
    TimeRange {
        field: String,
        since: Option<chrono::DateTime<chrono::Utc>>,
        until: Option<chrono::DateTime<chrono::Utc>>,
    },
}

impl Predicate {
    fn matches(&self, payload: &Value) -> bool {
        match self {
            Self::Equals { field, value } => lookup(payload, field) == Some(value),
            Self::In { field, values } => {
                lookup(payload, field).is_some_and(|v| values.iter().any(|candidate| candidate == v))
            }
            Self::Prefix { field, prefix } => lookup(payload, field)
                .and_then(Value::as_str)
                .is_some_and(|s| s.starts_with(prefix.as_str())),
            Self::TimeRange { field, since, until } => {
                let Some(raw) = lookup(payload, field).and_then(Value::as_str) else {
                    return false;
                };
                let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) else {
                    return false;
                };
                let ts = ts.with_timezone(&chrono::Utc);
                since.is_none_or(|s| ts >= s) && until.is_none_or(|u| ts <= u)
            }
        }
    }
}

/// Shallow dotted-path lookup (e.g. `"metadata.namespace"`), sufficient for
/// the flat event payloads this pipeline emits.
fn lookup<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = payload;
    for segment in field.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// The normalized, AND-combined predicate set stored on a [`crate::model::Subscription`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedFilter {
    pub predicates: Vec<Predicate>,
}

impl NormalizedFilter {
    pub fn matches_all() -> Self {
        Self::default()
    }

    /// Parse a client-supplied raw filter object into predicates.
    ///
    /// The raw shape is intentionally small: `{"eq": {field: value}, "in":
    /// {field: [values]}, "prefix": {field: "str"}, "timeRange": {field,
    /// since?, until?}}`. Unknown keys are ignored rather than rejected, so
    /// older clients degrade gracefully against a richer server.
    pub fn from_raw(raw: &Value) -> Self {
        let mut predicates = Vec::new();
        let Some(obj) = raw.as_object() else {
            return Self { predicates };
        };

        if let Some(eq) = obj.get("eq").and_then(Value::as_object) {
            for (field, value) in eq {
                predicates.push(Predicate::Equals {
                    field: field.clone(),
                    value: value.clone(),
                });
            }
        }
        if let Some(inn) = obj.get("in").and_then(Value::as_object) {
            for (field, values) in inn {
                if let Some(arr) = values.as_array() {
                    predicates.push(Predicate::In {
                        field: field.clone(),
                        values: arr.clone(),
                    });
                }
            }
        }
        if let Some(prefix) = obj.get("prefix").and_then(Value::as_object) {
            for (field, value) in prefix {
                if let Some(s) = value.as_str() {
                    predicates.push(Predicate::Prefix {
                        field: field.clone(),
                        prefix: s.to_string(),
                    });
                }
            }
        }
        if let Some(tr) = obj.get("timeRange").and_then(Value::as_object) {
            if let Some(field) = tr.get("field").and_then(Value::as_str) {
                let since = tr
                    .get("since")
                    .and_then(Value::as_str)
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&chrono::Utc));
                let until = tr
                    .get("until")
                    .and_then(Value::as_str)
                    .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                    .map(|d| d.with_timezone(&chrono::Utc));
                predicates.push(Predicate::TimeRange {
                    field: field.to_string(),
                    since,
                    until,
                });
            }
        }
        Self { predicates }
    }

    pub fn matches(&self, payload: &Value) -> bool {
        self.predicates.iter().all(|p| p.matches(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_filter_matches_everything() {
        let f = NormalizedFilter::matches_all();
        assert!(f.matches(&json!({"namespace": "a"})));
    }

    #[test]
    fn equals_predicate_requires_exact_match() {
        let f = NormalizedFilter::from_raw(&json!({"eq": {"namespace": "billing"}}));
        assert!(f.matches(&json!({"namespace": "billing"})));
        assert!(!f.matches(&json!({"namespace": "payments"})));
    }

    #[test]
    fn predicates_are_intersected() {
        let f = NormalizedFilter::from_raw(&json!({
            "eq": {"namespace": "billing"},
            "prefix": {"filePath": "src/"},
        }));
        assert!(f.matches(&json!({"namespace": "billing", "filePath": "src/a.ts"})));
        assert!(!f.matches(&json!({"namespace": "billing", "filePath": "test/a.ts"})));
    }

    #[test]
    fn time_range_respects_both_bounds() {
        let f = NormalizedFilter::from_raw(&json!({
            "timeRange": {"field": "timestamp", "since": "2026-01-01T00:00:00Z", "until": "2026-12-31T00:00:00Z"}
        }));
        assert!(f.matches(&json!({"timestamp": "2026-06-01T00:00:00Z"})));
        assert!(!f.matches(&json!({"timestamp": "2027-01-01T00:00:00Z"})));
    }

    #[test]
    fn dotted_field_path_resolves_nested_values() {
        let f = NormalizedFilter::from_raw(&json!({"eq": {"metadata.tag": "hot"}}));
        assert!(f.matches(&json!({"metadata": {"tag": "hot"}})));
    }
}
