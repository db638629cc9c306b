//! TTL-keyed dedup set.
//!
//! Suppresses accidental resubmission from retry storms. The backing sink
//! is still expected to dedupe by id; this is a cheap first line of defense
//! against the writer re-sending a batch it already sent moments ago.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct IdempotencySet {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl IdempotencySet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Returns `true` if `key` was not seen (or its entry expired), and
    /// records it as seen. Returns `false` for a live duplicate.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let mut seen = self.seen.lock().expect("idempotency set mutex poisoned");
        let now = Instant::now();
        if let Some(recorded_at) = seen.get(key) {
            if now.duration_since(*recorded_at) < self.ttl {
                return false;
            }
        }
        seen.insert(key.to_string(), now);
        true
    }

    /// Drop entries older than the TTL. Run periodically, not on every call,
    /// so the set doesn't grow unbounded across a long-running pipeline.
    pub fn sweep(&self) {
        let mut seen = self.seen.lock().expect("idempotency set mutex poisoned");
        let now = Instant::now();
        let ttl = self.ttl;
        seen.retain(|_, recorded_at| now.duration_since(*recorded_at) < ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.lock().expect("idempotency set mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Derive a batch's idempotency key from its sorted fragment ids.
pub fn batch_key(ids: &[String]) -> String {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    crate::model::entity::short_hash(sorted.join(",").as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn duplicate_key_within_ttl_is_rejected() {
        let set = IdempotencySet::new(Duration::from_secs(60));
        assert!(set.check_and_insert("a"));
        assert!(!set.check_and_insert("a"));
    }

    #[test]
    fn key_is_accepted_again_after_ttl_elapses() {
        let set = IdempotencySet::new(Duration::from_millis(5));
        assert!(set.check_and_insert("a"));
        sleep(Duration::from_millis(15));
        assert!(set.check_and_insert("a"));
    }

    #[test]
    fn batch_key_is_order_independent() {
        let a = batch_key(&["x".to_string(), "y".to_string()]);
        let b = batch_key(&["y".to_string(), "x".to_string()]);
        assert_eq!(a, b);
    }
}
