//! One subscriber's session state.

use super::protocol::ServerMessage;
use crate::fanout::filter::NormalizedFilter;
use crate::model::Subscription;
use crate::types::SubscriptionId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// A client's authenticated identity and the scopes it was granted
///.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub scopes: Vec<String>,
}

impl Principal {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

pub struct Session {
    pub id: String,
    pub principal: Principal,
    pub subscriptions: DashMap<SubscriptionId, Subscription>,
    pub last_activity: Mutex<DateTime<Utc>>,
    pub buffered_bytes: AtomicUsize,
    pub consecutive_throttles: AtomicU32,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    pub fn new(id: String, principal: Principal, sender: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self {
            id,
            principal,
            subscriptions: DashMap::new(),
            last_activity: Mutex::new(Utc::now()),
            buffered_bytes: AtomicUsize::new(0),
            consecutive_throttles: AtomicU32::new(0),
            sender,
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Utc::now();
    }

    pub fn idle_for_ms(&self) -> i64 {
        (Utc::now() - *self.last_activity.lock()).num_milliseconds()
    }

    /// Enqueue a message for the write task to push down the transport.
    /// The write task is responsible for releasing `buffered_bytes` once
    /// the frame is actually flushed.
    pub fn enqueue(&self, message: ServerMessage) -> bool {
        let approx_len = message.to_text().len();
        self.buffered_bytes.fetch_add(approx_len, Ordering::Relaxed);
        self.sender.send(message).is_ok()
    }

    pub fn release_bytes(&self, n: usize) {
        self.buffered_bytes.fetch_sub(n.min(self.buffered_bytes.load(Ordering::Relaxed)), Ordering::Relaxed);
    }

    pub fn matching_subscriptions(&self, event_type: &str, payload: &serde_json::Value) -> Vec<Subscription> {
        self.subscriptions
            .iter()
            .filter(|entry| entry.value().event_type == event_type && entry.value().normalized_filter.matches(payload))
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn normalized_filter_for(raw: Option<&serde_json::Value>) -> NormalizedFilter {
        match raw {
            Some(v) => NormalizedFilter::from_raw(v),
            None => NormalizedFilter::matches_all(),
        }
    }
}

pub type SessionRef = Arc<Session>;
