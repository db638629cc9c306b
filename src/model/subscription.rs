//! `Subscription` — owned by C10, one per client's interest in an event type.

use crate::fanout::filter::NormalizedFilter;
use crate::types::SubscriptionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub connection_id: String,
    pub event_type: String,
    pub normalized_filter: NormalizedFilter,
    pub raw_filter: Option<serde_json::Value>,
}
