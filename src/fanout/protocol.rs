//! Wire protocol for subscription sessions.

use crate::types::SubscriptionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Subscribe {
        event: String,
        #[serde(default)]
        filter: Option<Value>,
        #[serde(default)]
        subscription_id: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        subscription_id: Option<String>,
        #[serde(default)]
        event: Option<String>,
    },
    UnsubscribeAll,
    Ping,
    ListSubscriptions,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Subscribed {
        subscription_id: SubscriptionId,
        event: String,
    },
    Unsubscribed {
        subscription_id: SubscriptionId,
    },
    Subscriptions {
        subscriptions: Vec<SubscriptionSummary>,
    },
    Event {
        event: String,
        payload: Value,
    },
    Pong,
    Throttled {
        retry_after_ms: u64,
    },
    Shutdown {
        reason: String,
    },
    Error {
        code: String,
        message: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub subscription_id: SubscriptionId,
    pub event: String,
}

impl ServerMessage {
    pub fn to_text(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","code":"serialization_error","message":"failed to encode message"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_message_parses_camel_case_subscription_id() {
        let raw = r#"{"type":"subscribe","event":"entity_upsert","subscriptionId":"sub-1"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).unwrap();
        match msg {
            ClientMessage::Subscribe { event, subscription_id, .. } => {
                assert_eq!(event, "entity_upsert");
                assert_eq!(subscription_id, Some("sub-1".to_string()));
            }
            _ => panic!("expected Subscribe"),
        }
    }

    #[test]
    fn server_message_tags_with_type_field() {
        let msg = ServerMessage::Pong;
        assert_eq!(msg.to_text(), r#"{"type":"pong"}"#);
    }
}
