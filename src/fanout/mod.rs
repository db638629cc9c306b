//! Subscription Fan-out (C10) — long-lived WebSocket sessions, declarative
//! filters, per-connection backpressure, and last-event replay.

pub mod auth;
pub mod filter;
pub mod protocol;
pub mod session;

use crate::config::FanoutConfig;
use crate::types::SubscriptionId;
use auth::AuthGate;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use protocol::{ClientMessage, ServerMessage, SubscriptionSummary};
use serde::Deserialize;
use serde_json::Value;
use session::{Principal, Session, SessionRef};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Clone)]
pub struct SessionManager {
    config: FanoutConfig,
    sessions: Arc<DashMap<String, SessionRef>>,
    /// Last-event-per-type replay cache.
    last_event: Arc<DashMap<String, Value>>,
    auth: Arc<dyn AuthGate>,
}

impl SessionManager {
    pub fn new(config: FanoutConfig, auth: Arc<dyn AuthGate>) -> Self {
        Self {
            config,
            sessions: Arc::new(DashMap::new()),
            last_event: Arc::new(DashMap::new()),
            auth,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn register(&self, session: SessionRef) {
        self.sessions.insert(session.id.clone(), session);
    }

    fn remove(&self, id: &str) {
        self.sessions.remove(id);
    }

    /// Broadcast an event to every session with a matching subscription.
    /// Iterates a copy of the subscriber set so churn mid-broadcast cannot
    /// invalidate the iteration.
    pub fn broadcast(&self, event_type: &str, payload: Value) {
        self.last_event.insert(event_type.to_string(), payload.clone());
        let sessions: Vec<SessionRef> = self.sessions.iter().map(|e| e.value().clone()).collect();
        for session in sessions {
            for sub in session.matching_subscriptions(event_type, &payload) {
                self.send_to(&session, ServerMessage::Event { event: sub.event_type.clone(), payload: payload.clone() });
            }
        }
    }

    /// Apply the per-connection backpressure policy before a send
    ///. Returns `false` if the session
    /// should be disconnected.
    fn send_to(&self, session: &SessionRef, message: ServerMessage) -> bool {
        if session.buffered_bytes.load(Ordering::Relaxed) > self.config.send_buffer_threshold_bytes {
            let throttles = session.consecutive_throttles.fetch_add(1, Ordering::Relaxed) + 1;
            let _ = session.enqueue(ServerMessage::Throttled { retry_after_ms: self.config.throttle_retry_delay_ms });
            tracing::warn!(target: "fanout", "session {} throttled ({}/{})", session.id, throttles, self.config.max_consecutive_throttles);
            if throttles >= self.config.max_consecutive_throttles {
                let _ = session.enqueue(ServerMessage::Shutdown { reason: "transient-overload".to_string() });
                self.remove(&session.id);
                return false;
            }
            return false;
        }
        session.consecutive_throttles.store(0, Ordering::Relaxed);
        session.enqueue(message)
    }

    /// Terminate sessions idle for longer than the configured threshold.
    pub fn sweep_idle_sessions(&self) {
        let threshold = self.config.idle_sweep_threshold_ms as i64;
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| e.value().idle_for_ms() > threshold)
            .map(|e| e.key().clone())
            .collect();
        for id in stale {
            if let Some((_, session)) = self.sessions.remove(&id) {
                let _ = session.enqueue(ServerMessage::Shutdown { reason: "idle-timeout".to_string() });
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

fn extract_credential(headers: &HeaderMap, query: &WsQuery) -> Option<String> {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    query.token.clone()
}

pub fn router(manager: SessionManager) -> Router {
    Router::new().route("/subscriptions", get(ws_handler)).with_state(manager)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(manager): State<SessionManager>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    let credential = extract_credential(&headers, &query);
    let principal = match manager.auth.authenticate(credential.as_deref()) {
        Ok(p) => p,
        Err(auth::AuthOutcome::Unauthenticated) => {
            return (StatusCode::UNAUTHORIZED, Json(serde_json::json!({"error": {"code": "auth_failure"}}))).into_response();
        }
        Err(auth::AuthOutcome::InsufficientScope) => {
            return (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({"error": {"code": "insufficient_scope", "required": [manager.config.required_scope]}})),
            )
                .into_response();
        }
    };

    if !principal.has_scope(&manager.config.required_scope) {
        return (
            StatusCode::FORBIDDEN,
            Json(serde_json::json!({"error": {"code": "insufficient_scope", "required": [manager.config.required_scope]}})),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, manager, principal))
}

async fn handle_socket(socket: WebSocket, manager: SessionManager, principal: Principal) {
    let id = uuid::Uuid::new_v4().to_string();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let session = Arc::new(Session::new(id.clone(), principal, tx));
    manager.register(session.clone());
    tracing::info!(target: "fanout", "session {} connected (subject={})", id, session.principal.subject);

    let (mut sink, mut stream) = socket.split();
    let heartbeat_grace = Duration::from_millis(manager.config.heartbeat_grace_ms);
    let heartbeat_timeout = Duration::from_millis(manager.config.heartbeat_timeout_ms);

    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(message) = outgoing else { break };
                let text = message.to_text();
                let len = text.len();
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
                session.release_bytes(len);
            }
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        session.touch();
                        handle_client_message(&manager, &session, text.as_str());
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        session.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
            _ = tokio::time::sleep(heartbeat_grace) => {
                if session.idle_for_ms() > heartbeat_timeout.as_millis() as i64 {
                    tracing::info!(target: "fanout", "session {} heartbeat timeout", id);
                    break;
                }
                let _ = session.enqueue(ServerMessage::Pong);
            }
        }
    }

    manager.remove(&id);
    tracing::info!(target: "fanout", "session {} disconnected", id);
}

fn handle_client_message(manager: &SessionManager, session: &SessionRef, text: &str) {
    let parsed: Result<ClientMessage, _> = serde_json::from_str(text);
    let message = match parsed {
        Ok(m) => m,
        Err(e) => {
            let _ = session.enqueue(ServerMessage::Error { code: "bad_message".to_string(), message: e.to_string() });
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { event, filter, subscription_id } => {
            let id = subscription_id.map(SubscriptionId).unwrap_or_else(|| SubscriptionId(uuid::Uuid::new_v4().to_string()));
            let normalized_filter = Session::normalized_filter_for(filter.as_ref());
            let subscription = crate::model::Subscription {
                id: id.clone(),
                connection_id: session.id.clone(),
                event_type: event.clone(),
                normalized_filter: normalized_filter.clone(),
                raw_filter: filter,
            };
            session.subscriptions.insert(id.clone(), subscription);
            let _ = session.enqueue(ServerMessage::Subscribed { subscription_id: id, event: event.clone() });

            if let Some(last) = manager.last_event.get(&event) {
                if normalized_filter.matches(&last) {
                    let _ = session.enqueue(ServerMessage::Event { event, payload: last.clone() });
                }
            }
        }
        ClientMessage::Unsubscribe { subscription_id, event } => {
            if let Some(sid) = subscription_id {
                let id = SubscriptionId(sid);
                session.subscriptions.remove(&id);
                let _ = session.enqueue(ServerMessage::Unsubscribed { subscription_id: id });
            } else if let Some(event_type) = event {
                let to_remove: Vec<SubscriptionId> = session
                    .subscriptions
                    .iter()
                    .filter(|e| e.value().event_type == event_type)
                    .map(|e| e.key().clone())
                    .collect();
                for id in to_remove {
                    session.subscriptions.remove(&id);
                    let _ = session.enqueue(ServerMessage::Unsubscribed { subscription_id: id });
                }
            }
        }
        ClientMessage::UnsubscribeAll => {
            let ids: Vec<SubscriptionId> = session.subscriptions.iter().map(|e| e.key().clone()).collect();
            session.subscriptions.clear();
            for id in ids {
                let _ = session.enqueue(ServerMessage::Unsubscribed { subscription_id: id });
            }
        }
        ClientMessage::Ping => {
            let _ = session.enqueue(ServerMessage::Pong);
        }
        ClientMessage::ListSubscriptions => {
            let subscriptions = session
                .subscriptions
                .iter()
                .map(|e| SubscriptionSummary { subscription_id: e.key().clone(), event: e.value().event_type.clone() })
                .collect();
            let _ = session.enqueue(ServerMessage::Subscriptions { subscriptions });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::auth::StaticTokenAuthGate;

    fn manager() -> SessionManager {
        let gate = StaticTokenAuthGate::single("tok", "svc", vec!["graph:read".to_string()]);
        SessionManager::new(FanoutConfig::default(), Arc::new(gate))
    }

    #[test]
    fn broadcast_stores_last_event_for_replay() {
        let m = manager();
        m.broadcast("entity_upsert", serde_json::json!({"id": "e1"}));
        assert_eq!(m.last_event.get("entity_upsert").map(|v| v.clone()), Some(serde_json::json!({"id": "e1"})));
    }

    #[test]
    fn extract_credential_prefers_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc123".parse().unwrap());
        let query = WsQuery { token: Some("from-query".to_string()) };
        assert_eq!(extract_credential(&headers, &query), Some("abc123".to_string()));
    }

    #[test]
    fn extract_credential_falls_back_to_query() {
        let headers = HeaderMap::new();
        let query = WsQuery { token: Some("from-query".to_string()) };
        assert_eq!(extract_credential(&headers, &query), Some("from-query".to_string()));
    }

    /// S4: a late subscriber gets exactly one replayed event
    /// matching the last broadcast, then live events thereafter.
    #[test]
    fn subscriber_replays_last_event_then_sees_live_events() {
        let m = manager();
        m.broadcast("file_change", serde_json::json!({"path": "src/a.ts"}));

        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let principal = Principal { subject: "late-subscriber".to_string(), scopes: vec!["graph:read".to_string()] };
        let session = Arc::new(Session::new("s1".to_string(), principal, tx));
        m.register(session.clone());

        handle_client_message(&m, &session, r#"{"type":"subscribe","event":"file_change"}"#);

        let subscribed = rx.try_recv().expect("subscribed ack");
        assert!(matches!(subscribed, ServerMessage::Subscribed { .. }));
        let replayed = rx.try_recv().expect("replayed event");
        match replayed {
            ServerMessage::Event { event, payload } => {
                assert_eq!(event, "file_change");
                assert_eq!(payload, serde_json::json!({"path": "src/a.ts"}));
            }
            other => panic!("expected a replayed Event, got {other:?}"),
        }
        assert!(rx.try_recv().is_err(), "no further events queued yet");

        m.broadcast("file_change", serde_json::json!({"path": "src/b.ts"}));
        let live = rx.try_recv().expect("live event after subscribing");
        match live {
            ServerMessage::Event { payload, .. } => assert_eq!(payload, serde_json::json!({"path": "src/b.ts"})),
            other => panic!("expected a live Event, got {other:?}"),
        }
    }

    /// S5: a session stuck above the backpressure threshold
    /// gets throttled `max_consecutive_throttles` times, then disconnected.
    #[test]
    fn session_over_threshold_is_throttled_then_disconnected() {
        let mut config = FanoutConfig::default();
        config.send_buffer_threshold_bytes = 0;
        config.max_consecutive_throttles = 3;
        let gate = StaticTokenAuthGate::single("tok", "svc", vec!["graph:read".to_string()]);
        let m = SessionManager::new(config, Arc::new(gate));

        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
        let principal = Principal { subject: "slow-subscriber".to_string(), scopes: vec![] };
        let session = Arc::new(Session::new("s2".to_string(), principal, tx));
        m.register(session.clone());
        session.buffered_bytes.store(1, Ordering::Relaxed);

        for _ in 0..2 {
            assert!(!m.send_to(&session, ServerMessage::Pong));
            let msg = rx.try_recv().expect("throttled hint");
            assert!(matches!(msg, ServerMessage::Throttled { .. }));
        }
        assert!(!m.send_to(&session, ServerMessage::Pong));
        let shutdown = rx.try_recv().expect("shutdown message");
        assert!(matches!(shutdown, ServerMessage::Shutdown { .. }));
        assert_eq!(m.session_count(), 0);
    }
}
