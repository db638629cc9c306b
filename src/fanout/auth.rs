//! Authentication gate for the WebSocket upgrade.

use super::session::Principal;
use std::collections::HashMap;

/// Pluggable credential check, run once at upgrade time. Implementations
/// must not log the raw credential: callers redact it before it reaches
/// any tracing span.
pub trait AuthGate: Send + Sync {
    fn authenticate(&self, credential: Option<&str>) -> Result<Principal, AuthOutcome>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Unauthenticated,
    InsufficientScope,
}

/// Demo-grade token table: `token -> (subject, scopes)`. A real deployment
/// would swap this for a call to an identity service; the gate trait is the
/// seam for that.
pub struct StaticTokenAuthGate {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthGate {
    pub fn new(tokens: HashMap<String, Principal>) -> Self {
        Self { tokens }
    }

    pub fn single(token: impl Into<String>, subject: impl Into<String>, scopes: Vec<String>) -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(token.into(), Principal { subject: subject.into(), scopes });
        Self { tokens }
    }
}

impl AuthGate for StaticTokenAuthGate {
    fn authenticate(&self, credential: Option<&str>) -> Result<Principal, AuthOutcome> {
        let token = credential.ok_or(AuthOutcome::Unauthenticated)?;
        self.tokens.get(token).cloned().ok_or(AuthOutcome::Unauthenticated)
    }
}

/// Redact a query string's credential-bearing parameters before logging
///.
pub fn redact_query(query: &str) -> String {
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("token") || key.eq_ignore_ascii_case("access_token") => {
                format!("{key}=***")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_token_query_param_only() {
        let out = redact_query("token=secret123&namespace=billing");
        assert_eq!(out, "token=***&namespace=billing");
    }

    #[test]
    fn unknown_token_is_unauthenticated() {
        let gate = StaticTokenAuthGate::single("abc", "svc-a", vec!["graph:read".to_string()]);
        assert_eq!(gate.authenticate(Some("nope")), Err(AuthOutcome::Unauthenticated));
    }

    #[test]
    fn known_token_resolves_principal() {
        let gate = StaticTokenAuthGate::single("abc", "svc-a", vec!["graph:read".to_string()]);
        let principal = gate.authenticate(Some("abc")).unwrap();
        assert_eq!(principal.subject, "svc-a");
    }
}
