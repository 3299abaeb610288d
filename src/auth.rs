//! Token-based authentication for agents and the admin sentinel.
//!
//! Every agent is issued a bearer token at `spawn_agent` time; the admin
//! sentinel token is minted once at startup and never persisted to the
//! token table under its own id, so the audit log unambiguously shows
//! operator-originated calls versus agent-originated ones.

use crate::models::Subject;
use crate::security::{generate_token, tokens_equal};
use crate::{Result, SpiralError};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Storage boundary the token registry needs; implemented by the
/// persistence layer's write-queue-backed store.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &str, subject: &str) -> Result<()>;
    async fn lookup_token(&self, token: &str) -> Result<Option<(String, Option<chrono::DateTime<Utc>>)>>;
    async fn revoke_token(&self, token: &str) -> Result<bool>;
    async fn revoke_tokens_for_subject(&self, subject: &str) -> Result<()>;
}

pub struct TokenRegistry {
    store: Arc<dyn TokenStore>,
    admin_token: String,
}

impl TokenRegistry {
    pub fn new(store: Arc<dyn TokenStore>, admin_token: String) -> Self {
        Self { store, admin_token }
    }

    /// Issues and persists a fresh bearer token for `subject`.
    pub async fn issue(&self, subject: &str) -> Result<String> {
        let token = generate_token();
        self.store.insert_token(&token, subject).await?;
        info!(subject, "issued agent token");
        Ok(token)
    }

    pub async fn revoke(&self, token: &str) -> Result<()> {
        if self.store.revoke_token(token).await? {
            Ok(())
        } else {
            Err(SpiralError::NotFound(format!("token not found: {}", redact(token))))
        }
    }

    /// Revokes every live token issued to `subject` (an agent id). Unlike
    /// [`TokenRegistry::revoke`] this is not an error if the subject
    /// currently holds no tokens.
    pub async fn revoke_all_for(&self, subject: &str) -> Result<()> {
        self.store.revoke_tokens_for_subject(subject).await
    }

    /// Verifies a bearer token, checking the admin sentinel first via
    /// constant-time comparison, then falling back to the persisted table.
    pub async fn verify(&self, token: &str) -> Result<Subject> {
        if tokens_equal(token, &self.admin_token) {
            return Ok(Subject::Admin);
        }
        match self.store.lookup_token(token).await? {
            Some((subject, None)) => Ok(Subject::Agent(subject)),
            Some((_, Some(_))) => Err(SpiralError::Unauthenticated("token has been revoked".to_string())),
            None => Err(SpiralError::Unauthenticated("invalid token".to_string())),
        }
    }
}

fn redact(token: &str) -> String {
    if token.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}...", &token[..8])
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub registry: Arc<TokenRegistry>,
}

/// Authentication middleware: accepts `x-api-key` or `Authorization:
/// Bearer <token>`, verifies via [`TokenRegistry::verify`], and stores the
/// resolved [`Subject`] as a request extension for downstream handlers.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let client_ip = headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    if method == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let unauthorized = || {
        (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"}))).into_response()
    };

    let provided_token = if let Some(header_value) = headers.get("x-api-key") {
        header_value.to_str().map_err(|_| unauthorized())?.to_string()
    } else if let Some(header_value) = headers.get("authorization") {
        let auth_str = header_value.to_str().map_err(|_| unauthorized())?;
        match auth_str.strip_prefix("Bearer ") {
            Some(token) => token.to_string(),
            None => return Err(unauthorized()),
        }
    } else {
        warn!(path, client_ip, "missing credentials");
        return Err(unauthorized());
    };

    match auth_state.registry.verify(&provided_token).await {
        Ok(subject) => {
            request.extensions_mut().insert(subject);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(path, client_ip, error = %e, "authentication failed");
            Err(unauthorized())
        }
    }
}

pub fn create_auth_state(registry: Arc<TokenRegistry>) -> Arc<AuthState> {
    Arc::new(AuthState { registry })
}

// ---------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------

/// One row of the per-call audit trail: who, which tool, when, under
/// which correlation id, and whether the call ultimately succeeded.
/// Written once per dispatched call -- only calls that already cleared
/// authentication ever reach the dispatcher, so an audit row exists iff
/// authentication succeeded.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub subject: String,
    pub tool: String,
    pub request_id: String,
    pub ts: chrono::DateTime<Utc>,
    pub success: bool,
    pub error_kind: Option<String>,
}

impl AuditEntry {
    pub fn new(subject: &str, tool: &str, request_id: &str, success: bool, error_kind: Option<String>) -> Self {
        Self {
            subject: subject.to_string(),
            tool: tool.to_string(),
            request_id: request_id.to_string(),
            ts: Utc::now(),
            success,
            error_kind,
        }
    }
}

/// Durable destination for audit rows. Implemented by the persistence
/// layer (`PgStore`) for production use; a tracing-only sink backs tests
/// and harnesses that have no database to write to.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            subject = %entry.subject,
            tool = %entry.tool,
            request_id = %entry.request_id,
            success = entry.success,
            error_kind = entry.error_kind.as_deref().unwrap_or(""),
            "audit checkpoint"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    struct InMemoryTokenStore {
        tokens: Mutex<HashMap<String, (String, Option<chrono::DateTime<Utc>>)>>,
    }

    impl InMemoryTokenStore {
        fn new() -> Self {
            Self { tokens: Mutex::new(HashMap::new()) }
        }
    }

    #[async_trait]
    impl TokenStore for InMemoryTokenStore {
        async fn insert_token(&self, token: &str, subject: &str) -> Result<()> {
            self.tokens.lock().await.insert(token.to_string(), (subject.to_string(), None));
            Ok(())
        }

        async fn lookup_token(&self, token: &str) -> Result<Option<(String, Option<chrono::DateTime<Utc>>)>> {
            Ok(self.tokens.lock().await.get(token).cloned())
        }

        async fn revoke_token(&self, token: &str) -> Result<bool> {
            let mut guard = self.tokens.lock().await;
            if let Some(entry) = guard.get_mut(token) {
                entry.1 = Some(Utc::now());
                Ok(true)
            } else {
                Ok(false)
            }
        }

        async fn revoke_tokens_for_subject(&self, subject: &str) -> Result<()> {
            let mut guard = self.tokens.lock().await;
            for entry in guard.values_mut() {
                if entry.0 == subject {
                    entry.1 = Some(Utc::now());
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn admin_token_verifies_without_store_roundtrip() {
        let registry = TokenRegistry::new(Arc::new(InMemoryTokenStore::new()), "admin-secret".to_string());
        let subject = registry.verify("admin-secret").await.unwrap();
        assert_eq!(subject, Subject::Admin);
    }

    #[tokio::test]
    async fn issued_token_verifies_to_the_right_agent() {
        let registry = TokenRegistry::new(Arc::new(InMemoryTokenStore::new()), "admin-secret".to_string());
        let token = registry.issue("agent-1").await.unwrap();
        let subject = registry.verify(&token).await.unwrap();
        assert_eq!(subject, Subject::Agent("agent-1".to_string()));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected() {
        let registry = TokenRegistry::new(Arc::new(InMemoryTokenStore::new()), "admin-secret".to_string());
        let token = registry.issue("agent-1").await.unwrap();
        registry.revoke(&token).await.unwrap();
        assert!(registry.verify(&token).await.is_err());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let registry = TokenRegistry::new(Arc::new(InMemoryTokenStore::new()), "admin-secret".to_string());
        assert!(registry.verify("nonsense").await.is_err());
    }
}
