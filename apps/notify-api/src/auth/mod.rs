//! Credential resolution for incoming connections.
//!
//! Connections present an `Authorization: Bearer <token>` header. Token
//! issuance and the OAuth2 flow behind it belong to the platform's identity
//! service; this module only resolves a presented token to a user identity.
//! A missing or unresolvable token yields an anonymous connection.

use std::collections::HashMap;

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use parking_lot::RwLock;
use pori_common::UserIdentity;

/// Resolves connection credentials to a user identity.
pub trait Authenticator: Send + Sync {
    /// The identity the request's credentials resolve to, or `None` for an
    /// anonymous connection.
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserIdentity>;
}

// ---------------------------------------------------------------------------
// In-memory implementation (for Phase 1 / tests)
// ---------------------------------------------------------------------------

/// Token-table authenticator. Backed by the identity service's token
/// introspection in production.
pub struct TokenAuthenticator {
    tokens: RwLock<HashMap<String, UserIdentity>>,
}

impl TokenAuthenticator {
    pub fn new() -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a bearer token to an identity.
    pub fn insert_token(&self, token: impl Into<String>, user: UserIdentity) {
        self.tokens.write().insert(token.into(), user);
    }
}

impl Default for TokenAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<UserIdentity> {
        let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
        let token = header.strip_prefix("Bearer ")?;
        let user = self.tokens.read().get(token).cloned();
        if user.is_none() {
            tracing::debug!("unknown bearer token, treating connection as anonymous");
        }
        user
    }
}
