//! Caller resolution.
//!
//! Every request passes through [`resolve_auth`], which turns the
//! `Authorization` header into an [`AuthContext`] request extension. Search
//! stays open to anonymous callers; the directory service refuses mutations
//! for them.

use std::fmt;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use phonebook_directory::AuthContext;

use crate::router::ApiState;

/// Decides who the caller is.
pub trait Authorizer: Send + Sync + fmt::Debug {
    fn authorize(&self, headers: &HeaderMap) -> AuthContext;
}

/// Shared static bearer token.
///
/// With no token configured every caller is anonymous.
#[derive(Clone)]
pub struct BearerTokenAuthorizer {
    token: Option<String>,
    identity: String,
}

impl BearerTokenAuthorizer {
    pub fn new(token: Option<String>, identity: impl Into<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
            identity: identity.into(),
        }
    }

    /// Authorizer that never authorizes.
    pub fn disabled() -> Self {
        Self::new(None, "anonymous")
    }
}

impl fmt::Debug for BearerTokenAuthorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerTokenAuthorizer")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("identity", &self.identity)
            .finish()
    }
}

impl Authorizer for BearerTokenAuthorizer {
    fn authorize(&self, headers: &HeaderMap) -> AuthContext {
        let Some(expected) = self.token.as_deref() else {
            return AuthContext::anonymous();
        };
        let presented = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));

        match presented {
            Some(token) if constant_time_eq(token.trim().as_bytes(), expected.as_bytes()) => {
                AuthContext::authorized(self.identity.clone())
            }
            Some(_) => {
                tracing::warn!("Bearer token rejected");
                AuthContext::anonymous()
            }
            None => AuthContext::anonymous(),
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.ct_eq(b).into()
}

/// Middleware that attaches the caller's [`AuthContext`] to the request.
pub async fn resolve_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let context = state.authorizer.authorize(request.headers());
    request.extensions_mut().insert(context);
    next.run(request).await
}
