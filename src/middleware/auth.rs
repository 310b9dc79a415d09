use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::core::{Flow, Middleware};
use crate::error::ApiError;
use crate::server::{Principal, RequestContext, ResponseWriter};

/// Black-box credential check.
///
/// Token issuance and verification live outside the request core;
/// implementations may block (the calling coroutine is suspended, other
/// requests keep running).
pub trait TokenVerifier: Send + Sync {
    /// # Errors
    ///
    /// An `ApiError` (normally `401`) when the token is not acceptable.
    fn verify(&self, token: &str) -> Result<Principal, ApiError>;
}

/// In-memory token table, for demos and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Not authorized, token failed"))
    }
}

/// Extract the token from `Authorization: Bearer <token>`.
fn extract_bearer(header: Option<&str>) -> Result<&str, ApiError> {
    let header = header.ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| ApiError::unauthorized("Not authorized, no token"))?;
    if token.is_empty() {
        return Err(ApiError::unauthorized("Not authorized, no token"));
    }
    Ok(token)
}

/// Authenticates the caller and attaches the resulting [`Principal`].
pub struct AuthMiddleware {
    verifier: Arc<dyn TokenVerifier>,
}

impl AuthMiddleware {
    pub fn new(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }
}

impl Middleware for AuthMiddleware {
    fn name(&self) -> &'static str {
        "auth"
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, _res: &mut ResponseWriter) -> Flow<'r> {
        let principal = match extract_bearer(ctx.header("authorization"))
            .and_then(|token| self.verifier.verify(token))
        {
            Ok(p) => p,
            Err(err) => return Flow::Abort(err),
        };
        debug!(request_id = %ctx.request_id(), subject = %principal.subject, "Authenticated");
        Flow::Proceed(ctx.with_principal(principal))
    }
}

/// Role gate placed after [`AuthMiddleware`]; passes when the principal
/// holds any of the listed roles.
#[derive(Debug, Clone)]
pub struct RequireRole {
    roles: Vec<String>,
}

impl RequireRole {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

impl Middleware for RequireRole {
    fn name(&self) -> &'static str {
        "require_role"
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, _res: &mut ResponseWriter) -> Flow<'r> {
        let Some(principal) = ctx.principal() else {
            return Flow::Abort(ApiError::unauthorized("Not authorized, no token"));
        };
        if self.roles.iter().any(|r| principal.has_role(r)) {
            Flow::Proceed(ctx)
        } else {
            Flow::Abort(ApiError::forbidden(format!(
                "Role '{}' is not authorized to access this resource",
                principal.roles.join(",")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};

    fn verifier() -> Arc<dyn TokenVerifier> {
        Arc::new(StaticTokenVerifier::new().with_token("tok", Principal::new("u1", ["student"])))
    }

    #[test]
    fn test_valid_token_attaches_principal() {
        let mw = AuthMiddleware::new(verifier());
        let ctx = RequestContext::new(Method::GET, "/me").with_header("Authorization", "Bearer tok");
        match mw.handle(ctx, &mut ResponseWriter::new()) {
            Flow::Proceed(ctx) => assert_eq!(ctx.principal().map(|p| p.subject.as_str()), Some("u1")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_token_is_401() {
        let mw = AuthMiddleware::new(verifier());
        let ctx = RequestContext::new(Method::GET, "/me");
        match mw.handle(ctx, &mut ResponseWriter::new()) {
            Flow::Abort(err) => assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_wrong_role_is_403() {
        let gate = RequireRole::any_of(["admin", "business_owner"]);
        let ctx = RequestContext::new(Method::DELETE, "/x").with_principal(Principal::new("u1", ["student"]));
        match gate.handle(ctx, &mut ResponseWriter::new()) {
            Flow::Abort(err) => assert_eq!(err.status(), Some(StatusCode::FORBIDDEN)),
            other => panic!("unexpected {other:?}"),
        }
    }
}
