use std::collections::HashSet;
use std::sync::Arc;

use http::Method;
use tracing::warn;

use super::core::{Route, Router};
use super::handler::{ChainedHandler, Handler};
use crate::error::ApiError;
use crate::middleware::MiddlewareChain;
use crate::server::{RequestContext, ResponseWriter};

/// Collects route registrations, then compiles them into a [`Router`].
///
/// Registration order is match order.
///
/// ```
/// use gebeta::router::RouterBuilder;
/// use serde_json::json;
///
/// let mut builder = RouterBuilder::new();
/// builder
///     .get("/businesses/top", |_ctx, res| {
///         res.json(200, &json!({ "top": true }));
///         Ok(())
///     })
///     .get("/businesses/:id", |ctx, res| {
///         res.json(200, &json!({ "id": ctx.param("id") }));
///         Ok(())
///     });
/// let router = builder.build().unwrap();
/// assert_eq!(router.len(), 2);
/// ```
#[derive(Default)]
pub struct RouterBuilder {
    pending: Vec<(Method, String, Arc<dyn Handler>)>,
}

impl RouterBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an already shared handler.
    pub fn register(&mut self, method: Method, pattern: &str, handler: Arc<dyn Handler>) -> &mut Self {
        self.pending.push((method, pattern.to_string(), handler));
        self
    }

    pub fn route<F>(&mut self, method: Method, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.register(method, pattern, Arc::new(handler))
    }

    /// Register a handler behind its own middleware chain, run after the
    /// global chain and only for this route.
    pub fn route_with<F>(&mut self, method: Method, pattern: &str, steps: MiddlewareChain, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        let chained = ChainedHandler::new(steps, Arc::new(handler));
        self.register(method, pattern, Arc::new(chained))
    }

    pub fn get<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.route(Method::PATCH, pattern, handler)
    }

    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.route(Method::DELETE, pattern, handler)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Compile every registration.
    ///
    /// An exact duplicate (same method and pattern) can never be reached and
    /// is logged as a warning but kept.
    ///
    /// # Errors
    ///
    /// Returns the regex error if a pattern fails to compile.
    pub fn build(self) -> Result<Router, regex::Error> {
        let mut seen: HashSet<(Method, String)> = HashSet::with_capacity(self.pending.len());
        let mut routes = Vec::with_capacity(self.pending.len());
        for (method, pattern, handler) in self.pending {
            if !seen.insert((method.clone(), pattern.clone())) {
                warn!(
                    method = %method,
                    pattern = %pattern,
                    "Duplicate route is shadowed by an earlier registration"
                );
            }
            routes.push(Route::new(method, &pattern, handler)?);
        }
        Ok(Router::from_routes(routes))
    }
}
