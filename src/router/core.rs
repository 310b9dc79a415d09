//! Router core module - request dispatch by method and path.

use std::fmt;
use std::sync::Arc;

use http::Method;
use regex::Regex;
use serde_json::json;
use tracing::{debug, info};

use super::handler::Handler;
use super::query::{decode_segment, parse_query};
use crate::error::ApiError;
use crate::server::{ParamVec, RequestContext, ResponseWriter};

/// Marker prefix of a named parameter segment (`/things/:id`).
pub const PARAM_MARKER: char = ':';

/// One registered route: method, source pattern, compiled matcher and the
/// handler to invoke.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    regex: Regex,
    param_names: Vec<Arc<str>>,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Compile `pattern` into an anchored matcher.
    ///
    /// # Errors
    ///
    /// Only if the generated regex fails to compile, which cannot happen for
    /// escaped literals and the fixed parameter group.
    pub fn new(method: Method, pattern: &str, handler: Arc<dyn Handler>) -> Result<Self, regex::Error> {
        let (regex, param_names) = path_to_regex(pattern)?;
        Ok(Self {
            method,
            pattern: pattern.to_string(),
            regex,
            param_names,
            handler,
        })
    }

    /// Parameter names in the order they appear in the pattern.
    #[must_use]
    pub fn param_names(&self) -> &[Arc<str>] {
        &self.param_names
    }

    /// Match `path`, returning the extracted parameters in pattern order.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<ParamVec> {
        let captures = self.regex.captures(path)?;
        let mut params = ParamVec::with_capacity(self.param_names.len());
        for (i, name) in self.param_names.iter().enumerate() {
            if let Some(val) = captures.get(i + 1) {
                params.push((Arc::clone(name), decode_segment(val.as_str())));
            }
        }
        Some(params)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("regex", &self.regex.as_str())
            .finish()
    }
}

/// Parameter name when `segment` is `:ident`.
fn is_param_segment(segment: &str) -> Option<&str> {
    let name = segment.strip_prefix(PARAM_MARKER)?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let valid = (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

/// Convert a path pattern into an anchored regex plus parameter names.
///
/// Parameter segments become `([^/]+)`; every other segment is matched
/// literally. The whole path must match, never a prefix or suffix.
///
/// # Errors
///
/// Propagates regex compilation failure.
pub fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), regex::Error> {
    if path.is_empty() || path == "/" {
        return Ok((Regex::new(r"^/$")?, Vec::new()));
    }

    let mut pattern = String::with_capacity(path.len() + 8);
    pattern.push('^');
    let mut param_names = Vec::new();

    let body = path.strip_prefix('/').unwrap_or(path);
    for segment in body.split('/') {
        pattern.push('/');
        if let Some(name) = is_param_segment(segment) {
            pattern.push_str("([^/]+)");
            param_names.push(Arc::from(name));
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }

    pattern.push('$');
    Ok((Regex::new(&pattern)?, param_names))
}

/// Result of matching a request against the route table.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// Index of the matched route in registration order
    pub index: usize,
    pub pattern: String,
    pub path_params: ParamVec,
}

/// Immutable, ordered route table.
///
/// Routes are tried in registration order and the first route whose method
/// and pattern match wins, so when patterns overlap (`/businesses/top` and
/// `/businesses/:id`) the one registered first takes precedence.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub(crate) fn from_routes(routes: Vec<Route>) -> Self {
        info!(routes_count = routes.len(), "Routing table loaded");
        Self { routes }
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the first route matching `method` and `path`.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        self.routes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.method == *method)
            .find_map(|(index, route)| {
                route.match_path(path).map(|path_params| RouteMatch {
                    index,
                    pattern: route.pattern.clone(),
                    path_params,
                })
            })
    }

    /// Route the request and invoke the matched handler exactly once.
    ///
    /// Attaches `params` and `query` to the context before the call. When
    /// nothing matches, writes `404 {"message": "Route not found"}`.
    ///
    /// # Errors
    ///
    /// Whatever the handler returned.
    pub fn dispatch(&self, ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
        let query = ctx.raw_query().map(parse_query).unwrap_or_default();
        let Some(matched) = self.match_route(ctx.method(), ctx.path()) else {
            debug!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = %ctx.path(),
                "No route matched"
            );
            res.json(404, &json!({ "message": "Route not found" }));
            return Ok(());
        };

        let route = &self.routes[matched.index];
        debug!(
            request_id = %ctx.request_id(),
            method = %route.method,
            pattern = %route.pattern,
            path_params = ?matched.path_params,
            "Route matched"
        );
        let ctx = ctx.with_params(matched.path_params).with_query(query);
        route.handler.call(ctx, res)
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter()).finish()
    }
}
