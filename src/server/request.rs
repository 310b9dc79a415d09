use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Instant;

use http::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::ApiError;
use crate::ids::RequestId;

/// Maximum number of path/query parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Maximum inline headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Ordered name/value storage for path and query parameters.
///
/// Names are `Arc<str>` because path parameter names come from the route
/// table and are shared by every request that matches the route.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Request headers with lower-cased names.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

/// Authenticated caller attached by the auth step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new(subject: impl Into<String>, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Identity of a request that survives the context being consumed.
///
/// The chain runner keeps a copy so it can still log and normalize an error
/// after a step has taken ownership of the context.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub request_id: RequestId,
    pub method: Method,
    pub path: Arc<str>,
}

/// Per-request value threaded by move through the middleware chain,
/// router and handler.
///
/// Steps never mutate a shared request object: each enrichment (`params`,
/// `query`, `body`, `principal`) is applied with a consuming `with_*`
/// method that hands back the updated context.
pub struct RequestContext<'r> {
    info: RequestInfo,
    target: String,
    headers: HeaderVec,
    params: ParamVec,
    query: ParamVec,
    body: Option<Value>,
    body_stream: Option<Box<dyn Read + 'r>>,
    principal: Option<Principal>,
    received_at: Instant,
}

impl<'r> RequestContext<'r> {
    /// Create a context for `method` and the raw request target
    /// (path plus optional `?query`).
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        let target = target.into();
        let path: Arc<str> = Arc::from(target.split('?').next().unwrap_or("/"));
        Self {
            info: RequestInfo {
                request_id: RequestId::new(),
                method,
                path,
            },
            target,
            headers: HeaderVec::new(),
            params: ParamVec::new(),
            query: ParamVec::new(),
            body: None,
            body_stream: None,
            principal: None,
            received_at: Instant::now(),
        }
    }

    /// Add a header; the name is stored lower-cased. An `x-request-id`
    /// header holding a valid ULID becomes the request id.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        if name == "x-request-id" {
            self.info.request_id = RequestId::from_header_or_new(Some(&value));
        }
        self.headers.push((Arc::from(name), value));
        self
    }

    /// Attach the unread body stream.
    #[must_use]
    pub fn with_body_stream(mut self, stream: impl Read + 'r) -> Self {
        self.body_stream = Some(Box::new(stream));
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: ParamVec) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: ParamVec) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    #[must_use]
    pub fn info(&self) -> &RequestInfo {
        &self.info
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.info.request_id
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.info.method
    }

    /// Path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.info.path
    }

    /// Raw request target as received, including any query string.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Query string portion of the target, if any.
    #[must_use]
    pub fn raw_query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// Get a header by name (case-insensitive per RFC 7230)
    #[inline]
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderVec {
        &self.headers
    }

    /// Get a path parameter by name (last occurrence wins).
    #[inline]
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get a query parameter by name (last occurrence wins).
    #[inline]
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn params(&self) -> &ParamVec {
        &self.params
    }

    #[must_use]
    pub fn query(&self) -> &ParamVec {
        &self.query
    }

    /// Path parameters as a map. Allocates; prefer [`Self::param`].
    #[must_use]
    pub fn params_map(&self) -> HashMap<String, String> {
        to_map(&self.params)
    }

    /// Query parameters as a map. Allocates; prefer [`Self::query_param`].
    #[must_use]
    pub fn query_map(&self) -> HashMap<String, String> {
        to_map(&self.query)
    }

    /// Parsed JSON body, present only after the body step accepted it.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Deserialize the attached JSON body into `T`.
    ///
    /// # Errors
    ///
    /// `400` when no body was attached or it does not fit `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = self
            .body
            .as_ref()
            .ok_or_else(|| ApiError::bad_request("Request body required"))?;
        T::deserialize(body).map_err(|e| {
            ApiError::bad_request("Request body does not match the expected shape")
                .with_error(e.to_string())
        })
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Take the unread body stream out of the context. Returns `None` once
    /// it has been taken.
    pub fn take_body_stream(&mut self) -> Option<Box<dyn Read + 'r>> {
        self.body_stream.take()
    }
}

fn to_map(params: &ParamVec) -> HashMap<String, String> {
    params
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

impl fmt::Debug for RequestContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("info", &self.info)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("body", &self.body)
            .field("body_stream", &self.body_stream.as_ref().map(|_| "<stream>"))
            .field("principal", &self.principal)
            .finish()
    }
}
