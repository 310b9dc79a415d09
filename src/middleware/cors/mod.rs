mod error;

pub use error::CorsConfigError;

use std::collections::HashSet;

use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::core::{Flow, Middleware};
use crate::error::ApiError;
use crate::server::{RequestContext, ResponseWriter};

/// Methods advertised in `Access-Control-Allow-Methods`.
pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, PATCH";

/// Headers advertised in `Access-Control-Allow-Headers`.
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization";

static ORIGIN_FORMAT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*://[^/\s?#]+$").ok());

/// CORS (Cross-Origin Resource Sharing) middleware
///
/// Validates the `Origin` header against a fixed allow-list:
///
/// - no `Origin` header: same-origin or non-browser traffic, passes through
///   with no CORS headers
/// - allow-listed origin: the four CORS headers are set; an `OPTIONS`
///   preflight is answered with `204` and the chain stops there
/// - any other origin: the request is rejected with `403` and no CORS
///   headers are added
///
/// Credentials are always allowed, which is why the origin is echoed back
/// instead of `*`.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    allowed_origins: HashSet<String>,
}

impl CorsMiddleware {
    /// Create a CORS step for the given allow-list.
    ///
    /// # Errors
    ///
    /// [`CorsConfigError::WildcardWithCredentials`] when `*` is listed and
    /// [`CorsConfigError::InvalidOriginFormat`] for entries that are not
    /// `scheme://host[:port]`.
    pub fn new<I, S>(allowed_origins: I) -> Result<Self, CorsConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut origins = HashSet::new();
        for origin in allowed_origins {
            let origin = origin.into().trim().trim_end_matches('/').to_string();
            if origin == "*" {
                return Err(CorsConfigError::WildcardWithCredentials);
            }
            let well_formed = ORIGIN_FORMAT
                .as_ref()
                .map(|re| re.is_match(&origin))
                .unwrap_or(false);
            if !well_formed {
                return Err(CorsConfigError::InvalidOriginFormat { origin });
            }
            origins.insert(origin);
        }
        Ok(Self {
            allowed_origins: origins,
        })
    }

    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.contains(origin)
    }

    fn apply_headers(res: &mut ResponseWriter, origin: &str) {
        res.set_header("Access-Control-Allow-Origin", origin);
        res.set_header("Access-Control-Allow-Methods", ALLOWED_METHODS);
        res.set_header("Access-Control-Allow-Headers", ALLOWED_HEADERS);
        res.set_header("Access-Control-Allow-Credentials", "true");
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "cors"
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, res: &mut ResponseWriter) -> Flow<'r> {
        let Some(origin) = ctx.header("origin") else {
            return Flow::Proceed(ctx);
        };

        if !self.is_allowed(origin) {
            warn!(
                request_id = %ctx.request_id(),
                origin = %origin,
                "CORS: origin not allowed"
            );
            return Flow::Abort(ApiError::forbidden("Not allowed by CORS"));
        }

        Self::apply_headers(res, origin);

        if *ctx.method() == Method::OPTIONS {
            debug!(request_id = %ctx.request_id(), origin = %origin, "CORS preflight answered");
            res.empty(204);
            return Flow::Handled;
        }
        Flow::Proceed(ctx)
    }
}
