//! # Application Pipeline
//!
//! [`App`] ties the pieces together for one request:
//!
//! ```text
//! global chain (logger → CORS → JSON body) → router → handler
//!                      │                       │         │
//!                      └──────── errors ───────┴─────────┴──→ normalizer
//! ```
//!
//! Every stage either proceeds, writes the response, or produces an
//! [`ApiError`]; all errors and panics end at the [`ErrorNormalizer`], so
//! each request gets exactly one response.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, warn};

use crate::config::CoreConfig;
use crate::error::ApiError;
use crate::middleware::{
    panic_message, ChainOutcome, CorsConfigError, CorsMiddleware, JsonBodyMiddleware,
    MiddlewareChain, RequestLogger,
};
use crate::normalizer::ErrorNormalizer;
use crate::router::Router;
use crate::server::{RequestContext, ResponseWriter};

/// A configured request pipeline, shared read-only by every coroutine.
pub struct App {
    global: MiddlewareChain,
    router: Router,
    normalizer: ErrorNormalizer,
}

impl App {
    #[must_use]
    pub fn new(global: MiddlewareChain, router: Router, normalizer: ErrorNormalizer) -> Self {
        Self {
            global,
            router,
            normalizer,
        }
    }

    /// The standard pipeline: request logging, CORS, then JSON body parsing.
    ///
    /// # Errors
    ///
    /// Returns [`CorsConfigError`] if the configured origin list is invalid.
    pub fn with_defaults(config: &CoreConfig, router: Router) -> Result<Self, CorsConfigError> {
        let cors = CorsMiddleware::new(config.allowed_origins.iter().cloned())?;
        let global = MiddlewareChain::new()
            .with(Arc::new(RequestLogger))
            .with(Arc::new(cors))
            .with(Arc::new(JsonBodyMiddleware::new(config.max_body_bytes)));
        Ok(Self::new(global, router, ErrorNormalizer::new(config.is_production)))
    }

    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    #[must_use]
    pub fn global_chain(&self) -> &MiddlewareChain {
        &self.global
    }

    #[must_use]
    pub fn normalizer(&self) -> &ErrorNormalizer {
        &self.normalizer
    }

    /// Run one request to completion.
    ///
    /// On return `res` holds exactly one response. Completion hooks have not
    /// run yet; the caller invokes [`ResponseWriter::finish`].
    pub fn handle(&self, ctx: RequestContext<'_>, res: &mut ResponseWriter) {
        let info = ctx.info().clone();
        let ctx = match self.global.run(ctx, res, &self.normalizer) {
            ChainOutcome::Continue(ctx) => ctx,
            ChainOutcome::Stopped => return,
        };

        let dispatched = catch_unwind(AssertUnwindSafe(|| self.router.dispatch(ctx, res)));
        let failure = match dispatched {
            Ok(Ok(())) if res.is_sent() => return,
            Ok(Ok(())) => {
                warn!(
                    request_id = %info.request_id,
                    method = %info.method,
                    path = %info.path,
                    "Handler returned without writing a response"
                );
                ApiError::internal("Handler completed without sending a response")
            }
            Ok(Err(err)) => err,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    request_id = %info.request_id,
                    method = %info.method,
                    path = %info.path,
                    panic_message = %message,
                    "Handler panicked"
                );
                ApiError::internal("Internal Server Error").with_error(message)
            }
        };
        self.normalizer.handle(&failure, &info, res);
    }
}
