use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::{ChainOutcome, MiddlewareChain};
use crate::server::{RequestContext, ResponseWriter};

/// A route handler (controller).
///
/// Handlers write the success response themselves and return `Err` for
/// anything else; the dispatcher hands errors to the normalizer. Any
/// closure `Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError>`
/// is a handler.
pub trait Handler: Send + Sync {
    /// # Errors
    ///
    /// Whatever the handler wants turned into an error envelope.
    fn call(&self, ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError>;
}

impl<F> Handler for F
where
    F: Fn(RequestContext<'_>, &mut ResponseWriter) -> Result<(), ApiError> + Send + Sync,
{
    fn call(&self, ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
        self(ctx, res)
    }
}

/// Handler behind a per-route middleware chain (e.g. auth → role → handler).
pub struct ChainedHandler {
    chain: MiddlewareChain,
    inner: Arc<dyn Handler>,
}

impl ChainedHandler {
    pub fn new(chain: MiddlewareChain, inner: Arc<dyn Handler>) -> Self {
        Self { chain, inner }
    }
}

impl Handler for ChainedHandler {
    fn call(&self, ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
        match self.chain.evaluate(ctx, res)? {
            ChainOutcome::Continue(ctx) => self.inner.call(ctx, res),
            ChainOutcome::Stopped => Ok(()),
        }
    }
}
