//! Sequential middleware execution with short-circuit semantics.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::core::{Flow, Middleware};
use crate::error::ApiError;
use crate::normalizer::ErrorNormalizer;
use crate::server::{RequestContext, RequestInfo, ResponseWriter};

/// Result of running a chain against one request.
#[derive(Debug)]
pub enum ChainOutcome<'r> {
    /// Every step proceeded; the caller may move on to the next stage
    Continue(RequestContext<'r>),
    /// A step errored or wrote the response; the caller must stop
    Stopped,
}

impl ChainOutcome<'_> {
    #[must_use]
    pub fn continues(&self) -> bool {
        matches!(self, ChainOutcome::Continue(_))
    }
}

/// Ordered list of middleware steps.
///
/// Steps run strictly one after another on the calling coroutine. A step
/// that blocks on I/O suspends only its own coroutine, so later steps never
/// start before the current one has produced its [`Flow`].
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    steps: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step; steps run in the order they are added.
    pub fn push(&mut self, step: Arc<dyn Middleware>) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn with(mut self, step: Arc<dyn Middleware>) -> Self {
        self.push(step);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every step, sending the first error to `normalizer`.
    ///
    /// Returns [`ChainOutcome::Continue`] only when every step proceeded.
    pub fn run<'r>(
        &self,
        ctx: RequestContext<'r>,
        res: &mut ResponseWriter,
        normalizer: &ErrorNormalizer,
    ) -> ChainOutcome<'r> {
        let info = ctx.info().clone();
        match self.evaluate(ctx, res) {
            Ok(outcome) => outcome,
            Err(err) => {
                normalizer.handle(&err, &info, res);
                ChainOutcome::Stopped
            }
        }
    }

    /// Same loop as [`Self::run`] but returns the error instead of
    /// normalizing it. Per-route chains use this so the dispatcher remains
    /// the single place that normalizes handler-stage failures.
    ///
    /// # Errors
    ///
    /// The error a step aborted with, a `500` for a panicking step, or a
    /// `500` for a step that claimed to handle the request without writing
    /// a response.
    pub fn evaluate<'r>(
        &self,
        mut ctx: RequestContext<'r>,
        res: &mut ResponseWriter,
    ) -> Result<ChainOutcome<'r>, ApiError> {
        let info = ctx.info().clone();
        for step in &self.steps {
            let name = step.name();
            let flow = catch_unwind(AssertUnwindSafe(|| step.handle(ctx, res)))
                .map_err(|panic| step_panicked(name, &info, panic.as_ref()))?;
            ctx = match flow {
                Flow::Proceed(next) if res.is_sent() => {
                    drop(next);
                    warn!(
                        request_id = %info.request_id,
                        middleware = name,
                        "Middleware proceeded after writing the response - stopping chain"
                    );
                    return Ok(ChainOutcome::Stopped);
                }
                Flow::Proceed(next) => next,
                Flow::Abort(err) => {
                    debug!(
                        request_id = %info.request_id,
                        middleware = name,
                        error = %err,
                        "Middleware aborted chain"
                    );
                    return Err(err);
                }
                Flow::Handled if res.is_sent() => {
                    debug!(
                        request_id = %info.request_id,
                        middleware = name,
                        status = res.status(),
                        "Middleware handled request"
                    );
                    return Ok(ChainOutcome::Stopped);
                }
                Flow::Handled => {
                    error!(
                        request_id = %info.request_id,
                        middleware = name,
                        "Middleware stopped the chain without writing a response"
                    );
                    return Err(ApiError::internal(format!(
                        "Middleware '{name}' stopped the request without responding"
                    )));
                }
            };
        }
        Ok(ChainOutcome::Continue(ctx))
    }
}

fn step_panicked(
    name: &'static str,
    info: &RequestInfo,
    panic: &(dyn std::any::Any + Send),
) -> ApiError {
    let panic_message = panic_message(panic);
    error!(
        request_id = %info.request_id,
        middleware = name,
        panic_message = %panic_message,
        "Middleware panicked"
    );
    ApiError::internal("Internal Server Error").with_error(format!("{name}: {panic_message}"))
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
