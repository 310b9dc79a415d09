use crate::error::ApiError;
use crate::server::{RequestContext, ResponseWriter};

/// Outcome of a single middleware step.
///
/// Exactly one of three things happens per invocation, and the type makes
/// that explicit: continue with the (possibly enriched) context, abort with
/// an error, or report that the step already wrote the response.
#[derive(Debug)]
pub enum Flow<'r> {
    /// Continue to the next step with this context
    Proceed(RequestContext<'r>),
    /// Stop and hand the error to the normalizer
    Abort(ApiError),
    /// The step wrote the response itself; stop silently
    Handled,
}

/// A unit of cross-cutting request processing (logging, CORS, body parsing,
/// auth) composed into a [`super::MiddlewareChain`].
pub trait Middleware: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn handle<'r>(&self, ctx: RequestContext<'r>, res: &mut ResponseWriter) -> Flow<'r>;
}

/// Middleware built from a closure, see [`from_fn`].
pub struct FnMiddleware<F> {
    name: &'static str,
    f: F,
}

/// Wrap a closure as a middleware step.
///
/// ```rust
/// use gebeta::middleware::{from_fn, Flow};
///
/// let tag = from_fn("tag", |ctx, res| {
///     res.set_header("X-Served-By", "gebeta");
///     Flow::Proceed(ctx)
/// });
/// ```
pub fn from_fn<F>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: for<'r> Fn(RequestContext<'r>, &mut ResponseWriter) -> Flow<'r> + Send + Sync,
{
    FnMiddleware { name, f }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'r> Fn(RequestContext<'r>, &mut ResponseWriter) -> Flow<'r> + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, res: &mut ResponseWriter) -> Flow<'r> {
        (self.f)(ctx, res)
    }
}
