use tracing::{info, info_span};

use super::core::{Flow, Middleware};
use crate::server::{RequestContext, ResponseWriter};

/// Request logging step.
///
/// Logs method, path and client-identifying headers on entry and registers
/// a completion hook that records the final status and latency. Never
/// touches the response body and always proceeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogger;

fn client_ip<'a>(ctx: &'a RequestContext<'_>) -> &'a str {
    ctx.header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .or_else(|| ctx.header("x-real-ip"))
        .unwrap_or("-")
}

impl Middleware for RequestLogger {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, res: &mut ResponseWriter) -> Flow<'r> {
        let request_id = ctx.request_id();
        let method = ctx.method().clone();
        let path = ctx.path().to_string();
        let started = ctx.received_at();

        info!(
            request_id = %request_id,
            method = %method,
            path = %path,
            client_ip = %client_ip(&ctx),
            user_agent = ctx.header("user-agent").unwrap_or("-"),
            "Request received"
        );

        res.on_finish(move |res| {
            let span = info_span!("request", request_id = %request_id, method = %method, path = %path);
            let _entered = span.enter();
            info!(
                status = res.status(),
                latency_ms = started.elapsed().as_millis() as u64,
                response_bytes = res.body().len(),
                "Request completed"
            );
        });

        Flow::Proceed(ctx)
    }
}
