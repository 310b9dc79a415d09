//! Demo routes served by `gebeta serve`.
//!
//! Every handler echoes what the pipeline extracted from the request so the
//! router, query parser, body reader and auth chain can be exercised from
//! `curl`.

use std::sync::Arc;

use http::Method;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::{AuthMiddleware, MiddlewareChain, RequireRole, TokenVerifier};
use crate::router::{Router, RouterBuilder};
use crate::server::{RequestContext, ResponseWriter};

fn describe(ctx: &RequestContext<'_>) -> Value {
    json!({
        "requestId": ctx.request_id().to_string(),
        "method": ctx.method().as_str(),
        "path": ctx.path(),
        "params": ctx.params_map(),
        "query": ctx.query_map(),
        "body": ctx.body(),
        "user": ctx.principal().map(|p| p.subject.as_str()),
    })
}

/// Echo the request back with `200`.
pub fn echo_handler(ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
    res.json(200, &describe(&ctx));
    Ok(())
}

/// Echo a JSON object body back with `201`.
pub fn create_handler(ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
    match ctx.body() {
        Some(Value::Object(fields)) if !fields.is_empty() => {
            res.json(201, &describe(&ctx));
            Ok(())
        }
        _ => Err(ApiError::bad_request("Request body must be a non-empty JSON object")),
    }
}

/// `204` with no body.
pub fn delete_handler(_ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
    res.empty(204);
    Ok(())
}

pub fn health_handler(_ctx: RequestContext<'_>, res: &mut ResponseWriter) -> Result<(), ApiError> {
    res.json(200, &json!({ "status": "ok" }));
    Ok(())
}

/// Build the demo route table. `POST /api/admin/echo` requires a bearer
/// token accepted by `verifier` whose principal holds the `admin` role.
///
/// # Errors
///
/// Propagates route compilation failure.
pub fn demo_router(verifier: Arc<dyn TokenVerifier>) -> Result<Router, regex::Error> {
    let admin_only = MiddlewareChain::new()
        .with(Arc::new(AuthMiddleware::new(verifier)))
        .with(Arc::new(RequireRole::any_of(["admin"])));

    let mut builder = RouterBuilder::new();
    builder
        .get("/health", health_handler)
        .get("/api/echo", echo_handler)
        .post("/api/echo", create_handler)
        .get("/api/echo/:id", echo_handler)
        .put("/api/echo/:id", echo_handler)
        .delete("/api/echo/:id", delete_handler)
        .route_with(Method::POST, "/api/admin/echo", admin_only, create_handler);
    builder.build()
}
