//! Size-limited JSON body parsing.
//!
//! The ceiling is enforced while reading: the stream is abandoned as soon as
//! the running total passes the limit, so a single request can never buffer
//! more than `limit` bytes plus one read chunk.

use std::io::{ErrorKind as IoErrorKind, Read};

use http::Method;
use serde_json::Value;
use tracing::{debug, info};

use super::core::{Flow, Middleware};
use crate::error::ApiError;
use crate::server::{RequestContext, ResponseWriter};

/// Default request body ceiling (1 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// `true` when `method` may carry a body the parser should look at.
#[must_use]
pub fn method_carries_body(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE | Method::CONNECT
    )
}

/// `true` when the media type (ignoring parameters) is `application/json`.
#[must_use]
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Read `reader` to the end, failing with `413` the moment more than
/// `limit` bytes arrived, then parse the bytes as JSON.
///
/// An empty body parses to `{}`.
///
/// # Errors
///
/// - `413` when the body exceeds `limit`
/// - `400` when the stream fails, the bytes are not UTF-8, or not JSON
pub fn read_json_body<R: Read + ?Sized>(reader: &mut R, limit: usize) -> Result<Value, ApiError> {
    let bytes = read_limited(reader, limit)?;
    parse_json(&bytes)
}

/// Accumulate at most `limit` bytes from `reader`.
///
/// # Errors
///
/// `413` once the running total exceeds `limit`; `400` on a read error.
pub fn read_limited<R: Read + ?Sized>(reader: &mut R, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut buf = [0u8; READ_CHUNK_BYTES];
    let mut body = Vec::new();
    let mut total: usize = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == IoErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(ApiError::bad_request("Request body could not be read")
                    .with_error(e.to_string()))
            }
        };
        total = total.saturating_add(n);
        if total > limit {
            info!(received_bytes = total, limit_bytes = limit, "Request body exceeds limit - read aborted");
            return Err(payload_too_large(limit));
        }
        body.extend_from_slice(&buf[..n]);
    }
    Ok(body)
}

fn parse_json(bytes: &[u8]) -> Result<Value, ApiError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ApiError::bad_request("Invalid JSON").with_error(e.to_string()))?;
    if text.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(text)
        .map_err(|e| ApiError::bad_request("Invalid JSON").with_error(e.to_string()))
}

fn payload_too_large(limit: usize) -> ApiError {
    ApiError::payload_too_large("Payload Too Large")
        .with_error(format!("Request body exceeds the {limit} byte limit"))
}

/// Middleware step attaching the parsed JSON body to the context.
///
/// Requests whose method has no body semantics, or whose content type is
/// not JSON, pass through untouched with their stream unread.
#[derive(Debug, Clone, Copy)]
pub struct JsonBodyMiddleware {
    max_body_bytes: usize,
}

impl Default for JsonBodyMiddleware {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_BYTES)
    }
}

impl JsonBodyMiddleware {
    #[must_use]
    pub fn new(max_body_bytes: usize) -> Self {
        Self { max_body_bytes }
    }

    #[must_use]
    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    fn parse<'r>(&self, mut ctx: RequestContext<'r>) -> Result<RequestContext<'r>, ApiError> {
        let declared = ctx
            .header("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(declared) = declared {
            if declared > self.max_body_bytes {
                info!(
                    request_id = %ctx.request_id(),
                    content_length = declared,
                    limit_bytes = self.max_body_bytes,
                    "Declared Content-Length exceeds limit"
                );
                return Err(payload_too_large(self.max_body_bytes));
            }
        }

        let value = match ctx.take_body_stream() {
            Some(mut stream) => read_json_body(&mut *stream, self.max_body_bytes)?,
            None => Value::Object(serde_json::Map::new()),
        };
        debug!(
            request_id = %ctx.request_id(),
            body_fields = value.as_object().map(|o| o.len()),
            "JSON body parsed"
        );
        Ok(ctx.with_body(value))
    }
}

impl Middleware for JsonBodyMiddleware {
    fn name(&self) -> &'static str {
        "json_body"
    }

    fn handle<'r>(&self, ctx: RequestContext<'r>, _res: &mut ResponseWriter) -> Flow<'r> {
        if !method_carries_body(ctx.method()) || !is_json_content_type(ctx.header("content-type")) {
            return Flow::Proceed(ctx);
        }
        match self.parse(ctx) {
            Ok(ctx) => Flow::Proceed(ctx),
            Err(err) => Flow::Abort(err),
        }
    }
}
