//! # Error Normalizer
//!
//! Every failure, whatever stage it comes from, ends up here. The normalizer
//! logs it, derives a status code and writes the uniform JSON envelope:
//!
//! ```json
//! { "success": false, "statusCode": 413, "message": "Payload Too Large",
//!   "errors": ["..."], "stack": "..." }
//! ```
//!
//! `errors` is omitted when empty and `stack` is omitted in production. If
//! the response was already sent the call is a no-op, so a handler that
//! wrote a response and then failed never produces a second write.

use http::StatusCode;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::error::{ApiError, ErrorKind};
use crate::server::{RequestInfo, ResponseWriter};

/// Message used when an error carries no text of its own.
pub const FALLBACK_MESSAGE: &str = "Internal Server Error";

/// Wire shape of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

/// Converts [`ApiError`]s into envelopes and writes them at most once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorNormalizer {
    is_production: bool,
}

impl ErrorNormalizer {
    #[must_use]
    pub fn new(is_production: bool) -> Self {
        Self { is_production }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        self.is_production
    }

    /// Status code for `err`: its declared status, else `400` for parse
    /// errors, else `500`.
    #[must_use]
    pub fn status_for(err: &ApiError) -> StatusCode {
        err.status().unwrap_or(match err.kind() {
            ErrorKind::Parse => StatusCode::BAD_REQUEST,
            ErrorKind::Application | ErrorKind::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
        })
    }

    /// Build the envelope for `err` without writing it.
    #[must_use]
    pub fn envelope(&self, err: &ApiError) -> ErrorEnvelope {
        let message = if err.message().trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            err.message().to_string()
        };
        ErrorEnvelope {
            success: false,
            status_code: Self::status_for(err).as_u16(),
            message,
            errors: err.errors().to_vec(),
            stack: (!self.is_production).then(|| err.trace()),
        }
    }

    /// Log `err` and write its envelope unless the response is already sent.
    pub fn handle(&self, err: &ApiError, info: &RequestInfo, res: &mut ResponseWriter) {
        let envelope = self.envelope(err);
        if envelope.status_code >= 500 {
            error!(
                request_id = %info.request_id,
                method = %info.method,
                path = %info.path,
                status = envelope.status_code,
                kind = %err.kind(),
                errors = ?err.errors(),
                location = %err.location(),
                "{}",
                envelope.message
            );
        } else {
            warn!(
                request_id = %info.request_id,
                method = %info.method,
                path = %info.path,
                status = envelope.status_code,
                errors = ?err.errors(),
                "{}",
                envelope.message
            );
        }

        if res.is_sent() {
            debug!(
                request_id = %info.request_id,
                status = res.status(),
                "Response already sent - error envelope not written"
            );
            return;
        }
        match serde_json::to_value(&envelope) {
            Ok(body) => {
                res.json(envelope.status_code, &body);
            }
            Err(e) => {
                error!(error = %e, "Error envelope serialization failed");
                res.json(
                    500,
                    &serde_json::json!({
                        "success": false,
                        "statusCode": 500,
                        "message": FALLBACK_MESSAGE,
                    }),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::RequestContext;
    use http::Method;
    use serde_json::json;

    fn info() -> RequestInfo {
        RequestContext::new(Method::GET, "/x").info().clone()
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(
            ErrorNormalizer::status_for(&ApiError::parse("bad")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorNormalizer::status_for(&ApiError::unclassified(ErrorKind::Unexpected, "x")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorNormalizer::status_for(&ApiError::forbidden("no")),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_empty_message_falls_back() {
        let env = ErrorNormalizer::new(true).envelope(&ApiError::internal(""));
        assert_eq!(env.message, FALLBACK_MESSAGE);
    }

    #[test]
    fn test_production_envelope_shape() {
        let mut res = ResponseWriter::new();
        ErrorNormalizer::new(true).handle(&ApiError::not_found("Business not found"), &info(), &mut res);
        assert_eq!(res.status(), 404);
        assert_eq!(
            res.body_json(),
            Some(json!({ "success": false, "statusCode": 404, "message": "Business not found" }))
        );
    }

    #[test]
    fn test_development_envelope_has_stack_and_errors() {
        let mut res = ResponseWriter::new();
        let err = ApiError::bad_request("Validation failed").with_errors(["name is required"]);
        ErrorNormalizer::new(false).handle(&err, &info(), &mut res);
        let body = res.body_json().unwrap();
        assert_eq!(body["errors"], json!(["name is required"]));
        assert!(body["stack"].as_str().unwrap().contains("Validation failed"));
    }
}
