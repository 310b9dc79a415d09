//! # Application Errors
//!
//! [`ApiError`] is the single error type flowing out of middleware steps and
//! route handlers. It mirrors the shape clients receive:
//! an optional declared HTTP status, a message and a list of sub-errors. The
//! [`crate::normalizer::ErrorNormalizer`] turns it into the JSON envelope.
//!
//! Errors that do not declare a status are classified by [`ErrorKind`]:
//! parse errors become `400`, everything else `500`.

use std::fmt;
use std::panic::Location;

use http::StatusCode;

/// Broad classification used when an error carries no explicit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Raised deliberately by application code (auth, validation, not found)
    Application,
    /// Malformed input that could not be parsed (JSON syntax, bad encoding)
    Parse,
    /// Anything unclassified; surfaces as `500`
    Unexpected,
}

/// Error returned by middleware steps and handlers.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: Option<StatusCode>,
    kind: ErrorKind,
    message: String,
    errors: Vec<String>,
    location: &'static Location<'static>,
}

impl ApiError {
    /// Create an application error with an explicit status code.
    #[track_caller]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            kind: ErrorKind::Application,
            message: message.into(),
            errors: Vec::new(),
            location: Location::caller(),
        }
    }

    /// Create an error without a declared status; the normalizer derives one
    /// from `kind`.
    #[track_caller]
    pub fn unclassified(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: None,
            kind,
            message: message.into(),
            errors: Vec::new(),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    #[track_caller]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    #[track_caller]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    #[track_caller]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    #[track_caller]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    #[track_caller]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// A parse failure with no declared status (normalized to `400`).
    #[track_caller]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::unclassified(ErrorKind::Parse, message)
    }

    /// Attach a sub-error (e.g. a field validation failure).
    #[must_use]
    pub fn with_error(mut self, detail: impl Into<String>) -> Self {
        self.errors.push(detail.into());
        self
    }

    /// Replace the sub-error list.
    #[must_use]
    pub fn with_errors<I, S>(mut self, details: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.errors = details.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Source location where the error was constructed.
    #[must_use]
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }

    /// Trace text exposed as `stack` in non-production envelopes.
    #[must_use]
    pub fn trace(&self) -> String {
        format!("{self:#}\n    at {}", self.location)
    }
}

impl From<serde_json::Error> for ApiError {
    #[track_caller]
    fn from(err: serde_json::Error) -> Self {
        Self::unclassified(ErrorKind::Parse, "Invalid JSON").with_error(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    #[track_caller]
    fn from(err: anyhow::Error) -> Self {
        Self::unclassified(ErrorKind::Unexpected, format!("{err:#}"))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Application => "application",
            ErrorKind::Parse => "parse",
            ErrorKind::Unexpected => "unexpected",
        };
        f.write_str(s)
    }
}
