use thiserror::Error;

/// CORS configuration error
///
/// Returned by `CorsMiddleware::new()` when the allow-list cannot be used
/// with credentialed requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorsConfigError {
    /// Wildcard origin (`*`) cannot be used with credentials
    ///
    /// Credentials are always allowed, so every origin must be listed
    /// explicitly.
    #[error(
        "CORS configuration error: Cannot use wildcard origin (*) with credentials. \
         List every allowed origin explicitly."
    )]
    WildcardWithCredentials,
    /// Invalid origin format
    ///
    /// The origin string does not match the expected format (scheme://host:port).
    #[error(
        "CORS configuration error: Invalid origin format '{origin}'. \
         Expected format: scheme://host[:port] (e.g., https://gebeta.example)"
    )]
    InvalidOriginFormat {
        /// The invalid origin string
        origin: String,
    },
}
