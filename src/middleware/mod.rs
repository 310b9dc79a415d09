//! # Middleware
//!
//! Middleware steps implement [`Middleware`] and return a three-way
//! [`Flow`]: proceed with the context, abort with an [`crate::ApiError`], or
//! report that the response was written. [`MiddlewareChain`] runs steps in
//! order and stops at the first non-proceed outcome.
//!
//! Built-in steps:
//!
//! - [`RequestLogger`] - entry/completion logging with latency
//! - [`CorsMiddleware`] - origin allow-list, preflight handling
//! - [`JsonBodyMiddleware`] - size-limited JSON body parsing
//! - [`AuthMiddleware`] / [`RequireRole`] - bearer auth and role gates for
//!   per-route chains

mod auth;
pub mod body;
mod chain;
mod core;
mod cors;
mod logger;

pub use auth::{AuthMiddleware, RequireRole, StaticTokenVerifier, TokenVerifier};
pub use body::{JsonBodyMiddleware, DEFAULT_MAX_BODY_BYTES};
pub use chain::{ChainOutcome, MiddlewareChain};
pub(crate) use chain::panic_message;
pub use self::core::{from_fn, FnMiddleware, Flow, Middleware};
pub use cors::{CorsConfigError, CorsMiddleware, ALLOWED_HEADERS, ALLOWED_METHODS};
pub use logger::RequestLogger;
