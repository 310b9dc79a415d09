//! # Router Module
//!
//! Path matching and handler dispatch for Gebeta.
//!
//! ## Overview
//!
//! Routes are registered on a [`RouterBuilder`] as `(method, pattern,
//! handler)` triples. Patterns are literal segments plus `:name` parameter
//! segments (`/api/businesses/:id/reviews`). At build time each pattern is
//! compiled into an anchored regex; at request time the router tests the
//! registrations in order and the first match wins.
//!
//! On a match the dispatcher attaches decoded path parameters and the parsed
//! query string to the [`RequestContext`](crate::server::RequestContext) and
//! invokes the handler exactly once. Unmatched requests get
//! `404 {"message": "Route not found"}`.
//!
//! ## Example
//!
//! ```rust
//! use gebeta::router::RouterBuilder;
//! use http::Method;
//!
//! let mut builder = RouterBuilder::new();
//! builder.get("/api/businesses/:id", |_ctx, res| {
//!     res.empty(204);
//!     Ok(())
//! });
//! let router = builder.build().unwrap();
//!
//! let matched = router.match_route(&Method::GET, "/api/businesses/abc123").unwrap();
//! assert_eq!(matched.path_params[0].1, "abc123");
//! assert!(router.match_route(&Method::GET, "/api/businesses/abc123/extra").is_none());
//! ```
//!
//! ## Performance
//!
//! Matching is O(n) in the number of routes with one regex test per
//! candidate of the right method. Parameters are collected into a
//! [`ParamVec`](crate::server::ParamVec) that stays on the stack for up to
//! eight parameters.

mod builder;
mod core;
mod handler;
mod query;
#[cfg(test)]
mod tests;

pub use self::builder::RouterBuilder;
pub use self::core::{path_to_regex, Route, RouteMatch, Router, PARAM_MARKER};
pub use self::handler::{ChainedHandler, Handler};
pub use self::query::{decode_segment, parse_query};
