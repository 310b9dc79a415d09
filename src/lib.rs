//! # Gebeta
//!
//! **Gebeta** is the HTTP request core of a local-business review service:
//! a path router, a sequential middleware pipeline, a size-limited JSON body
//! reader and a single error normalizer, served over HTTP/1.1 on the `may`
//! coroutine runtime.
//!
//! ## Request Flow
//!
//! ```text
//! HttpServer   ──→ AppService ──→ App::handle
//!                                   │
//!                                   ├─ RequestLogger      entry log, completion hook
//!                                   ├─ CorsMiddleware     allow-list, preflight → 204
//!                                   ├─ JsonBodyMiddleware ≤ 1 MiB, parsed once
//!                                   │
//!                                   ├─ Router             first matching registration
//!                                   │    └─ [route chain: auth → role] → handler
//!                                   │
//!                                   └─ ErrorNormalizer    { success, statusCode, message, ... }
//! ```
//!
//! Every stage produces exactly one of: proceed, response written, or
//! [`ApiError`]. Errors and panics from any stage are normalized into the
//! same JSON envelope, and the response is written at most once.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gebeta::config::CoreConfig;
//! use gebeta::router::RouterBuilder;
//! use gebeta::server::{AppService, HttpServer};
//! use gebeta::{ApiError, App};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut routes = RouterBuilder::new();
//! routes.get("/api/businesses/:id", |ctx, res| {
//!     let id = ctx.param("id").ok_or_else(|| ApiError::bad_request("Missing id"))?;
//!     res.json(200, &json!({ "id": id }));
//!     Ok(())
//! });
//!
//! let app = App::with_defaults(&CoreConfig::default(), routes.build()?)?;
//! let handle = HttpServer(AppService::new(app)).start("127.0.0.1:5000")?;
//! handle.wait_ready()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **[`router`]** - pattern compilation, ordered matching, dispatch
//! - **[`middleware`]** - the step contract, the chain runner and built-in steps
//! - **[`normalizer`]** - error → envelope conversion
//! - **[`server`]** - request context, buffered response, connection handling
//! - **[`config`]** / **[`logging`]** - runtime settings and tracing setup

pub mod app;
pub mod cli;
pub mod config;
pub mod echo;
pub mod error;
pub mod ids;
pub mod logging;
pub mod middleware;
pub mod normalizer;
pub mod router;
pub mod server;

pub use app::App;
pub use error::{ApiError, ErrorKind};
pub use ids::RequestId;
pub use normalizer::{ErrorEnvelope, ErrorNormalizer};
