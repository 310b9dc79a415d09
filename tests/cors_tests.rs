//! Origin allow-list behaviour, step-level and through the full pipeline.

use gebeta::config::CoreConfig;
use gebeta::middleware::{CorsMiddleware, Flow, Middleware, ALLOWED_HEADERS, ALLOWED_METHODS};
use gebeta::router::RouterBuilder;
use gebeta::server::{RequestContext, ResponseWriter};
use gebeta::App;
use http::{Method, StatusCode};
use serde_json::json;

mod common;
use common::parts;

const ORIGIN: &str = "http://localhost:3000";

const CORS_HEADERS: [&str; 4] = [
    "access-control-allow-origin",
    "access-control-allow-methods",
    "access-control-allow-headers",
    "access-control-allow-credentials",
];

fn cors() -> CorsMiddleware {
    CorsMiddleware::new(["http://localhost:3000", "http://localhost:5173"]).unwrap()
}

fn app() -> App {
    let mut builder = RouterBuilder::new();
    builder.get("/api/businesses", |_ctx, res| {
        res.json(200, &json!([]));
        Ok(())
    });
    App::with_defaults(&CoreConfig::default(), builder.build().unwrap()).unwrap()
}

fn assert_no_cors_headers(res: &ResponseWriter) {
    for name in CORS_HEADERS {
        assert!(res.header(name).is_none(), "unexpected {name}");
    }
}

#[test]
fn test_allowed_origin_gets_headers() {
    let ctx = RequestContext::new(Method::GET, "/api/businesses").with_header("Origin", ORIGIN);
    let mut res = ResponseWriter::new();
    assert!(matches!(cors().handle(ctx, &mut res), Flow::Proceed(_)));
    assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));
    assert_eq!(res.header("access-control-allow-methods"), Some(ALLOWED_METHODS));
    assert_eq!(res.header("access-control-allow-headers"), Some(ALLOWED_HEADERS));
    assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    assert!(!res.is_sent());
}

#[test]
fn test_preflight_answered_with_204() {
    let ctx = RequestContext::new(Method::OPTIONS, "/api/businesses").with_header("Origin", ORIGIN);
    let mut res = ResponseWriter::new();
    assert!(matches!(cors().handle(ctx, &mut res), Flow::Handled));
    assert_eq!(res.status(), 204);
    assert!(res.body().is_empty());
    assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));
}

#[test]
fn test_disallowed_origin_rejected() {
    let ctx = RequestContext::new(Method::GET, "/api/businesses")
        .with_header("Origin", "https://evil.example");
    let mut res = ResponseWriter::new();
    match cors().handle(ctx, &mut res) {
        Flow::Abort(err) => {
            assert_eq!(err.status(), Some(StatusCode::FORBIDDEN));
            assert_eq!(err.message(), "Not allowed by CORS");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_no_cors_headers(&res);
}

#[test]
fn test_no_origin_passes_untouched() {
    let ctx = RequestContext::new(Method::GET, "/api/businesses");
    let mut res = ResponseWriter::new();
    assert!(matches!(cors().handle(ctx, &mut res), Flow::Proceed(_)));
    assert_no_cors_headers(&res);
}

#[test]
fn test_origin_match_is_exact() {
    let cors = cors();
    assert!(cors.is_allowed("http://localhost:5173"));
    assert!(!cors.is_allowed("http://localhost:5173/"));
    assert!(!cors.is_allowed("https://localhost:3000"));
    assert!(!cors.is_allowed("http://localhost"));
}

#[test]
fn test_pipeline_preflight_skips_router() {
    let ctx = RequestContext::new(Method::OPTIONS, "/not/registered").with_header("Origin", ORIGIN);
    let mut res = ResponseWriter::new();
    app().handle(ctx, &mut res);
    assert_eq!(res.status(), 204);
    assert!(res.body().is_empty());
}

#[test]
fn test_pipeline_disallowed_origin_envelope() {
    let ctx = RequestContext::new(Method::GET, "/api/businesses")
        .with_header("Origin", "https://evil.example");
    let mut res = ResponseWriter::new();
    app().handle(ctx, &mut res);
    let (status, body) = parts(&res);
    assert_eq!(status, 403);
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 403);
    assert_eq!(body["message"], "Not allowed by CORS");
    assert_no_cors_headers(&res);
}

#[test]
fn test_pipeline_allowed_origin_reaches_handler() {
    let ctx = RequestContext::new(Method::GET, "/api/businesses").with_header("Origin", ORIGIN);
    let mut res = ResponseWriter::new();
    app().handle(ctx, &mut res);
    assert_eq!(parts(&res), (200, json!([])));
    assert_eq!(res.header("access-control-allow-origin"), Some(ORIGIN));
}
