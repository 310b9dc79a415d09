use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http::Method;
use serde_json::json;

use super::{path_to_regex, RouterBuilder};
use crate::error::ApiError;
use crate::server::{RequestContext, ResponseWriter};

fn names(params: &[Arc<str>]) -> Vec<&str> {
    params.iter().map(AsRef::as_ref).collect()
}

#[test]
fn test_root_path() {
    let (re, params) = path_to_regex("/").unwrap();
    assert!(re.is_match("/"));
    assert!(!re.is_match("/x"));
    assert!(params.is_empty());
}

#[test]
fn test_parameterized_path() {
    let (re, params) = path_to_regex("/items/:id").unwrap();
    assert!(re.is_match("/items/123"));
    assert!(!re.is_match("/items/"));
    assert!(!re.is_match("/items/123/more"));
    assert_eq!(names(&params), vec!["id"]);
}

#[test]
fn test_nested_path() {
    let (re, params) = path_to_regex("/a/:b/c/:d").unwrap();
    assert!(re.is_match("/a/1/c/2"));
    assert!(!re.is_match("/a/1/x/2"));
    assert_eq!(names(&params), vec!["b", "d"]);
}

#[test]
fn test_literal_segments_are_escaped() {
    let (re, _) = path_to_regex("/files/v1.0").unwrap();
    assert!(re.is_match("/files/v1.0"));
    assert!(!re.is_match("/files/v1x0"));
}

#[test]
fn test_malformed_param_is_literal() {
    let (re, params) = path_to_regex("/x/:1bad").unwrap();
    assert!(params.is_empty());
    assert!(re.is_match("/x/:1bad"));
}

#[test]
fn test_first_registration_wins() {
    let mut builder = RouterBuilder::new();
    builder
        .get("/api/businesses/top", |_ctx, res| {
            res.json(200, &json!({ "route": "top" }));
            Ok(())
        })
        .get("/api/businesses/:id", |ctx, res| {
            res.json(200, &json!({ "route": "by_id", "id": ctx.param("id") }));
            Ok(())
        });
    let router = builder.build().unwrap();

    let top = router.match_route(&Method::GET, "/api/businesses/top").unwrap();
    assert_eq!(top.index, 0);
    let by_id = router.match_route(&Method::GET, "/api/businesses/42").unwrap();
    assert_eq!(by_id.index, 1);
    assert_eq!(by_id.path_params[0].1, "42");
}

#[test]
fn test_method_must_match() {
    let mut builder = RouterBuilder::new();
    builder.post("/api/reviews", |_ctx, res| {
        res.empty(201);
        Ok(())
    });
    let router = builder.build().unwrap();
    assert!(router.match_route(&Method::GET, "/api/reviews").is_none());
    assert!(router.match_route(&Method::POST, "/api/reviews").is_some());
}

#[test]
fn test_dispatch_attaches_params_and_query() {
    let mut builder = RouterBuilder::new();
    builder.get("/api/businesses/:id/reviews", |ctx, res| {
        res.json(
            200,
            &json!({
                "id": ctx.param("id"),
                "page": ctx.query_param("page"),
            }),
        );
        Ok(())
    });
    let router = builder.build().unwrap();

    let ctx = RequestContext::new(Method::GET, "/api/businesses/caf%C3%A9/reviews?page=2");
    let mut res = ResponseWriter::new();
    router.dispatch(ctx, &mut res).unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.body_json(), Some(json!({ "id": "café", "page": "2" })));
}

#[test]
fn test_dispatch_not_found() {
    let router = RouterBuilder::new().build().unwrap();
    let mut res = ResponseWriter::new();
    router
        .dispatch(RequestContext::new(Method::GET, "/nope"), &mut res)
        .unwrap();
    assert_eq!(res.status(), 404);
    assert_eq!(res.body_json(), Some(json!({ "message": "Route not found" })));
}

#[test]
fn test_handler_invoked_once_and_error_returned() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut builder = RouterBuilder::new();
    builder.delete("/api/reviews/:id", move |_ctx, _res| {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::not_found("Review not found"))
    });
    let router = builder.build().unwrap();

    let mut res = ResponseWriter::new();
    let err = router
        .dispatch(RequestContext::new(Method::DELETE, "/api/reviews/9"), &mut res)
        .unwrap_err();
    assert_eq!(err.message(), "Review not found");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!res.is_sent());
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let mut builder = RouterBuilder::new();
    builder
        .get("/dup", |_ctx, res| {
            res.empty(200);
            Ok(())
        })
        .get("/dup", |_ctx, res| {
            res.empty(500);
            Ok(())
        });
    let router = builder.build().unwrap();
    assert_eq!(router.len(), 2);

    let mut res = ResponseWriter::new();
    router.dispatch(RequestContext::new(Method::GET, "/dup"), &mut res).unwrap();
    assert_eq!(res.status(), 200);
}
