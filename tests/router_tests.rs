//! Route matching and dispatch through the public builder API.

use std::sync::{Arc, Mutex};

use gebeta::router::{Router, RouterBuilder};
use gebeta::server::{RequestContext, ResponseWriter};
use http::Method;
use serde_json::{json, Value};

mod common;
use common::parts;

/// Router whose handlers report which registration ran plus what they saw.
fn business_router() -> Router {
    let mut builder = RouterBuilder::new();
    builder
        .get("/api/businesses", |ctx, res| {
            res.json(200, &json!({ "route": "list", "query": ctx.query_map() }));
            Ok(())
        })
        .get("/api/businesses/top", |_ctx, res| {
            res.json(200, &json!({ "route": "top" }));
            Ok(())
        })
        .get("/api/businesses/detail/:id", |ctx, res| {
            res.json(200, &json!({ "route": "detail", "params": ctx.params_map() }));
            Ok(())
        })
        .get("/api/businesses/:businessId/reviews/:reviewId", |ctx, res| {
            res.json(200, &json!({ "route": "review", "params": ctx.params_map() }));
            Ok(())
        })
        .put("/api/businesses/:id", |ctx, res| {
            res.json(200, &json!({ "route": "update", "params": ctx.params_map() }));
            Ok(())
        });
    builder.build().unwrap()
}

fn dispatch(router: &Router, method: Method, target: &str) -> (u16, Value) {
    let mut res = ResponseWriter::new();
    router
        .dispatch(RequestContext::new(method, target), &mut res)
        .unwrap();
    parts(&res)
}

#[test]
fn test_params_extracted_for_matching_path() {
    let router = business_router();
    let (status, body) = dispatch(&router, Method::GET, "/api/businesses/detail/42");
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "route": "detail", "params": { "id": "42" } }));
}

#[test]
fn test_multiple_params() {
    let router = business_router();
    let (_, body) = dispatch(&router, Method::GET, "/api/businesses/b1/reviews/r9");
    assert_eq!(
        body,
        json!({ "route": "review", "params": { "businessId": "b1", "reviewId": "r9" } })
    );
}

#[test]
fn test_params_for_other_methods() {
    let router = business_router();
    let (_, body) = dispatch(&router, Method::PUT, "/api/businesses/7");
    assert_eq!(body, json!({ "route": "update", "params": { "id": "7" } }));
}

#[test]
fn test_partial_overlap_is_404() {
    let router = business_router();
    for path in [
        "/api/businesses/detail",
        "/api/businesses/detail/",
        "/api/businesses/detail/42/extra",
        "/api",
        "/",
    ] {
        let (status, body) = dispatch(&router, Method::GET, path);
        assert_eq!(status, 404, "{path}");
        assert_eq!(body, json!({ "message": "Route not found" }), "{path}");
    }
}

#[test]
fn test_wrong_method_is_404() {
    let router = business_router();
    let (status, _) = dispatch(&router, Method::DELETE, "/api/businesses/7");
    assert_eq!(status, 404);
}

#[test]
fn test_query_parsed_independent_of_route() {
    let router = business_router();
    let (status, body) = dispatch(&router, Method::GET, "/api/businesses?category=delivery&page=2");
    assert_eq!(status, 200);
    assert_eq!(
        body,
        json!({ "route": "list", "query": { "category": "delivery", "page": "2" } })
    );
}

#[test]
fn test_literal_registered_first_wins_over_param() {
    let router = business_router();
    let (_, body) = dispatch(&router, Method::GET, "/api/businesses/top");
    assert_eq!(body, json!({ "route": "top" }));
}

#[test]
fn test_param_registered_first_shadows_literal() {
    let mut builder = RouterBuilder::new();
    builder
        .get("/api/businesses/:id", |_ctx, res| {
            res.json(200, &json!({ "route": "by_id" }));
            Ok(())
        })
        .get("/api/businesses/top", |_ctx, res| {
            res.json(200, &json!({ "route": "top" }));
            Ok(())
        });
    let router = builder.build().unwrap();
    let (_, body) = dispatch(&router, Method::GET, "/api/businesses/top");
    assert_eq!(body, json!({ "route": "by_id" }));
}

#[test]
fn test_handler_sees_request_once() {
    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let mut builder = RouterBuilder::new();
    builder.post("/api/reviews", move |ctx, res| {
        log.lock().unwrap().push(ctx.path().to_string());
        res.empty(201);
        Ok(())
    });
    let router = builder.build().unwrap();

    let (status, _) = dispatch(&router, Method::POST, "/api/reviews");
    assert_eq!(status, 201);
    assert_eq!(*seen.lock().unwrap(), vec!["/api/reviews".to_string()]);
}

#[test]
fn test_route_table_listing() {
    let router = business_router();
    let listed: Vec<(String, String)> = router
        .routes()
        .iter()
        .map(|r| (r.method.to_string(), r.pattern.clone()))
        .collect();
    assert_eq!(listed.len(), 5);
    assert_eq!(listed[2], ("GET".to_string(), "/api/businesses/detail/:id".to_string()));
}
