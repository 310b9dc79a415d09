//! Error envelope shape and the write-once guarantee.

use gebeta::server::{RequestContext, RequestInfo, ResponseWriter};
use gebeta::{ApiError, ErrorKind, ErrorNormalizer};
use http::Method;
use serde_json::json;

mod common;
use common::parts;

fn info() -> RequestInfo {
    RequestContext::new(Method::POST, "/api/reviews").info().clone()
}

#[test]
fn test_second_normalization_is_noop() {
    let normalizer = ErrorNormalizer::new(true);
    let mut res = ResponseWriter::new();

    normalizer.handle(&ApiError::unauthorized("Not authorized, no token"), &info(), &mut res);
    normalizer.handle(&ApiError::internal("defect upstream"), &info(), &mut res);

    assert_eq!(res.write_count(), 1);
    assert_eq!(res.dropped_writes(), 0);
    assert_eq!(
        parts(&res),
        (
            401,
            json!({ "success": false, "statusCode": 401, "message": "Not authorized, no token" })
        )
    );
}

#[test]
fn test_error_after_handler_response_is_dropped() {
    let normalizer = ErrorNormalizer::new(false);
    let mut res = ResponseWriter::new();
    res.json(201, &json!({ "id": "r1" }));

    normalizer.handle(&ApiError::internal("post-response failure"), &info(), &mut res);

    assert_eq!(parts(&res), (201, json!({ "id": "r1" })));
    assert_eq!(res.write_count(), 1);
}

#[test]
fn test_status_derived_from_kind() {
    let normalizer = ErrorNormalizer::new(true);

    let mut res = ResponseWriter::new();
    normalizer.handle(&ApiError::parse("Malformed cursor"), &info(), &mut res);
    assert_eq!(res.status(), 400);

    let mut res = ResponseWriter::new();
    normalizer.handle(
        &ApiError::unclassified(ErrorKind::Unexpected, "db connection lost"),
        &info(),
        &mut res,
    );
    assert_eq!(res.status(), 500);

    let mut res = ResponseWriter::new();
    normalizer.handle(
        &ApiError::unclassified(ErrorKind::Application, "unlabelled"),
        &info(),
        &mut res,
    );
    assert_eq!(res.status(), 500);
}

#[test]
fn test_stack_only_outside_production() {
    let err = ApiError::forbidden("Role 'student' is not authorized to access this resource");

    let dev = ErrorNormalizer::new(false).envelope(&err);
    let stack = dev.stack.expect("development envelope carries a stack");
    assert!(stack.contains("Role 'student'"));
    assert!(stack.contains("normalizer_tests.rs"));

    let prod = ErrorNormalizer::new(true).envelope(&err);
    assert!(prod.stack.is_none());
}

#[test]
fn test_sub_errors_listed() {
    let mut res = ResponseWriter::new();
    let err = ApiError::bad_request("Validation failed")
        .with_errors(["rating must be between 1 and 5", "text is required"]);
    ErrorNormalizer::new(true).handle(&err, &info(), &mut res);
    assert_eq!(
        parts(&res),
        (
            400,
            json!({
                "success": false,
                "statusCode": 400,
                "message": "Validation failed",
                "errors": ["rating must be between 1 and 5", "text is required"],
            })
        )
    );
}

#[test]
fn test_blank_message_uses_fallback() {
    let mut res = ResponseWriter::new();
    ErrorNormalizer::new(true).handle(&ApiError::internal("   "), &info(), &mut res);
    assert_eq!(res.body_json().unwrap()["message"], "Internal Server Error");
}

#[test]
fn test_envelope_is_json_content_type() {
    let mut res = ResponseWriter::new();
    ErrorNormalizer::default().handle(&ApiError::not_found("Review not found"), &info(), &mut res);
    assert_eq!(res.header("content-type"), Some("application/json"));
}
