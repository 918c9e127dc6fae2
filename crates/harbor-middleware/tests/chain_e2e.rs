//! End-to-end chain tests.
//!
//! Chains are built from configuration documents with the built-in middleware
//! types and driven through `Chain::run` / `Chain::serve`.

use bytes::Bytes;
use harbor_config::{ComponentGroup, MiddlewareEntry, StructuredConfig};
use harbor_core::ErrorKind;
use harbor_middleware::{
    context::MiddlewareContext,
    stages::{metadata::Metadata, rate_limiter::headers},
    BoxFuture, MiddlewareBuilder, MiddlewareResult, Request, Response, ResponseExt, Side,
};
use http::StatusCode;
use http_body_util::{BodyExt, Full};

fn middlewares(toml: &str) -> ComponentGroup<MiddlewareEntry> {
    StructuredConfig::parse(toml, "toml")
        .unwrap()
        .decode_or_default("middlewares")
        .unwrap()
}

fn make_request(headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().method("POST").uri("/orders");
    for (k, v) in headers {
        builder = builder.header(*k, *v);
    }
    builder.body(Full::new(Bytes::new())).unwrap()
}

fn ok_handler(_ctx: &mut MiddlewareContext, _req: Request) -> BoxFuture<'static, MiddlewareResult> {
    Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
}

#[test]
fn test_selector_keeps_only_included_entries() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "logging"

        [[middlewares.configs]]
        type = "metadata"

        [[middlewares.configs]]
        type = "rate_limiter"

        [[middlewares.configs]]
        type = "selector"
        includes = ["logging"]
        "#,
    );

    let builder = MiddlewareBuilder::with_defaults();
    let server = builder.build_server(&cfg, &[]).unwrap();
    let client = builder.build_client(&cfg, &[]).unwrap();

    assert_eq!(server.names(), vec!["logging"]);
    assert_eq!(client.names(), vec!["logging"]);
    assert_eq!(client.side(), Side::Client);
}

#[test]
fn test_server_only_types_are_absent_from_client_chain() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "cors"
        allowed_origins = ["*"]

        [[middlewares.configs]]
        type = "rate_limiter"

        [[middlewares.configs]]
        type = "validator"

        [[middlewares.configs]]
        type = "circuit_breaker"

        [[middlewares.configs]]
        name = "slow-calls"
        type = "timeout"
        timeout_ms = 250
        "#,
    );

    let builder = MiddlewareBuilder::with_defaults();
    let server = builder.build_server(&cfg, &[]).unwrap();
    let client = builder.build_client(&cfg, &[]).unwrap();

    assert_eq!(
        server.names(),
        vec!["cors", "rate_limiter", "validator", "slow-calls"]
    );
    assert_eq!(client.names(), vec!["circuit_breaker", "slow-calls"]);
}

#[test]
fn test_invalid_settings_are_reported_per_entry() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "timeout"
        timeout_ms = 0

        [[middlewares.configs]]
        type = "rate_limiter"
        key = "cookie"
        "#,
    );

    let err = MiddlewareBuilder::with_defaults()
        .build_server(&cfg, &[])
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(err.metadata()["errors"], "2");
}

#[tokio::test]
async fn test_metadata_reaches_handler_through_logging() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "logging"

        [[middlewares.configs]]
        type = "metadata"
        "#,
    );
    let chain = MiddlewareBuilder::with_defaults()
        .build_server(&cfg, &[])
        .unwrap();

    let mut ctx = MiddlewareContext::server("/orders.v1.Orders/Create");
    let response = chain
        .run(
            &mut ctx,
            make_request(&[("x-md-tenant", "acme"), ("x-other", "ignored")]),
            |ctx, _req| {
                let tenant = ctx
                    .get_extension::<Metadata>()
                    .and_then(|md| md.get("x-md-tenant"))
                    .map(String::from);
                Box::pin(async move {
                    assert_eq!(tenant.as_deref(), Some("acme"));
                    Ok(Response::empty(StatusCode::OK))
                })
            },
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(ctx.get_extension::<Metadata>().map(Metadata::len), Some(1));
}

#[tokio::test]
async fn test_rate_limited_request_is_rendered_with_headers() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "rate_limiter"
        limit = 1
        window_ms = 60000
        key = "global"
        "#,
    );
    let chain = MiddlewareBuilder::with_defaults()
        .build_server(&cfg, &[])
        .unwrap();

    let mut ctx = MiddlewareContext::server("/orders.v1.Orders/List");
    let first = chain.serve(&mut ctx, make_request(&[]), ok_handler).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[headers::REMAINING], "0");

    let mut ctx = MiddlewareContext::server("/orders.v1.Orders/List");
    let second = chain.serve(&mut ctx, make_request(&[]), ok_handler).await;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(second.headers().contains_key(headers::RETRY_AFTER));

    let body = second.into_body().collect().await.unwrap().to_bytes();
    let envelope: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(envelope["error"]["code"], "RATE_LIMITED");
}

#[tokio::test]
async fn test_validator_error_is_rendered_for_grpc() {
    let cfg = middlewares(
        r#"
        [[middlewares.configs]]
        type = "validator"
        max_body_bytes = 1
        "#,
    );
    let chain = MiddlewareBuilder::with_defaults()
        .build_server(&cfg, &[])
        .unwrap();

    let request = http::Request::builder()
        .method("POST")
        .uri("/orders.v1.Orders/Create")
        .header("content-type", "application/grpc")
        .body(Full::new(Bytes::from_static(b"payload")))
        .unwrap();

    let mut ctx = MiddlewareContext::server("/orders.v1.Orders/Create");
    let response = chain.serve(&mut ctx, request, ok_handler).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["grpc-status"], "3");
    assert_eq!(response.headers()["x-error-reason"], "BODY_TOO_LARGE");
}
