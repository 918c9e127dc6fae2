//! A whole service assembled through the facade: file-based configuration,
//! container, middleware chains and shutdown.

use bytes::Bytes;
use harbor::prelude::*;
use http::StatusCode;
use http_body_util::Full;
use std::io::Write;
use tempfile::NamedTempFile;

const SERVICE: &str = r#"
[app]
name = "orders"
version = "2.0.0"

[[data.caches.configs]]
name = "sessions"
driver = "memory"

[[middlewares.configs]]
type = "logging"

[[middlewares.configs]]
type = "metadata"

[[middlewares.configs]]
type = "rate_limiter"
limit = 1
window_ms = 60000

[[middlewares.configs]]
type = "selector"
includes = ["logging"]
"#;

fn container() -> Container {
    let mut file = NamedTempFile::with_suffix(".toml").unwrap();
    write!(file, "{SERVICE}").unwrap();
    let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
    Container::with_defaults(config, ComponentFactories::new(), &[])
}

#[test]
fn test_selector_shapes_both_chains() {
    let container = container();
    let middlewares = container.middlewares().unwrap();

    assert_eq!(middlewares.server().unwrap().names(), vec!["logging"]);
    assert_eq!(middlewares.client().unwrap().names(), vec!["logging"]);
    assert_eq!(container.app().unwrap().version, "2.0.0");
}

#[tokio::test]
async fn test_requests_pass_the_filtered_chain() {
    let container = container();
    let chain = container.middlewares().unwrap().server().unwrap();

    // The rate limiter (limit 1) was filtered out, so repeated calls pass.
    for _ in 0..3 {
        let mut ctx = MiddlewareContext::server("/orders.v1.Orders/List");
        let request: Request = http::Request::builder()
            .uri("/orders")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let response = chain
            .serve(&mut ctx, request, |_ctx, _req| {
                Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
            })
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let sessions = container.default_cache("").unwrap();
    sessions.set("token", Bytes::from_static(b"t"), None).await.unwrap();
    container.close().await.unwrap();
    assert!(sessions.exists("token").await.is_err());
}
