//! Ordered middleware chains.
//!
//! A [`Chain`] is the built, immutable list of middlewares for one side of a
//! call. The first entry runs outermost, both entering and exiting.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, BoxedMiddleware, Next};
use crate::render::{render_error, Transport};
use crate::types::{MiddlewareResult, Request, Response, Side};
use harbor_core::Error;
use std::fmt;

/// One named element of a chain.
#[derive(Clone)]
pub struct ChainEntry {
    name: String,
    middleware: BoxedMiddleware,
}

impl ChainEntry {
    /// Creates an entry.
    pub fn new(name: impl Into<String>, middleware: BoxedMiddleware) -> Self {
        Self {
            name: name.into(),
            middleware,
        }
    }

    /// Effective entry name (`name` or `type` of the config entry).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The middleware itself.
    #[must_use]
    pub fn middleware(&self) -> &BoxedMiddleware {
        &self.middleware
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainEntry")
            .field("name", &self.name)
            .field("middleware", &self.middleware.name())
            .finish()
    }
}

/// An ordered middleware chain for one side.
#[derive(Debug, Clone)]
pub struct Chain {
    side: Side,
    entries: Vec<ChainEntry>,
}

impl Chain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(side: Side) -> Self {
        Self {
            side,
            entries: Vec::new(),
        }
    }

    /// Creates a chain from entries, keeping their order.
    #[must_use]
    pub fn from_entries(side: Side, entries: Vec<ChainEntry>) -> Self {
        Self { side, entries }
    }

    /// Appends a middleware under `name`.
    pub fn push(&mut self, name: impl Into<String>, middleware: BoxedMiddleware) {
        self.entries.push(ChainEntry::new(name, middleware));
    }

    /// Appends every entry of `other`.
    pub fn extend(&mut self, other: Chain) {
        self.entries.extend(other.entries);
    }

    /// The side this chain wraps.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Entries in execution order.
    #[must_use]
    pub fn entries(&self) -> &[ChainEntry] {
        &self.entries
    }

    /// Entry names in execution order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(ChainEntry::name).collect()
    }

    /// Number of middlewares.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the chain has no middleware.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps entries named in `includes` (all, when empty), then drops those in `excludes`.
    #[must_use]
    pub fn filter(self, includes: &[String], excludes: &[String]) -> Self {
        let entries = self
            .entries
            .into_iter()
            .filter(|e| includes.is_empty() || includes.iter().any(|n| n == e.name()))
            .filter(|e| !excludes.iter().any(|n| n == e.name()))
            .collect();
        Self {
            side: self.side,
            entries,
        }
    }

    fn build_next<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, MiddlewareResult>
            + Send
            + 'a,
    {
        let mut next = Next::handler(handler);
        for entry in self.entries.iter().rev() {
            next = Next::new(entry.middleware.as_ref(), next);
        }
        next
    }

    /// Runs the request through the chain and into `handler`.
    ///
    /// If the context's cancellation token fires first, the in-flight work is
    /// dropped and a cancellation error is returned.
    pub async fn run<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> MiddlewareResult
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, MiddlewareResult>
            + Send,
    {
        let token = ctx.cancellation().clone();
        if token.is_cancelled() {
            return Err(Error::cancelled(ctx.operation()).with_module("middleware"));
        }
        let operation = ctx.operation().to_string();
        let next = self.build_next(handler);

        tokio::select! {
            biased;
            () = token.cancelled() => {
                Err(Error::cancelled(operation).with_module("middleware"))
            }
            result = next.run(ctx, request) => result,
        }
    }

    /// Like [`run`](Self::run), rendering any error into a transport response.
    pub async fn serve<H>(
        &self,
        ctx: &mut MiddlewareContext,
        request: Request,
        handler: H,
    ) -> Response
    where
        H: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, MiddlewareResult>
            + Send,
    {
        let transport = Transport::detect(request.headers());
        match self.run(ctx, request, handler).await {
            Ok(response) => response,
            Err(error) => {
                tracing::debug!(
                    request_id = %ctx.request_id(),
                    operation = %ctx.operation(),
                    reason = %error.reason(),
                    "rendering chain error"
                );
                render_error(&error, transport, Some(ctx.request_id()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{FnMiddleware, Middleware};
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct Trace(Vec<String>);

    fn tracer(label: &'static str) -> BoxedMiddleware {
        Arc::new(FnMiddleware::new(
            label,
            move |ctx, req, next| {
                Box::pin(async move {
                    let mut trace = ctx.remove_extension::<Trace>().unwrap_or_default();
                    trace.0.push(format!("enter:{label}"));
                    ctx.set_extension(trace);
                    let result = next.run(ctx, req).await;
                    let mut trace = ctx.remove_extension::<Trace>().unwrap_or_default();
                    trace.0.push(format!("exit:{label}"));
                    ctx.set_extension(trace);
                    result
                })
            },
        ))
    }

    fn create_test_request() -> Request {
        http::Request::builder()
            .uri("/users.v1.Users/Get")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok_handler(
        _ctx: &mut MiddlewareContext,
        _req: Request,
    ) -> BoxFuture<'static, MiddlewareResult> {
        Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
    }

    #[tokio::test]
    async fn test_first_entry_is_outermost() {
        let mut chain = Chain::new(Side::Server);
        chain.push("a", tracer("a"));
        chain.push("b", tracer("b"));

        let mut ctx = MiddlewareContext::server("op");
        let response = chain.run(&mut ctx, create_test_request(), ok_handler).await;
        assert!(response.is_ok());
        assert_eq!(
            ctx.get_extension::<Trace>().unwrap().0,
            vec!["enter:a", "enter:b", "exit:b", "exit:a"]
        );
    }

    #[test]
    fn test_filter_includes_then_excludes() {
        let mut chain = Chain::new(Side::Client);
        for name in ["logging", "metadata", "metrics"] {
            chain.push(name, tracer("x"));
        }

        let included = chain
            .clone()
            .filter(&["logging".to_string(), "metrics".to_string()], &[]);
        assert_eq!(included.names(), vec!["logging", "metrics"]);

        let excluded = chain.filter(&[], &["metadata".to_string()]);
        assert_eq!(excluded.names(), vec!["logging", "metrics"]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let chain = Chain::new(Side::Server);
        let token = tokio_util::sync::CancellationToken::new();
        token.cancel();
        let mut ctx = MiddlewareContext::server("op").with_cancellation(token);

        let err = chain
            .run(&mut ctx, create_test_request(), ok_handler)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), harbor_core::reasons::CANCELLED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_handler() {
        let chain = Chain::new(Side::Server);
        let token = tokio_util::sync::CancellationToken::new();
        let mut ctx = MiddlewareContext::server("slow").with_cancellation(token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let err = chain
            .run(&mut ctx, create_test_request(), |_ctx, _req| {
                Box::pin(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(Response::empty(StatusCode::OK))
                })
            })
            .await
            .unwrap_err();
        canceller.await.unwrap();
        assert_eq!(err.metadata()["operation"], "slow");
    }

    #[tokio::test]
    async fn test_serve_renders_errors() {
        let chain = Chain::new(Side::Server);
        let mut ctx = MiddlewareContext::server("op").with_request_id("req-1");
        let response = chain
            .serve(&mut ctx, create_test_request(), |_ctx, _req| {
                Box::pin(async { Err(Error::not_found("no such user")) })
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()["x-request-id"], "req-1");
    }

    #[test]
    fn test_entry_debug_shows_names() {
        let entry = ChainEntry::new("log", tracer("logging"));
        let debug = format!("{entry:?}");
        assert!(debug.contains("log"));
        assert_eq!(entry.middleware().name(), "logging");
    }
}
