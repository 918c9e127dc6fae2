//! Core middleware trait and types.
//!
//! A [`Middleware`] receives the mutable context, the request and a [`Next`]
//! callback for the rest of the chain. It may short-circuit by returning
//! without calling `next`, or fail with a structured error.
//!
//! # Example
//!
//! ```
//! use harbor_middleware::{BoxFuture, Middleware, MiddlewareResult, Next, Request};
//! use harbor_middleware::context::MiddlewareContext;
//!
//! struct Stamp;
//!
//! impl Middleware for Stamp {
//!     fn name(&self) -> &str {
//!         "stamp"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut MiddlewareContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, MiddlewareResult> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx, request).await?;
//!             response
//!                 .headers_mut()
//!                 .insert("x-stamped", http::HeaderValue::from_static("1"));
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use crate::context::MiddlewareContext;
use crate::types::{MiddlewareResult, Request};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A shared, type-erased middleware.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Terminal handler of a chain: the service method on the server side, the
/// transport call on the client side.
pub type HandlerFn<'a> =
    Box<dyn FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, MiddlewareResult> + Send + 'a>;

/// The core middleware trait.
///
/// # Invariants
///
/// - Middleware calls `next.run()` at most once
/// - Middleware does not swallow downstream errors unless it handles them
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this middleware, used in logs and metrics.
    fn name(&self) -> &str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult>;
}

/// Callback to invoke the next middleware in the chain.
///
/// Consumed on use so it can only be called once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(HandlerFn<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that will invoke `middleware`, then `next`.
    pub fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut MiddlewareContext, Request) -> BoxFuture<'static, MiddlewareResult>
            + Send
            + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    pub async fn run(self, ctx: &mut MiddlewareContext, request: Request) -> MiddlewareResult {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// A middleware built from a function.
///
/// # Example
///
/// ```ignore
/// let timing = FnMiddleware::new("timing", |ctx, req, next| {
///     Box::pin(async move {
///         let started = std::time::Instant::now();
///         let response = next.run(ctx, req).await;
///         tracing::debug!(elapsed = ?started.elapsed());
///         response
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: String,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    /// Creates a new function-based middleware.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut MiddlewareContext, Request, Next<'a>) -> BoxFuture<'a, MiddlewareResult>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    struct Visit {
        name: &'static str,
    }

    #[derive(Default)]
    struct Visited(Vec<&'static str>);

    impl Middleware for Visit {
        fn name(&self) -> &str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut MiddlewareContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, MiddlewareResult> {
            Box::pin(async move {
                let mut visited = ctx.remove_extension::<Visited>().unwrap_or_default();
                visited.0.push(self.name);
                ctx.set_extension(visited);
                next.run(ctx, request).await
            })
        }
    }

    fn create_test_request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn ok_handler<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Ok(Response::empty(StatusCode::OK)) }))
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = MiddlewareContext::server("op");
        let response = ok_handler().run(&mut ctx, create_test_request()).await;
        assert_eq!(response.unwrap().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_chain_order() {
        let first = Visit { name: "first" };
        let second = Visit { name: "second" };

        let mut ctx = MiddlewareContext::server("op");
        let next = Next::new(&first, Next::new(&second, ok_handler()));
        let response = next.run(&mut ctx, create_test_request()).await;

        assert!(response.is_ok());
        assert_eq!(
            ctx.get_extension::<Visited>().unwrap().0,
            vec!["first", "second"]
        );
    }

    #[tokio::test]
    async fn test_fn_middleware_short_circuit() {
        let deny = FnMiddleware::new("deny", |_ctx, _req, _next| {
            Box::pin(async { Err(harbor_core::Error::authorization("nope")) })
        });
        assert_eq!(deny.name(), "deny");

        let mut ctx = MiddlewareContext::server("op");
        let result = Next::new(&deny, ok_handler())
            .run(&mut ctx, create_test_request())
            .await;
        assert_eq!(
            result.unwrap_err().kind(),
            harbor_core::ErrorKind::Authorization
        );
    }
}
