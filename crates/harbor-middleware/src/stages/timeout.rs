//! Per-entry call timeout.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request};
use harbor_config::MiddlewareEntry;
use harbor_core::{Error, HarborResult, Options};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Default call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// `timeout` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            #[allow(clippy::cast_possible_truncation)]
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Fails calls that take longer than the configured duration.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    timeout: Duration,
}

impl TimeoutMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The configured timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let operation = ctx.operation().to_string();
            match tokio::time::timeout(self.timeout, next.run(ctx, request)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(
                        operation = %operation,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "call timed out"
                    );
                    Err(Error::timeout(operation, self.timeout).with_module("middleware"))
                }
            }
        })
    }
}

/// Factory for `timeout`. Both sides share the same settings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutFactory;

impl TimeoutFactory {
    fn build(entry: &MiddlewareEntry) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: TimeoutSettings = entry.settings()?;
        if settings.timeout_ms == 0 {
            return Err(Error::validation("timeout_ms must be greater than zero")
                .with_metadata("entry", entry.kind.as_str()));
        }
        Ok(Some(Arc::new(TimeoutMiddleware::new(Duration::from_millis(
            settings.timeout_ms,
        )))))
    }
}

impl MiddlewareFactory for TimeoutFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Self::build(entry)
    }

    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Self::build(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use bytes::Bytes;
    use harbor_core::reasons;
    use http::StatusCode;
    use http_body_util::Full;
    use serde_json::json;

    fn request() -> Request {
        http::Request::new(Full::new(Bytes::new()))
    }

    #[test]
    fn test_default_is_five_seconds() {
        let entry = MiddlewareEntry::new("", "timeout");
        let mw = TimeoutFactory::build(&entry).unwrap().unwrap();
        assert_eq!(mw.name(), "timeout");
        assert_eq!(TimeoutSettings::default().timeout_ms, 5_000);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let entry = MiddlewareEntry::new("", "timeout").with_setting("timeout_ms", json!(0));
        assert!(TimeoutFactory::build(&entry).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let mw = TimeoutMiddleware::new(Duration::from_millis(50));
        let mut ctx = MiddlewareContext::client("/slow.v1.Slow/Call");
        let err = mw
            .process(
                &mut ctx,
                request(),
                Next::handler(|_ctx, _req| {
                    Box::pin(async {
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        Ok(Response::empty(StatusCode::OK))
                    })
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reasons::TIMEOUT);
        assert_eq!(err.metadata()["timeout_ms"], "50");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_handler_passes() {
        let mw = TimeoutMiddleware::new(Duration::from_millis(50));
        let mut ctx = MiddlewareContext::client("op");
        let response = mw
            .process(
                &mut ctx,
                request(),
                Next::handler(|_ctx, _req| {
                    Box::pin(async { Ok(Response::empty(StatusCode::OK)) })
                }),
            )
            .await;
        assert!(response.is_ok());
    }
}
