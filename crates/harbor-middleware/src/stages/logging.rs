//! Request/response logging.
//!
//! Emits one structured line per call with the operation, request id,
//! outcome and latency. Calls slower than `slow_threshold_ms` log at warn.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request, Side};
use harbor_config::{ConfigEntry, MiddlewareEntry};
use harbor_core::{HarborResult, Options};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// `logging` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Latency above which a call is logged at warn. `0` disables.
    pub slow_threshold_ms: u64,
    /// Whether request headers are included (at debug).
    pub log_headers: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            slow_threshold_ms: 1_000,
            log_headers: false,
        }
    }
}

/// Logs every call passing through the chain.
#[derive(Debug, Clone)]
pub struct LoggingMiddleware {
    name: String,
    side: Side,
    slow_threshold: Option<Duration>,
    log_headers: bool,
}

impl LoggingMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, side: Side, settings: &LoggingSettings) -> Self {
        Self {
            name: name.into(),
            side,
            slow_threshold: (settings.slow_threshold_ms > 0)
                .then(|| Duration::from_millis(settings.slow_threshold_ms)),
            log_headers: settings.log_headers,
        }
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_threshold.is_some_and(|t| elapsed > t)
    }
}

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        &self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let start = Instant::now();
            let method = request.method().clone();
            let path = request.uri().path().to_string();

            if self.log_headers {
                tracing::debug!(
                    side = %self.side,
                    request_id = %ctx.request_id(),
                    headers = ?request.headers(),
                    "request headers"
                );
            }

            let result = next.run(ctx, request).await;
            let elapsed = start.elapsed();
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;

            match &result {
                Ok(response) if self.is_slow(elapsed) => tracing::warn!(
                    side = %self.side,
                    request_id = %ctx.request_id(),
                    operation = %ctx.operation(),
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    duration_ms,
                    "slow call"
                ),
                Ok(response) => tracing::info!(
                    side = %self.side,
                    request_id = %ctx.request_id(),
                    operation = %ctx.operation(),
                    method = %method,
                    path = %path,
                    status = response.status().as_u16(),
                    duration_ms,
                    "call completed"
                ),
                Err(error) => tracing::warn!(
                    side = %self.side,
                    request_id = %ctx.request_id(),
                    operation = %ctx.operation(),
                    method = %method,
                    path = %path,
                    reason = %error.reason(),
                    error = %error,
                    duration_ms,
                    "call failed"
                ),
            }

            result
        })
    }
}

/// Factory for `logging`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingFactory;

impl LoggingFactory {
    fn build(entry: &MiddlewareEntry, side: Side) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: LoggingSettings = entry.settings()?;
        Ok(Some(Arc::new(LoggingMiddleware::new(
            entry.identity(),
            side,
            &settings,
        ))))
    }
}

impl MiddlewareFactory for LoggingFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Self::build(entry, Side::Server)
    }

    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Self::build(entry, Side::Client)
    }
}
