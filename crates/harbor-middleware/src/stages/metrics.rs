//! Request metrics.
//!
//! Counts calls by side, operation and status, records latency and tracks
//! in-flight calls through the `metrics` facade.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request, Side};
use harbor_config::MiddlewareEntry;
use harbor_core::{HarborResult, Options};
use harbor_telemetry::metrics::{describe_metrics, record_request, InFlightGuard};
use std::sync::Arc;
use std::time::Instant;

/// Records request metrics.
#[derive(Debug, Clone, Copy)]
pub struct MetricsMiddleware {
    side: Side,
}

impl MetricsMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(side: Side) -> Self {
        describe_metrics();
        Self { side }
    }
}

/// Status label for a call outcome: the HTTP status, or the error reason.
fn status_label(result: &MiddlewareResult) -> String {
    match result {
        Ok(response) => response.status().as_u16().to_string(),
        Err(error) => error.reason().to_string(),
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let _in_flight = InFlightGuard::new(self.side.as_str());
            let start = Instant::now();
            let result = next.run(ctx, request).await;
            record_request(
                self.side.as_str(),
                ctx.operation(),
                &status_label(&result),
                start.elapsed(),
            );
            result
        })
    }
}

/// Factory for `metrics`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsFactory;

impl MiddlewareFactory for MetricsFactory {
    fn new_server(
        &self,
        _entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Ok(Some(Arc::new(MetricsMiddleware::new(Side::Server))))
    }

    fn new_client(
        &self,
        _entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Ok(Some(Arc::new(MetricsMiddleware::new(Side::Client))))
    }
}
