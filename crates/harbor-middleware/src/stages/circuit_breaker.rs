//! Circuit breaker (client side only).
//!
//! One breaker per operation. A breaker opens after `failure_threshold`
//! consecutive failures, rejects calls while open, lets up to
//! `half_open_requests` probes through once `reset_timeout_ms` has passed and
//! closes again after `success_threshold` successful probes.
//!
//! Failures are `Unavailable` / `Internal` errors and 5xx (or gRPC
//! `UNAVAILABLE` / `INTERNAL` / `DEADLINE_EXCEEDED`) responses.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::render::GRPC_STATUS;
use crate::types::{MiddlewareResult, Request};
use harbor_config::{ConfigEntry, MiddlewareEntry};
use harbor_core::{Error, ErrorKind, GrpcCode, HarborResult, Options};
use harbor_telemetry::metrics::record_circuit_transition;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Reason attached to calls rejected by an open circuit.
pub const CIRCUIT_OPEN: &str = "CIRCUIT_OPEN";

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls flow normally.
    Closed,
    /// Calls are rejected.
    Open,
    /// A limited number of probe calls are allowed.
    HalfOpen,
}

impl CircuitState {
    /// Lowercase state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// `circuit_breaker` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Successful probes that close it again.
    pub success_threshold: u32,
    /// Time spent open before probing, in milliseconds.
    pub reset_timeout_ms: u64,
    /// Probe calls allowed while half-open.
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout_ms: 30_000,
            half_open_requests: 3,
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    half_open_in_flight: u32,
    opened_at: Option<Instant>,
}

/// A single circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    settings: CircuitBreakerSettings,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failures: 0,
                successes: 0,
                half_open_in_flight: 0,
                opened_at: None,
            }),
        }
    }

    fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.reset_timeout_ms)
    }

    /// Current state, moving Open → HalfOpen once the reset timeout passed.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    /// Returns `true` if a call may proceed, reserving a probe slot when half-open.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.settings.half_open_requests {
                    inner.half_open_in_flight += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => inner.failures = 0,
            CircuitState::HalfOpen => {
                inner.successes += 1;
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                if inner.successes >= self.settings.success_threshold {
                    self.transition(&mut inner, CircuitState::Closed);
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Records a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.failures += 1;
                if inner.failures >= self.settings.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen => self.transition(&mut inner, CircuitState::Open),
            CircuitState::Open => {}
        }
    }

    fn maybe_half_open(&self, inner: &mut BreakerState) {
        if inner.state == CircuitState::Open
            && inner
                .opened_at
                .is_some_and(|at| at.elapsed() >= self.reset_timeout())
        {
            self.transition(inner, CircuitState::HalfOpen);
        }
    }

    fn transition(&self, inner: &mut BreakerState, to: CircuitState) {
        if inner.state == to {
            return;
        }
        match to {
            CircuitState::Open => {
                tracing::warn!(breaker = %self.name, failures = inner.failures, "circuit breaker opening");
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::HalfOpen => {
                tracing::info!(breaker = %self.name, "circuit breaker half-open");
            }
            CircuitState::Closed => {
                tracing::info!(breaker = %self.name, "circuit breaker closing");
                inner.opened_at = None;
            }
        }
        inner.state = to;
        inner.failures = 0;
        inner.successes = 0;
        inner.half_open_in_flight = 0;
        record_circuit_transition(&self.name, to.as_str());
    }
}

/// Whether a call outcome counts against the breaker.
fn is_failure(result: &MiddlewareResult) -> bool {
    match result {
        Ok(response) => {
            if response.status().is_server_error() {
                return true;
            }
            response
                .headers()
                .get(GRPC_STATUS)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i32>().ok())
                .map(GrpcCode::from_i32)
                .is_some_and(|code| {
                    matches!(
                        code,
                        GrpcCode::Unavailable | GrpcCode::Internal | GrpcCode::DeadlineExceeded
                    )
                })
        }
        Err(error) => matches!(error.kind(), ErrorKind::Unavailable | ErrorKind::Internal),
    }
}

/// Per-operation circuit breaking for outbound calls.
#[derive(Debug)]
pub struct CircuitBreakerMiddleware {
    name: String,
    settings: CircuitBreakerSettings,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: CircuitBreakerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// Returns (creating if needed) the breaker for `operation`.
    pub fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock();
        Arc::clone(breakers.entry(operation.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(operation, self.settings.clone()))
        }))
    }
}

impl Middleware for CircuitBreakerMiddleware {
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
            let breaker = self.breaker(ctx.operation());
            if !breaker.try_acquire() {
                return Err(Error::unavailable(format!(
                    "circuit open for '{}'",
                    ctx.operation()
                ))
                .with_module("middleware")
                .with_operation(ctx.operation())
                .with_reason(CIRCUIT_OPEN));
            }

            let result = next.run(ctx, request).await;
            if is_failure(&result) {
                breaker.record_failure();
            } else {
                breaker.record_success();
            }
            result
        })
    }
}

/// Factory for `circuit_breaker`. There is no server-side form.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitBreakerFactory;

impl MiddlewareFactory for CircuitBreakerFactory {
    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: CircuitBreakerSettings = entry.settings()?;
        if settings.failure_threshold == 0 || settings.success_threshold == 0 {
            return Err(Error::validation(
                "circuit breaker thresholds must be greater than zero",
            ));
        }
        Ok(Some(Arc::new(CircuitBreakerMiddleware::new(
            entry.identity(),
            settings,
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Response, ResponseExt};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    fn settings() -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            failure_threshold: 2,
            success_threshold: 1,
            reset_timeout_ms: 1_000,
            half_open_requests: 1,
        }
    }

    async fn call(mw: &CircuitBreakerMiddleware, status: StatusCode) -> MiddlewareResult {
        let mut ctx = MiddlewareContext::client("/users.v1.Users/Get");
        mw.process(
            &mut ctx,
            http::Request::new(Full::new(Bytes::new())),
            Next::handler(move |_ctx, _req| Box::pin(async move { Ok(Response::empty(status)) })),
        )
        .await
    }

    #[test]
    fn test_breaker_opens_after_threshold() {
        let breaker = CircuitBreaker::new("b", settings());
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failures() {
        let breaker = CircuitBreaker::new("b", settings());
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_probe_closes() {
        let breaker = CircuitBreaker::new("b", settings());
        breaker.record_failure();
        breaker.record_failure();

        tokio::time::advance(Duration::from_millis(1_001)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire());
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new("b", settings());
        breaker.record_failure();
        breaker.record_failure();
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(breaker.try_acquire());
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_middleware_rejects_when_open() {
        let mw = CircuitBreakerMiddleware::new("cb", settings());
        assert!(call(&mw, StatusCode::BAD_GATEWAY).await.is_ok());
        assert!(call(&mw, StatusCode::SERVICE_UNAVAILABLE).await.is_ok());

        let err = call(&mw, StatusCode::OK).await.unwrap_err();
        assert_eq!(err.reason(), CIRCUIT_OPEN);
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_client_errors_are_not_failures() {
        assert!(!is_failure(&Ok(Response::empty(StatusCode::NOT_FOUND))));
        assert!(!is_failure(&Err(Error::validation("bad"))));
        assert!(is_failure(&Err(Error::unavailable("down"))));
    }

    #[test]
    fn test_factory_is_client_only() {
        let entry = MiddlewareEntry::new("", "circuit_breaker");
        let opts = Options::new();
        assert!(CircuitBreakerFactory.new_server(&entry, &opts).unwrap().is_none());
        assert!(CircuitBreakerFactory.new_client(&entry, &opts).unwrap().is_some());
    }
}
