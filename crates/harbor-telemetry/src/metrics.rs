//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade; no exporter is installed
//! here, so without a recorder every call is a no-op.

use ::metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::Once;
use std::time::Duration;

/// Standard metric names.
pub mod metric_names {
    /// Requests handled by a middleware chain.
    pub const REQUESTS_TOTAL: &str = "harbor_requests_total";
    /// Request latency in seconds.
    pub const REQUEST_DURATION_SECONDS: &str = "harbor_request_duration_seconds";
    /// Requests currently in flight.
    pub const IN_FLIGHT_REQUESTS: &str = "harbor_in_flight_requests";
    /// Authentication outcomes.
    pub const AUTHN_DECISIONS_TOTAL: &str = "harbor_authn_decisions_total";
    /// Authorization outcomes.
    pub const AUTHZ_DECISIONS_TOTAL: &str = "harbor_authz_decisions_total";
    /// Requests rejected by the rate limiter.
    pub const RATE_LIMITED_TOTAL: &str = "harbor_rate_limited_total";
    /// Circuit breaker state transitions.
    pub const CIRCUIT_TRANSITIONS_TOTAL: &str = "harbor_circuit_transitions_total";
    /// Component materializations by domain and outcome.
    pub const MATERIALIZATIONS_TOTAL: &str = "harbor_materializations_total";
}

static DESCRIBE: Once = Once::new();

/// Registers descriptions for all standard metrics. Idempotent.
pub fn describe_metrics() {
    DESCRIBE.call_once(|| {
        describe_counter!(
            metric_names::REQUESTS_TOTAL,
            "Total number of requests handled by a middleware chain"
        );
        describe_histogram!(
            metric_names::REQUEST_DURATION_SECONDS,
            "Request duration in seconds"
        );
        describe_gauge!(
            metric_names::IN_FLIGHT_REQUESTS,
            "Number of requests currently being processed"
        );
        describe_counter!(
            metric_names::AUTHN_DECISIONS_TOTAL,
            "Authentication decisions by result"
        );
        describe_counter!(
            metric_names::AUTHZ_DECISIONS_TOTAL,
            "Authorization decisions by result"
        );
        describe_counter!(
            metric_names::RATE_LIMITED_TOTAL,
            "Requests rejected by the rate limiter"
        );
        describe_counter!(
            metric_names::CIRCUIT_TRANSITIONS_TOTAL,
            "Circuit breaker state transitions"
        );
        describe_counter!(
            metric_names::MATERIALIZATIONS_TOTAL,
            "Component materializations by domain and outcome"
        );
    });
}

/// Records a completed request.
pub fn record_request(side: &str, operation: &str, status: &str, duration: Duration) {
    counter!(
        metric_names::REQUESTS_TOTAL,
        "side" => side.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        metric_names::REQUEST_DURATION_SECONDS,
        "side" => side.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records an authentication outcome.
pub fn record_authn_decision(success: bool, policy: &str) {
    counter!(
        metric_names::AUTHN_DECISIONS_TOTAL,
        "success" => success.to_string(),
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// Records an authorization outcome.
pub fn record_authz_decision(allowed: bool, policy: &str) {
    counter!(
        metric_names::AUTHZ_DECISIONS_TOTAL,
        "allowed" => allowed.to_string(),
        "policy" => policy.to_string()
    )
    .increment(1);
}

/// Records a rate-limited request.
pub fn record_rate_limited(middleware: &str) {
    counter!(
        metric_names::RATE_LIMITED_TOTAL,
        "middleware" => middleware.to_string()
    )
    .increment(1);
}

/// Records a circuit breaker transition.
pub fn record_circuit_transition(breaker: &str, to: &str) {
    counter!(
        metric_names::CIRCUIT_TRANSITIONS_TOTAL,
        "breaker" => breaker.to_string(),
        "to" => to.to_string()
    )
    .increment(1);
}

/// Records one materialization attempt.
pub fn record_materialization(domain: &str, ok: bool) {
    counter!(
        metric_names::MATERIALIZATIONS_TOTAL,
        "domain" => domain.to_string(),
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

/// Guard that tracks one in-flight request and decrements on drop.
pub struct InFlightGuard {
    side: &'static str,
}

impl InFlightGuard {
    /// Creates a new guard and increments the in-flight gauge.
    #[must_use]
    pub fn new(side: &'static str) -> Self {
        gauge!(metric_names::IN_FLIGHT_REQUESTS, "side" => side).increment(1.0);
        Self { side }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(metric_names::IN_FLIGHT_REQUESTS, "side" => self.side).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_functions_dont_panic() {
        describe_metrics();
        describe_metrics();
        record_request("server", "/users.v1.Users/Get", "200", Duration::from_millis(10));
        record_authn_decision(false, "jwt-required");
        record_authz_decision(true, "jwt-required");
        record_rate_limited("rate_limiter");
        record_circuit_transition("users", "open");
        record_materialization("cache", true);
    }

    #[test]
    fn test_in_flight_guard() {
        let guard = InFlightGuard::new("server");
        drop(guard);
    }

    #[test]
    fn test_metric_names_are_prefixed() {
        for name in [
            metric_names::REQUESTS_TOTAL,
            metric_names::REQUEST_DURATION_SECONDS,
            metric_names::IN_FLIGHT_REQUESTS,
            metric_names::MATERIALIZATIONS_TOTAL,
        ] {
            assert!(name.starts_with("harbor_"));
        }
    }
}
