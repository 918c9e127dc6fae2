//! Built-in middleware types.
//!
//! | Type | Server | Client |
//! |------|--------|--------|
//! | [`metadata`] | extracts `x-md-*` headers | injects `x-md-*` headers |
//! | [`logging`] | yes | yes |
//! | [`selector`] | filters the chain | filters the chain |
//! | [`rate_limiter`] | yes | - |
//! | [`circuit_breaker`] | - | yes |
//! | [`jwt`] | validates bearer tokens | signs and attaches tokens |
//! | [`cors`] | yes | - |
//! | [`metrics`] | yes | yes |
//! | [`validator`] | yes | - |
//! | [`timeout`] | yes | yes |
//!
//! The declarative `security` type lives in `harbor-security`, which
//! registers it on top of these.

pub mod circuit_breaker;
pub mod cors;
pub mod jwt;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod rate_limiter;
pub mod selector;
pub mod timeout;
pub mod validator;

pub use circuit_breaker::{CircuitBreakerFactory, CircuitBreakerMiddleware};
pub use cors::{CorsFactory, CorsMiddleware};
pub use jwt::{JwtClientMiddleware, JwtCodec, JwtFactory, JwtServerMiddleware};
pub use logging::{LoggingFactory, LoggingMiddleware};
pub use metadata::{Metadata, MetadataFactory, MetadataMiddleware};
pub use metrics::{MetricsFactory, MetricsMiddleware};
pub use rate_limiter::{RateLimitFactory, RateLimitMiddleware};
pub use selector::{SelectorFactory, SelectorSettings};
pub use timeout::{TimeoutFactory, TimeoutMiddleware};
pub use validator::{ValidatorFactory, ValidatorMiddleware};

use crate::builder::MiddlewareBuilder;

/// Well-known middleware type names.
pub mod kinds {
    /// Header metadata propagation.
    pub const METADATA: &str = "metadata";
    /// Request logging.
    pub const LOGGING: &str = "logging";
    /// Chain filter.
    pub const SELECTOR: &str = "selector";
    /// Sliding-window rate limiter.
    pub const RATE_LIMITER: &str = "rate_limiter";
    /// Client circuit breaker.
    pub const CIRCUIT_BREAKER: &str = "circuit_breaker";
    /// JWT bearer tokens.
    pub const JWT: &str = "jwt";
    /// CORS.
    pub const CORS: &str = "cors";
    /// Request metrics.
    pub const METRICS: &str = "metrics";
    /// Request validation.
    pub const VALIDATOR: &str = "validator";
    /// Per-call timeout.
    pub const TIMEOUT: &str = "timeout";
    /// Declarative security.
    pub const SECURITY: &str = "security";
}

/// Registers every built-in type on `builder`.
pub fn register_defaults(builder: &MiddlewareBuilder) {
    builder.register(kinds::METADATA, MetadataFactory);
    builder.register(kinds::LOGGING, LoggingFactory);
    builder.register(kinds::SELECTOR, SelectorFactory);
    builder.register(kinds::RATE_LIMITER, RateLimitFactory);
    builder.register(kinds::CIRCUIT_BREAKER, CircuitBreakerFactory);
    builder.register(kinds::JWT, JwtFactory);
    builder.register(kinds::CORS, CorsFactory);
    builder.register(kinds::METRICS, MetricsFactory);
    builder.register(kinds::VALIDATOR, ValidatorFactory);
    builder.register(kinds::TIMEOUT, TimeoutFactory);
}
