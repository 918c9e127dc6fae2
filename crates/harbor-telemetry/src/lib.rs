//! Observability plumbing for Harbor.
//!
//! - **Logging**: `tracing-subscriber` initialisation from the `logger` section
//! - **Fields**: standard structured field names ([`fields`])
//! - **Metrics**: standard metric names and recording helpers through the
//!   `metrics` facade ([`metric_names`])
//!
//! No exporter is installed by this crate; applications wire their own
//! recorder when they need one.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `harbor_requests_total` | Counter | `side`, `operation`, `status` |
//! | `harbor_request_duration_seconds` | Histogram | `side`, `operation` |
//! | `harbor_in_flight_requests` | Gauge | `side` |
//! | `harbor_authn_decisions_total` | Counter | `success`, `policy` |
//! | `harbor_authz_decisions_total` | Counter | `allowed`, `policy` |
//! | `harbor_rate_limited_total` | Counter | `middleware` |
//! | `harbor_circuit_transitions_total` | Counter | `breaker`, `to` |
//! | `harbor_materializations_total` | Counter | `domain`, `outcome` |

#![doc(html_root_url = "https://docs.rs/harbor-telemetry/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
pub mod logging;
pub mod metrics;

pub use error::TelemetryError;
pub use logging::{fields, init_from_logger, init_logging, LogConfig};
pub use metrics::{metric_names, InFlightGuard};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
