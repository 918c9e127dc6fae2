//! Structured logging for Harbor.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and either
//! a JSON or a pretty formatting layer, driven by the document's `logger`
//! section.
//!
//! # Example
//!
//! ```rust,ignore
//! use harbor_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! tracing::info!(operation = "/users.v1.Users/Get", "processing request");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use harbor_config::{LogFormat, LoggerConfig};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether logging is enabled.
    pub enabled: bool,

    /// Filter directive (e.g., "info", "harbor_runtime=debug").
    pub level: String,

    /// Whether to output JSON format.
    pub json_format: bool,

    /// Whether to include span events (new, close).
    pub span_events: bool,

    /// Whether to include file/line info.
    pub file_line_info: bool,

    /// Whether to include target (module path).
    pub include_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            span_events: false,
            file_line_info: false,
            include_target: true,
        }
    }
}

impl LogConfig {
    /// Creates a development configuration with human-readable output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            span_events: true,
            file_line_info: true,
            include_target: true,
        }
    }
}

impl From<&LoggerConfig> for LogConfig {
    fn from(cfg: &LoggerConfig) -> Self {
        Self {
            enabled: true,
            level: cfg.level.clone(),
            json_format: cfg.format == LogFormat::Json,
            span_events: false,
            file_line_info: cfg.file_line,
            include_target: cfg.target,
        }
    }
}

/// Initializes the logging subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidConfig` for a bad filter directive and
/// `TelemetryError::LoggingInit` if a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = create_env_filter(&config.level)?;

    let span_events = if config.span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_span_events(span_events)
            .with_file(config.file_line_info)
            .with_line_number(config.file_line_info)
            .with_target(config.include_target)
            .with_filter(filter);

        tracing_subscriber::registry()
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;
    }

    Ok(())
}

/// Initializes logging from the document's `logger` section.
///
/// # Errors
///
/// See [`init_logging`].
pub fn init_from_logger(config: &LoggerConfig) -> TelemetryResult<()> {
    init_logging(&LogConfig::from(config))
}

/// Creates an env filter from a string.
///
/// # Errors
///
/// Returns error if the filter string is invalid.
pub fn create_env_filter(filter: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(filter)
        .map_err(|e| TelemetryError::InvalidConfig(format!("invalid log level: {e}")))
}

/// Standard log fields for Harbor.
pub mod fields {
    /// Request ID field name.
    pub const REQUEST_ID: &str = "request_id";

    /// Operation field name.
    pub const OPERATION: &str = "operation";

    /// Component domain field name (cache, database, ...).
    pub const DOMAIN: &str = "domain";

    /// Instance name field name.
    pub const INSTANCE: &str = "instance";

    /// Factory / driver field name.
    pub const DRIVER: &str = "driver";

    /// Middleware name field name.
    pub const MIDDLEWARE: &str = "middleware";

    /// Chain side (server / client) field name.
    pub const SIDE: &str = "side";

    /// Security policy field name.
    pub const POLICY: &str = "policy";

    /// Principal ID field name.
    pub const PRINCIPAL: &str = "principal";

    /// HTTP status code field name.
    pub const HTTP_STATUS: &str = "http.status_code";

    /// Duration field name (in milliseconds).
    pub const DURATION_MS: &str = "duration_ms";

    /// Error field name.
    pub const ERROR: &str = "error";

    /// Reason code field name.
    pub const REASON: &str = "reason";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert!(config.enabled);
        assert!(config.json_format);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_development_config() {
        let config = LogConfig::development();
        assert!(!config.json_format);
        assert!(config.span_events);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn test_from_logger_section() {
        let logger = LoggerConfig {
            level: "harbor_runtime=debug".to_string(),
            format: LogFormat::Pretty,
            file_line: true,
            target: false,
        };
        let config = LogConfig::from(&logger);
        assert!(!config.json_format);
        assert!(config.file_line_info);
        assert!(!config.include_target);
        assert_eq!(config.level, "harbor_runtime=debug");
    }

    #[test]
    fn test_create_env_filter() {
        assert!(create_env_filter("info").is_ok());
        assert!(create_env_filter("harbor_security=debug,warn").is_ok());
    }

    #[test]
    fn test_disabled_logging() {
        let config = LogConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
