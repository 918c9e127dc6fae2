//! Structured error types for Harbor.
//!
//! Every fallible runtime operation returns the structured [`Error`]. An error
//! carries its [`ErrorKind`] (the taxonomy), the module and operation that
//! raised it, a stable machine-readable `reason`, a human-readable message,
//! free-form string metadata and an optional cause.
//!
//! # Kinds
//!
//! | `ErrorKind` | HTTP | gRPC |
//! |---|---|---|
//! | `Validation` | 400 | `INVALID_ARGUMENT` |
//! | `Authentication` | 401 | `UNAUTHENTICATED` |
//! | `Authorization` | 403 | `PERMISSION_DENIED` |
//! | `NotFound` | 404 | `NOT_FOUND` |
//! | `Conflict` | 409 | `ALREADY_EXISTS` |
//! | `RateLimited` | 429 | `RESOURCE_EXHAUSTED` |
//! | `Unavailable` | 503 | `UNAVAILABLE` |
//! | `Internal` | 500 | `INTERNAL` |
//!
//! Errors compare with [`Error::is`] on their `(module, reason)` pair, so two
//! errors raised from different call sites with the same reason are "the same
//! error" for matching purposes.
//!
//! Multiple errors are joined with [`ErrorList`]; partial-success operations
//! return a [`Partial`] carrying both the value and the collected errors.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type HarborResult<T> = Result<T, Error>;

/// A boxed, thread-safe error used as the cause of an [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Well-known reasons shared across crates.
pub mod reasons {
    /// Request validation failed.
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    /// Authentication failed.
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    /// Authorization denied.
    pub const FORBIDDEN: &str = "FORBIDDEN";
    /// Entry, factory or resource not found.
    pub const NOT_FOUND: &str = "NOT_FOUND";
    /// Duplicate registration or constraint violation.
    pub const CONFLICT: &str = "CONFLICT";
    /// Rate limit exceeded.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    /// Downstream unavailable.
    pub const UNAVAILABLE: &str = "UNAVAILABLE";
    /// The caller's context was cancelled.
    pub const CANCELLED: &str = "CANCELLED";
    /// A deadline expired.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Anything else.
    pub const INTERNAL: &str = "INTERNAL_ERROR";
}

/// gRPC status codes used when rendering errors for gRPC transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum GrpcCode {
    /// Not an error.
    Ok = 0,
    /// The operation was cancelled.
    Cancelled = 1,
    /// Invalid argument.
    InvalidArgument = 3,
    /// Deadline expired.
    DeadlineExceeded = 4,
    /// Entity not found.
    NotFound = 5,
    /// Entity already exists.
    AlreadyExists = 6,
    /// Permission denied.
    PermissionDenied = 7,
    /// Resource exhausted.
    ResourceExhausted = 8,
    /// Internal error.
    Internal = 13,
    /// Service unavailable.
    Unavailable = 14,
    /// Missing or invalid credentials.
    Unauthenticated = 16,
}

impl GrpcCode {
    /// Returns the numeric code.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Parses a numeric gRPC status. Codes without a dedicated variant map to `Internal`.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Cancelled,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            14 => Self::Unavailable,
            16 => Self::Unauthenticated,
            _ => Self::Internal,
        }
    }
}

/// Error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Client-side input malformed.
    Validation,
    /// Credential missing, invalid or expired.
    Authentication,
    /// Principal present but not permitted.
    Authorization,
    /// Resource, configuration entry or factory not found.
    NotFound,
    /// Duplicate registration or constraint violation.
    Conflict,
    /// Request rate exceeded a configured limit.
    RateLimited,
    /// Downstream failure, timeout or cancellation.
    Unavailable,
    /// Everything else.
    Internal,
}

impl ErrorKind {
    /// Returns the default HTTP status code for this kind.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication => StatusCode::UNAUTHORIZED,
            Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the gRPC status code for this kind.
    #[must_use]
    pub const fn grpc_code(&self) -> GrpcCode {
        match self {
            Self::Validation => GrpcCode::InvalidArgument,
            Self::Authentication => GrpcCode::Unauthenticated,
            Self::Authorization => GrpcCode::PermissionDenied,
            Self::NotFound => GrpcCode::NotFound,
            Self::Conflict => GrpcCode::AlreadyExists,
            Self::RateLimited => GrpcCode::ResourceExhausted,
            Self::Unavailable => GrpcCode::Unavailable,
            Self::Internal => GrpcCode::Internal,
        }
    }

    /// Returns the default reason for errors of this kind.
    #[must_use]
    pub const fn default_reason(&self) -> &'static str {
        match self {
            Self::Validation => reasons::VALIDATION,
            Self::Authentication => reasons::UNAUTHENTICATED,
            Self::Authorization => reasons::FORBIDDEN,
            Self::NotFound => reasons::NOT_FOUND,
            Self::Conflict => reasons::CONFLICT,
            Self::RateLimited => reasons::RATE_LIMITED,
            Self::Unavailable => reasons::UNAVAILABLE,
            Self::Internal => reasons::INTERNAL,
        }
    }

    /// Maps an HTTP status back to a kind.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            400 | 422 => Self::Validation,
            401 => Self::Authentication,
            403 => Self::Authorization,
            404 => Self::NotFound,
            409 => Self::Conflict,
            429 => Self::RateLimited,
            502..=504 => Self::Unavailable,
            _ => Self::Internal,
        }
    }

    /// Maps a gRPC status back to a kind.
    #[must_use]
    pub const fn from_grpc(code: GrpcCode) -> Self {
        match code {
            GrpcCode::InvalidArgument => Self::Validation,
            GrpcCode::Unauthenticated => Self::Authentication,
            GrpcCode::PermissionDenied => Self::Authorization,
            GrpcCode::NotFound => Self::NotFound,
            GrpcCode::AlreadyExists => Self::Conflict,
            GrpcCode::ResourceExhausted => Self::RateLimited,
            GrpcCode::Cancelled | GrpcCode::DeadlineExceeded | GrpcCode::Unavailable => {
                Self::Unavailable
            }
            GrpcCode::Ok | GrpcCode::Internal => Self::Internal,
        }
    }

    /// Returns the snake_case name of the kind.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::RateLimited => "rate_limited",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn describe(module: &str, operation: &str, message: &str) -> String {
    match (module.is_empty(), operation.is_empty()) {
        (true, true) => message.to_string(),
        (false, true) => format!("{module}: {message}"),
        (true, false) => format!("{operation}: {message}"),
        (false, false) => format!("{module}.{operation}: {message}"),
    }
}

/// Standard structured error type for Harbor.
///
/// # Example
///
/// ```
/// use harbor_core::{Error, ErrorKind};
///
/// let err = Error::not_found("cache 'sessions' not found")
///     .with_module("cache")
///     .with_operation("get")
///     .with_metadata("name", "sessions");
///
/// assert_eq!(err.kind(), ErrorKind::NotFound);
/// assert_eq!(err.status_code(), http::StatusCode::NOT_FOUND);
/// assert_eq!(err.to_string(), "cache.get: cache 'sessions' not found");
/// ```
#[derive(Debug, Error)]
#[error("{}", describe(.module, .operation, .message))]
pub struct Error {
    kind: ErrorKind,
    module: String,
    operation: String,
    reason: String,
    message: String,
    metadata: BTreeMap<String, String>,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates an error of the given kind with the kind's default reason.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            module: String::new(),
            operation: String::new(),
            reason: kind.default_reason().to_string(),
            message: message.into(),
            metadata: BTreeMap::new(),
            source: None,
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        let source: anyhow::Error = source.into();
        Self::internal(message).with_source(source)
    }

    /// Creates the error returned when a caller's context is cancelled.
    #[must_use]
    pub fn cancelled(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::unavailable("context cancelled")
            .with_reason(reasons::CANCELLED)
            .with_metadata("operation", operation.clone())
            .with_operation(operation)
    }

    /// Creates the error returned when a deadline expires.
    #[must_use]
    pub fn timeout(operation: impl Into<String>, after: std::time::Duration) -> Self {
        let operation = operation.into();
        Self::unavailable(format!("deadline of {after:?} exceeded"))
            .with_reason(reasons::TIMEOUT)
            .with_metadata("operation", operation.clone())
            .with_metadata("timeout_ms", after.as_millis().to_string())
            .with_operation(operation)
    }

    /// Sets the module that raised the error.
    #[must_use]
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = module.into();
        self
    }

    /// Sets the operation that raised the error.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Overrides the reason code.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the module that raised the error.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Returns the operation that raised the error.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Returns the stable reason code.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the error metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.kind.status_code()
    }

    /// Returns the gRPC status code for this error.
    ///
    /// Cancellation and timeout reasons map to their dedicated gRPC codes.
    #[must_use]
    pub fn grpc_code(&self) -> GrpcCode {
        match self.reason.as_str() {
            reasons::CANCELLED => GrpcCode::Cancelled,
            reasons::TIMEOUT => GrpcCode::DeadlineExceeded,
            _ => self.kind.grpc_code(),
        }
    }

    /// Returns `true` if both errors share the same `(module, reason)` pair.
    #[must_use]
    pub fn is(&self, other: &Error) -> bool {
        self.module == other.module && self.reason == other.reason
    }

    /// Returns `true` if this error has the given reason.
    #[must_use]
    pub fn has_reason(&self, reason: &str) -> bool {
        self.reason == reason
    }

    /// Converts this error to a serializable envelope.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.reason.clone(),
                message: self.message.clone(),
                kind: self.kind,
                module: non_empty(&self.module),
                operation: non_empty(&self.operation),
                metadata: self.metadata.clone(),
            },
            request_id: request_id.map(ToString::to_string),
        }
    }

    /// Rebuilds an error from an envelope received over the wire.
    #[must_use]
    pub fn from_envelope(envelope: ErrorEnvelope) -> Self {
        let detail = envelope.error;
        let mut err = Self::new(detail.kind, detail.message).with_reason(detail.code);
        err.module = detail.module.unwrap_or_default();
        err.operation = detail.operation.unwrap_or_default();
        err.metadata = detail.metadata;
        err
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Serializable error envelope for transport responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable reason code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error kind.
    pub kind: ErrorKind,
    /// Module that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    /// Operation that raised the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Additional metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// An ordered aggregation of errors.
///
/// # Example
///
/// ```
/// use harbor_core::{Error, ErrorList};
///
/// let mut errors = ErrorList::new();
/// errors.push(Error::not_found("a"));
/// errors.push(Error::conflict("b"));
///
/// assert_eq!(errors.len(), 2);
/// assert_eq!(errors.to_string(), "a; b");
/// assert!(errors.into_result().is_err());
/// ```
#[derive(Debug, Default, Error)]
#[error("{}", join(.errors))]
pub struct ErrorList {
    errors: Vec<Error>,
}

impl ErrorList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error.
    pub fn push(&mut self, error: Error) {
        self.errors.push(error);
    }

    /// Appends every error of another list.
    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    /// Returns `true` if no error was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Iterates over the collected errors in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.errors.iter()
    }

    /// Returns the first collected error.
    #[must_use]
    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }

    /// Returns `Ok(())` when empty, the list otherwise.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Consumes the list and returns the errors.
    #[must_use]
    pub fn into_vec(self) -> Vec<Error> {
        self.errors
    }
}

impl From<Error> for ErrorList {
    fn from(error: Error) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<ErrorList> for Error {
    fn from(list: ErrorList) -> Self {
        let mut errors = list.into_vec();
        if errors.len() == 1 {
            if let Some(single) = errors.pop() {
                return single;
            }
        }
        let message = join(&errors);
        let kind = errors
            .first()
            .map_or(ErrorKind::Internal, Error::kind);
        Error::new(kind, message).with_metadata("errors", errors.len().to_string())
    }
}

impl IntoIterator for ErrorList {
    type Item = Error;
    type IntoIter = std::vec::IntoIter<Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a Error;
    type IntoIter = std::slice::Iter<'a, Error>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

/// Outcome of a best-effort operation: the value built so far plus every
/// error encountered along the way.
#[derive(Debug)]
pub struct Partial<T> {
    /// The successfully produced value.
    pub value: T,
    /// Errors collected while producing the value.
    pub errors: ErrorList,
}

impl<T> Partial<T> {
    /// Wraps a value with no errors.
    pub fn complete(value: T) -> Self {
        Self {
            value,
            errors: ErrorList::new(),
        }
    }

    /// Returns `true` if no error was collected.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Strict view: the value when no error was collected.
    pub fn into_result(self) -> Result<T, ErrorList> {
        if self.errors.is_empty() {
            Ok(self.value)
        } else {
            Err(self.errors)
        }
    }

    /// Splits into the value and the collected errors.
    pub fn into_parts(self) -> (T, ErrorList) {
        (self.value, self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_status_codes() {
        assert_eq!(ErrorKind::Validation.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Authentication.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorKind::Authorization.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorKind::Unavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ErrorKind::Internal.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_all_kinds_have_error_status_codes() {
        let kinds = [
            ErrorKind::Validation,
            ErrorKind::Authentication,
            ErrorKind::Authorization,
            ErrorKind::NotFound,
            ErrorKind::Conflict,
            ErrorKind::RateLimited,
            ErrorKind::Unavailable,
            ErrorKind::Internal,
        ];

        for kind in kinds {
            let status = kind.status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "kind {kind:?} should map to an error status, got {status}"
            );
            assert_eq!(ErrorKind::from_status(status), kind);
            assert_ne!(kind.grpc_code(), GrpcCode::Ok);
        }
    }

    #[test]
    fn test_display_includes_module_and_operation() {
        let err = Error::internal("boom");
        assert_eq!(err.to_string(), "boom");

        let err = Error::internal("boom").with_module("cache");
        assert_eq!(err.to_string(), "cache: boom");

        let err = Error::internal("boom")
            .with_module("cache")
            .with_operation("get");
        assert_eq!(err.to_string(), "cache.get: boom");
    }

    #[test]
    fn test_is_compares_module_and_reason() {
        let a = Error::not_found("first").with_module("cache");
        let b = Error::not_found("second").with_module("cache");
        let c = Error::not_found("first").with_module("database");
        let d = Error::not_found("first")
            .with_module("cache")
            .with_reason("CACHE_MISSING");

        assert!(a.is(&b));
        assert!(!a.is(&c));
        assert!(!a.is(&d));
    }

    #[test]
    fn test_cancelled_and_timeout_use_dedicated_grpc_codes() {
        let cancelled = Error::cancelled("/svc.v1.Users/Get");
        assert_eq!(cancelled.kind(), ErrorKind::Unavailable);
        assert_eq!(cancelled.reason(), reasons::CANCELLED);
        assert_eq!(cancelled.grpc_code(), GrpcCode::Cancelled);
        assert_eq!(cancelled.metadata()["operation"], "/svc.v1.Users/Get");

        let timeout = Error::timeout("call", std::time::Duration::from_secs(5));
        assert_eq!(timeout.grpc_code(), GrpcCode::DeadlineExceeded);
        assert_eq!(timeout.metadata()["timeout_ms"], "5000");
    }

    #[test]
    fn test_grpc_code_mapping() {
        assert_eq!(GrpcCode::from_i32(16), GrpcCode::Unauthenticated);
        assert_eq!(GrpcCode::from_i32(2), GrpcCode::Internal);
        assert_eq!(
            ErrorKind::from_grpc(GrpcCode::PermissionDenied),
            ErrorKind::Authorization
        );
        assert_eq!(
            ErrorKind::from_grpc(GrpcCode::DeadlineExceeded),
            ErrorKind::Unavailable
        );
    }

    #[test]
    fn test_source_is_exposed() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err = Error::internal_with_source("write failed", io);
        let source = std::error::Error::source(&err).expect("source should be set");
        assert!(source.to_string().contains("disk gone"));
    }

    #[test]
    fn test_envelope_round_trip() {
        let err = Error::authorization("no access")
            .with_module("security")
            .with_operation("/svc.v1.Users/Delete")
            .with_metadata("policy", "admin-only");

        let envelope = err.to_envelope(Some("req-1"));
        let json = serde_json::to_string(&envelope).expect("serialization should work");
        assert!(json.contains("\"code\":\"FORBIDDEN\""));
        assert!(json.contains("\"kind\":\"authorization\""));
        assert!(json.contains("\"request_id\":\"req-1\""));

        let decoded: ErrorEnvelope = serde_json::from_str(&json).expect("deserialize");
        let back = Error::from_envelope(decoded);
        assert!(back.is(&err));
        assert_eq!(back.kind(), ErrorKind::Authorization);
        assert_eq!(back.metadata()["policy"], "admin-only");
    }

    #[test]
    fn test_error_list_preserves_order() {
        let mut list = ErrorList::new();
        assert!(list.is_empty());
        list.push(Error::not_found("first"));
        list.push(Error::internal("second"));

        let messages: Vec<_> = list.iter().map(Error::message).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(list.to_string(), "first; second");
    }

    #[test]
    fn test_error_list_into_error() {
        let single: Error = ErrorList::from(Error::conflict("dup")).into();
        assert_eq!(single.kind(), ErrorKind::Conflict);
        assert_eq!(single.message(), "dup");

        let mut list = ErrorList::new();
        list.push(Error::not_found("a"));
        list.push(Error::internal("b"));
        let joined: Error = list.into();
        assert_eq!(joined.kind(), ErrorKind::NotFound);
        assert_eq!(joined.message(), "a; b");
    }

    #[test]
    fn test_partial() {
        let ok = Partial::complete(3);
        assert!(ok.is_complete());
        assert_eq!(ok.into_result().ok(), Some(3));

        let mut errors = ErrorList::new();
        errors.push(Error::internal("x"));
        let partial = Partial { value: 1, errors };
        assert!(!partial.is_complete());
        let (value, errors) = partial.into_parts();
        assert_eq!(value, 1);
        assert_eq!(errors.len(), 1);
    }
}
