//! Common types used throughout the middleware chains.

use bytes::Bytes;
use harbor_core::Error;
use http_body_util::Full;

/// The HTTP request type used in middleware chains.
///
/// gRPC calls travel as HTTP/2 requests with an `application/grpc` content type.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in middleware chains.
pub type Response = http::Response<Full<Bytes>>;

/// Outcome of a middleware or handler.
pub type MiddlewareResult = Result<Response, Error>;

/// Which side of a call a chain wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Inbound requests handled by this service.
    Server,
    /// Outbound calls made by this service.
    Client,
}

impl Side {
    /// Returns the lowercase name of the side.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Client => "client",
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates an empty response with the given status.
    fn empty(status: http::StatusCode) -> Response;

    /// Creates a JSON response.
    fn json(status: http::StatusCode, body: &serde_json::Value) -> Response;

    /// Creates a JSON error response.
    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn empty(status: http::StatusCode) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = status;
        response
    }

    fn json(status: http::StatusCode, body: &serde_json::Value) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        response
    }

    fn json_error(status: http::StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        Self::json(status, &body)
    }
}
