//! Transport-specific error rendering.
//!
//! HTTP errors become a status plus a JSON envelope. gRPC errors travel as an
//! HTTP 200 carrying `grpc-status` / `grpc-message` trailers-as-headers, with
//! the stable reason and module alongside.

use crate::types::{MiddlewareResult, Response};
use bytes::Bytes;
use harbor_core::{Error, ErrorEnvelope, ErrorKind, GrpcCode};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::{BodyExt, Full};

/// gRPC status header.
pub const GRPC_STATUS: &str = "grpc-status";
/// gRPC message header.
pub const GRPC_MESSAGE: &str = "grpc-message";
/// Stable reason code header on gRPC errors.
pub const ERROR_REASON: &str = "x-error-reason";
/// Module header on gRPC errors.
pub const ERROR_MODULE: &str = "x-error-module";

/// Wire transport of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Plain HTTP with JSON bodies.
    Http,
    /// gRPC over HTTP/2.
    Grpc,
}

impl Transport {
    /// Detects the transport from a `content-type` header.
    #[must_use]
    pub fn detect(headers: &HeaderMap) -> Self {
        let is_grpc = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/grpc"));
        if is_grpc {
            Self::Grpc
        } else {
            Self::Http
        }
    }

    /// Returns `"http"` or `"grpc"`.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }
}

/// Renders an error for the given transport.
#[must_use]
pub fn render_error(error: &Error, transport: Transport, request_id: Option<&str>) -> Response {
    match transport {
        Transport::Http => render_http(error, request_id),
        Transport::Grpc => render_grpc(error),
    }
}

fn render_http(error: &Error, request_id: Option<&str>) -> Response {
    let envelope = error.to_envelope(request_id);
    let body = serde_json::to_vec(&envelope).unwrap_or_default();

    let mut response = http::Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = error.status_code();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Some(id) = request_id.and_then(|id| HeaderValue::from_str(id).ok()) {
        response
            .headers_mut()
            .insert(crate::context::REQUEST_ID_HEADER, id);
    }
    response
}

fn render_grpc(error: &Error) -> Response {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/grpc"),
    );
    headers.insert(GRPC_STATUS, HeaderValue::from(error.grpc_code().as_i32()));
    if let Ok(message) = HeaderValue::from_str(&percent_encode(error.message())) {
        headers.insert(GRPC_MESSAGE, message);
    }
    if let Ok(reason) = HeaderValue::from_str(error.reason()) {
        headers.insert(ERROR_REASON, reason);
    }
    if let Ok(module) = HeaderValue::from_str(error.module()) {
        if !error.module().is_empty() {
            headers.insert(ERROR_MODULE, module);
        }
    }
    response
}

// grpc-message is percent-encoded for anything outside printable ASCII.
fn percent_encode(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for byte in message.bytes() {
        if (0x20..0x7f).contains(&byte) && byte != b'%' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn percent_decode(message: &str) -> String {
    let bytes = message.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Returns `true` when the response carries an error for its transport.
#[must_use]
pub fn is_error_response(response: &Response) -> bool {
    if let Some(code) = header_str(response.headers(), GRPC_STATUS) {
        return code.trim() != "0";
    }
    response.status().is_client_error() || response.status().is_server_error()
}

/// Converts a received error response back into a structured [`Error`].
///
/// Successful responses pass through untouched.
pub async fn error_from_response(response: Response) -> MiddlewareResult {
    if !is_error_response(&response) {
        return Ok(response);
    }

    let (parts, body) = response.into_parts();

    if let Some(code) = header_str(&parts.headers, GRPC_STATUS) {
        let code = GrpcCode::from_i32(code.trim().parse().unwrap_or(2));
        let message = header_str(&parts.headers, GRPC_MESSAGE)
            .map(percent_decode)
            .unwrap_or_default();
        let mut error = Error::new(ErrorKind::from_grpc(code), message);
        if let Some(reason) = header_str(&parts.headers, ERROR_REASON) {
            error = error.with_reason(reason);
        }
        if let Some(module) = header_str(&parts.headers, ERROR_MODULE) {
            error = error.with_module(module);
        }
        return Err(error);
    }

    let bytes = body
        .collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .unwrap_or_default();
    Err(error_from_http(parts.status, &bytes))
}

fn error_from_http(status: StatusCode, body: &[u8]) -> Error {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => Error::from_envelope(envelope),
        Err(_) => {
            let message = if body.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                String::from_utf8_lossy(body).into_owned()
            };
            Error::new(ErrorKind::from_status(status), message)
                .with_metadata("http_status", status.as_u16().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::reasons;

    fn grpc_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/grpc+proto"),
        );
        headers
    }

    #[test]
    fn test_detect_transport() {
        assert_eq!(Transport::detect(&grpc_headers()), Transport::Grpc);
        assert_eq!(Transport::detect(&HeaderMap::new()), Transport::Http);
    }

    #[tokio::test]
    async fn test_http_round_trip() {
        let error = Error::authentication("token expired")
            .with_module("security")
            .with_operation("/users.v1.Users/Get");
        let response = render_error(&error, Transport::Http, Some("req-7"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()["x-request-id"], "req-7");

        let decoded = error_from_response(response).await.unwrap_err();
        assert_eq!(decoded.kind(), ErrorKind::Authentication);
        assert_eq!(decoded.reason(), reasons::UNAUTHENTICATED);
        assert_eq!(decoded.module(), "security");
        assert!(decoded.is(&error));
    }

    #[tokio::test]
    async fn test_grpc_round_trip() {
        let error = Error::authorization("denied: 100% sure").with_module("security");
        let response = render_error(&error, Transport::Grpc, None);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[GRPC_STATUS], "7");

        let decoded = error_from_response(response).await.unwrap_err();
        assert_eq!(decoded.kind(), ErrorKind::Authorization);
        assert_eq!(decoded.message(), "denied: 100% sure");
        assert_eq!(decoded.reason(), reasons::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_plain_error_body() {
        let response = http::Response::builder()
            .status(StatusCode::BAD_GATEWAY)
            .body(Full::new(Bytes::from_static(b"upstream down")))
            .unwrap();
        let decoded = error_from_response(response).await.unwrap_err();
        assert_eq!(decoded.kind(), ErrorKind::Unavailable);
        assert_eq!(decoded.message(), "upstream down");
        assert_eq!(decoded.metadata()["http_status"], "502");
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let response = http::Response::new(Full::new(Bytes::from_static(b"ok")));
        assert!(error_from_response(response).await.is_ok());
    }
}
