//! Transport-agnostic view of an inbound request.
//!
//! Security code never touches HTTP headers or gRPC metadata directly. It
//! reads through a [`RequestSource`], which reports the transport kind, the
//! canonical operation and case-insensitive header / metadata values.

use harbor_middleware::context::MiddlewareContext;
use harbor_middleware::{Request, Transport};
use http::HeaderMap;
use std::collections::BTreeMap;
use std::fmt;

/// Transport kind of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Plain HTTP.
    Http,
    /// gRPC.
    Grpc,
}

impl RequestKind {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Grpc => "grpc",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read access to the security-relevant parts of a request.
pub trait RequestSource: Send + Sync {
    /// Transport kind.
    fn kind(&self) -> RequestKind;

    /// Canonical operation id: the full RPC method for gRPC, the
    /// gRPC-equivalent name for gateway-fronted HTTP, the raw path otherwise.
    fn operation(&self) -> &str;

    /// HTTP verb, when there is one.
    fn method(&self) -> Option<&str> {
        None
    }

    /// Matched route template, when known.
    fn route_template(&self) -> Option<&str> {
        None
    }

    /// First value for `key`.
    fn get(&self, key: &str) -> Option<&str>;

    /// Every value for `key`.
    fn values(&self, key: &str) -> Vec<&str>;

    /// Every key with its values. Keys are lowercase.
    fn get_all(&self) -> BTreeMap<String, Vec<String>>;
}

fn header_values<'h>(headers: &'h HeaderMap, key: &str) -> Vec<&'h str> {
    headers
        .get_all(key)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect()
}

fn header_snapshot(headers: &HeaderMap, skip: impl Fn(&str) -> bool) -> BTreeMap<String, Vec<String>> {
    let mut all: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        if skip(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            all.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    all
}

/// Adapter over HTTP request headers.
#[derive(Debug, Clone)]
pub struct HttpSource<'a> {
    headers: &'a HeaderMap,
    operation: String,
    method: String,
    route_template: Option<String>,
}

impl<'a> HttpSource<'a> {
    /// Creates the adapter.
    #[must_use]
    pub fn new(headers: &'a HeaderMap, operation: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            headers,
            operation: operation.into(),
            method: method.into(),
            route_template: None,
        }
    }

    /// Sets the matched route template.
    #[must_use]
    pub fn with_route_template(mut self, template: impl Into<String>) -> Self {
        self.route_template = Some(template.into());
        self
    }
}

impl RequestSource for HttpSource<'_> {
    fn kind(&self) -> RequestKind {
        RequestKind::Http
    }

    fn operation(&self) -> &str {
        &self.operation
    }

    fn method(&self) -> Option<&str> {
        Some(&self.method)
    }

    fn route_template(&self) -> Option<&str> {
        self.route_template.as_deref()
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(key).and_then(|v| v.to_str().ok())
    }

    fn values(&self, key: &str) -> Vec<&str> {
        header_values(self.headers, key)
    }

    fn get_all(&self) -> BTreeMap<String, Vec<String>> {
        header_snapshot(self.headers, |_| false)
    }
}

/// Adapter over gRPC metadata carried in HTTP/2 headers.
///
/// Reserved `grpc-*` keys and pseudo transport headers are hidden from
/// [`get_all`](RequestSource::get_all).
#[derive(Debug, Clone)]
pub struct GrpcSource<'a> {
    metadata: &'a HeaderMap,
    operation: String,
}

impl<'a> GrpcSource<'a> {
    /// Creates the adapter for the full RPC method `operation`.
    #[must_use]
    pub fn new(metadata: &'a HeaderMap, operation: impl Into<String>) -> Self {
        Self {
            metadata,
            operation: operation.into(),
        }
    }
}

impl RequestSource for GrpcSource<'_> {
    fn kind(&self) -> RequestKind {
        RequestKind::Grpc
    }

    fn operation(&self) -> &str {
        &self.operation
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.to_str().ok())
    }

    fn values(&self, key: &str) -> Vec<&str> {
        header_values(self.metadata, key)
    }

    fn get_all(&self) -> BTreeMap<String, Vec<String>> {
        header_snapshot(self.metadata, |name| {
            name.starts_with("grpc-") || name == "content-type" || name == "te"
        })
    }
}

/// Owned metadata map, for transports that hand over plain key/value lists.
#[derive(Debug, Clone)]
pub struct MetadataSource {
    kind: RequestKind,
    operation: String,
    metadata: BTreeMap<String, Vec<String>>,
}

impl MetadataSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new(kind: RequestKind, operation: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// Appends a value; the key is lowercased.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata
            .entry(key.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }
}

impl RequestSource for MetadataSource {
    fn kind(&self) -> RequestKind {
        self.kind
    }

    fn operation(&self) -> &str {
        &self.operation
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(&key.to_ascii_lowercase())
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    fn values(&self, key: &str) -> Vec<&str> {
        self.metadata
            .get(&key.to_ascii_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn get_all(&self) -> BTreeMap<String, Vec<String>> {
        self.metadata.clone()
    }
}

/// Builds the source for a request flowing through a middleware chain.
///
/// The operation comes from the context, which the transport fills in with
/// its canonical name.
#[must_use]
pub fn request_source<'a>(
    ctx: &MiddlewareContext,
    request: &'a Request,
) -> Box<dyn RequestSource + 'a> {
    match Transport::detect(request.headers()) {
        Transport::Grpc => Box::new(GrpcSource::new(request.headers(), ctx.operation())),
        Transport::Http => {
            let source = HttpSource::new(
                request.headers(),
                ctx.operation(),
                request.method().as_str(),
            );
            Box::new(match ctx.route_template() {
                Some(template) => source.with_route_template(template),
                None => source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::Full;

    #[test]
    fn test_http_source_reads_headers_case_insensitively() {
        let request = http::Request::builder()
            .method("GET")
            .uri("/users/42")
            .header("Authorization", "Bearer t")
            .header("x-tag", "a")
            .header("x-tag", "b")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let ctx = MiddlewareContext::server("/users.v1.Users/Get").with_route_template("/users/{id}");
        let source = request_source(&ctx, &request);

        assert_eq!(source.kind(), RequestKind::Http);
        assert_eq!(source.operation(), "/users.v1.Users/Get");
        assert_eq!(source.method(), Some("GET"));
        assert_eq!(source.route_template(), Some("/users/{id}"));
        assert_eq!(source.get("authorization"), Some("Bearer t"));
        assert_eq!(source.values("X-Tag"), vec!["a", "b"]);
        assert_eq!(source.get_all()["x-tag"], vec!["a", "b"]);
    }

    #[test]
    fn test_grpc_source_hides_reserved_keys() {
        let request = http::Request::builder()
            .method("POST")
            .uri("/users.v1.Users/Get")
            .header("content-type", "application/grpc")
            .header("grpc-timeout", "1S")
            .header("x-api-key", "k")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let ctx = MiddlewareContext::server("/users.v1.Users/Get");
        let source = request_source(&ctx, &request);

        assert_eq!(source.kind(), RequestKind::Grpc);
        assert_eq!(source.method(), None);
        assert_eq!(source.get("grpc-timeout"), Some("1S"));
        let all = source.get_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all["x-api-key"], vec!["k"]);
    }

    #[test]
    fn test_metadata_source() {
        let source = MetadataSource::new(RequestKind::Grpc, "/a.B/C")
            .with("Authorization", "Bearer x")
            .with("x-md-a", "1");
        assert_eq!(source.get("AUTHORIZATION"), Some("Bearer x"));
        assert!(source.values("missing").is_empty());
        assert_eq!(source.kind().to_string(), "grpc");
    }
}
