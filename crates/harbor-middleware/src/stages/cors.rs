//! CORS (server side only).
//!
//! Answers preflight `OPTIONS` requests without reaching the handler and
//! decorates regular responses for allowed origins.
//!
//! ```toml
//! [[middlewares.configs]]
//! type = "cors"
//! allowed_origins = ["https://app.example.com"]
//! allow_credentials = true
//! ```

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request, Response, ResponseExt};
use harbor_config::MiddlewareEntry;
use harbor_core::{Error, HarborResult, Options};
use http::{HeaderValue, Method, StatusCode};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reason attached to rejected cross-origin requests.
pub const CORS_FORBIDDEN: &str = "CORS_FORBIDDEN";

/// CORS header names.
pub mod headers {
    /// `Access-Control-Allow-Origin` header.
    pub const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    /// `Access-Control-Allow-Methods` header.
    pub const ALLOW_METHODS: &str = "access-control-allow-methods";
    /// `Access-Control-Allow-Headers` header.
    pub const ALLOW_HEADERS: &str = "access-control-allow-headers";
    /// `Access-Control-Allow-Credentials` header.
    pub const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";
    /// `Access-Control-Max-Age` header.
    pub const MAX_AGE: &str = "access-control-max-age";
    /// `Access-Control-Expose-Headers` header.
    pub const EXPOSE_HEADERS: &str = "access-control-expose-headers";
    /// `Access-Control-Request-Method` header (preflight).
    pub const REQUEST_METHOD: &str = "access-control-request-method";
    /// `Access-Control-Request-Headers` header (preflight).
    pub const REQUEST_HEADERS: &str = "access-control-request-headers";
    /// `Origin` header.
    pub const ORIGIN: &str = "origin";
    /// `Vary` header.
    pub const VARY: &str = "vary";
}

/// `cors` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsSettings {
    /// Allowed origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    pub allowed_methods: Vec<String>,
    /// Allowed request headers; `"*"` allows any.
    pub allowed_headers: Vec<String>,
    /// Headers exposed to scripts.
    pub expose_headers: Vec<String>,
    /// Whether credentials are allowed.
    pub allow_credentials: bool,
    /// Preflight cache duration in seconds.
    pub max_age_secs: Option<u64>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            allowed_methods: ["GET", "HEAD", "POST", "PUT", "DELETE", "PATCH"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["content-type", "authorization", "x-request-id"]
                .map(String::from)
                .to_vec(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_secs: Some(86_400),
        }
    }
}

/// The set of allowed origins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedOrigins {
    /// Any origin (`*`).
    Any,
    /// Specific origins.
    List(BTreeSet<String>),
}

impl AllowedOrigins {
    /// Checks if an origin is allowed.
    #[must_use]
    pub fn is_allowed(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::List(origins) => origins.contains(origin),
        }
    }

    /// Returns the `Access-Control-Allow-Origin` value for `origin`.
    #[must_use]
    pub fn header_value(&self, origin: &str) -> Option<HeaderValue> {
        match self {
            Self::Any => Some(HeaderValue::from_static("*")),
            Self::List(origins) if origins.contains(origin) => HeaderValue::from_str(origin).ok(),
            Self::List(_) => None,
        }
    }
}

/// CORS middleware.
#[derive(Debug, Clone)]
pub struct CorsMiddleware {
    origins: AllowedOrigins,
    methods: BTreeSet<String>,
    allowed_headers: BTreeSet<String>,
    expose_headers: BTreeSet<String>,
    allow_credentials: bool,
    max_age_secs: Option<u64>,
}

impl CorsMiddleware {
    /// Creates the middleware from settings.
    pub fn from_settings(settings: &CorsSettings) -> HarborResult<Self> {
        let origins = if settings.allowed_origins.iter().any(|o| o == "*") {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(settings.allowed_origins.iter().cloned().collect())
        };
        if settings.allow_credentials && origins == AllowedOrigins::Any {
            return Err(Error::validation(
                "cors cannot allow credentials for any origin",
            ));
        }

        let mut methods = BTreeSet::new();
        for method in &settings.allowed_methods {
            let parsed = method
                .to_ascii_uppercase()
                .parse::<Method>()
                .map_err(|_| Error::validation(format!("invalid cors method '{method}'")))?;
            methods.insert(parsed.as_str().to_string());
        }

        let lower = |list: &[String]| list.iter().map(|h| h.to_ascii_lowercase()).collect();
        Ok(Self {
            origins,
            methods,
            allowed_headers: lower(&settings.allowed_headers),
            expose_headers: lower(&settings.expose_headers),
            allow_credentials: settings.allow_credentials,
            max_age_secs: settings.max_age_secs,
        })
    }

    fn is_preflight(request: &Request) -> bool {
        request.method() == Method::OPTIONS
            && request.headers().contains_key(headers::ORIGIN)
            && request.headers().contains_key(headers::REQUEST_METHOD)
    }

    fn origin(request: &Request) -> Option<&str> {
        request
            .headers()
            .get(headers::ORIGIN)
            .and_then(|v| v.to_str().ok())
    }

    fn forbidden(message: impl Into<String>) -> Error {
        Error::authorization(message)
            .with_module("cors")
            .with_reason(CORS_FORBIDDEN)
    }

    fn handle_preflight(&self, request: &Request) -> MiddlewareResult {
        let origin = Self::origin(request).ok_or_else(|| Self::forbidden("missing origin"))?;
        if !self.origins.is_allowed(origin) {
            return Err(Self::forbidden("origin not allowed"));
        }

        let requested_method = request
            .headers()
            .get(headers::REQUEST_METHOD)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_uppercase();
        if !self.methods.contains(&requested_method) {
            return Err(Self::forbidden("method not allowed"));
        }

        if !self.allowed_headers.contains("*") {
            let requested = request
                .headers()
                .get(headers::REQUEST_HEADERS)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            for header in requested
                .split(',')
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
            {
                if !self.allowed_headers.contains(&header) {
                    return Err(Self::forbidden(format!("header '{header}' not allowed")));
                }
            }
        }

        Ok(self.preflight_response(origin))
    }

    fn preflight_response(&self, origin: &str) -> Response {
        let mut response = Response::empty(StatusCode::NO_CONTENT);
        let h = response.headers_mut();
        if let Some(value) = self.origins.header_value(origin) {
            h.insert(headers::ALLOW_ORIGIN, value);
        }
        if let Some(value) = join_header(&self.methods) {
            h.insert(headers::ALLOW_METHODS, value);
        }
        if let Some(value) = join_header(&self.allowed_headers) {
            h.insert(headers::ALLOW_HEADERS, value);
        }
        if self.allow_credentials {
            h.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(max_age) = self.max_age_secs {
            h.insert(headers::MAX_AGE, HeaderValue::from(max_age));
        }
        h.insert(
            headers::VARY,
            HeaderValue::from_static(
                "Origin, Access-Control-Request-Method, Access-Control-Request-Headers",
            ),
        );
        response
    }

    fn add_cors_headers(&self, response: &mut Response, origin: &str) {
        let h = response.headers_mut();
        if let Some(value) = self.origins.header_value(origin) {
            h.insert(headers::ALLOW_ORIGIN, value);
        }
        if self.allow_credentials {
            h.insert(headers::ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
        }
        if let Some(value) = join_header(&self.expose_headers) {
            h.insert(headers::EXPOSE_HEADERS, value);
        }
        h.insert(headers::VARY, HeaderValue::from_static("Origin"));
    }
}

fn join_header(values: &BTreeSet<String>) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    let joined = values.iter().map(String::as_str).collect::<Vec<_>>().join(", ");
    HeaderValue::from_str(&joined).ok()
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &str {
        "cors"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if Self::is_preflight(&request) {
                return self.handle_preflight(&request);
            }

            let origin = Self::origin(&request).map(String::from);
            let mut response = next.run(ctx, request).await?;
            if let Some(origin) = origin.filter(|o| self.origins.is_allowed(o)) {
                self.add_cors_headers(&mut response, &origin);
            }
            Ok(response)
        })
    }
}

/// Factory for `cors`. There is no client-side form.
#[derive(Debug, Clone, Copy, Default)]
pub struct CorsFactory;

impl MiddlewareFactory for CorsFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: CorsSettings = entry.settings()?;
        Ok(Some(Arc::new(CorsMiddleware::from_settings(&settings)?)))
    }
}
