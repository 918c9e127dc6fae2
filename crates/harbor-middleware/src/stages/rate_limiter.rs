//! Rate limiting (server side only).
//!
//! Uses a sliding window: the previous window's count is weighted by how
//! much of the current window is still ahead, which smooths the burst a
//! fixed window allows at its boundary.
//!
//! Limited requests get a `429` (or gRPC `RESOURCE_EXHAUSTED`) with
//! `retry-after`; every response carries the `x-ratelimit-*` headers.
//!
//! ```toml
//! [[middlewares.configs]]
//! type = "rate_limiter"
//! limit = 100
//! window_ms = 60000
//! key = "header:x-api-key"
//! ```

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::render::{render_error, Transport};
use crate::types::{MiddlewareResult, Request, Response};
use harbor_config::{ConfigEntry, MiddlewareEntry};
use harbor_core::{Error, HarborResult, Options};
use harbor_telemetry::metrics::record_rate_limited;
use http::HeaderValue;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Unix timestamp when the window resets.
    pub const RESET: &str = "x-ratelimit-reset";
    /// Seconds until the window resets.
    pub const RESET_AFTER: &str = "x-ratelimit-reset-after";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// How to derive the bucket key from a request.
#[derive(Clone, Default)]
pub enum KeyExtractor {
    /// Client IP from `x-forwarded-for` / `x-real-ip`.
    #[default]
    Ip,
    /// A header value. Requests without it are not limited.
    Header(String),
    /// The logical operation.
    Operation,
    /// A custom function.
    Custom(Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>),
    /// One bucket for everything.
    Global,
}

impl KeyExtractor {
    /// Parses `ip`, `operation`, `global` or `header:<name>`.
    pub fn parse(key: &str) -> HarborResult<Self> {
        match key {
            "" | "ip" => Ok(Self::Ip),
            "operation" => Ok(Self::Operation),
            "global" => Ok(Self::Global),
            other => match other.strip_prefix("header:") {
                Some(name) if !name.is_empty() => Ok(Self::Header(name.to_ascii_lowercase())),
                _ => Err(Error::validation(format!("unknown rate limit key '{other}'"))),
            },
        }
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip => write!(f, "KeyExtractor::Ip"),
            Self::Header(h) => f.debug_tuple("KeyExtractor::Header").field(h).finish(),
            Self::Operation => write!(f, "KeyExtractor::Operation"),
            Self::Custom(_) => write!(f, "KeyExtractor::Custom(<fn>)"),
            Self::Global => write!(f, "KeyExtractor::Global"),
        }
    }
}

/// `rate_limiter` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per window.
    pub limit: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Bucket key, see [`KeyExtractor::parse`].
    pub key: String,
    /// Message returned to limited callers.
    pub message: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 60_000,
            key: "ip".to_string(),
            message: "Too many requests. Please try again later.".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct RateLimitStore {
    windows: HashMap<String, WindowData>,
    last_sweep: Option<Instant>,
}

impl RateLimitStore {
    /// Drops keys idle for two windows or more, at most once per window.
    /// Such keys no longer weigh on any decision.
    fn sweep(&mut self, now: Instant, window: Duration) -> usize {
        if self
            .last_sweep
            .is_some_and(|last| now.duration_since(last) < window)
        {
            return 0;
        }
        self.last_sweep = Some(now);
        let before = self.windows.len();
        self.windows
            .retain(|_, data| now.duration_since(data.window_start) < window * 2);
        before - self.windows.len()
    }
}

#[derive(Debug, Clone)]
struct WindowData {
    count: u64,
    window_start: Instant,
    prev_count: u64,
}

#[derive(Debug, Clone, Copy)]
enum Decision {
    Allowed {
        limit: u64,
        remaining: u64,
        reset_in: Duration,
    },
    Limited {
        limit: u64,
        reset_in: Duration,
    },
}

/// Sliding-window rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    name: String,
    limit: u64,
    window: Duration,
    key_extractor: KeyExtractor,
    message: String,
    store: Arc<Mutex<RateLimitStore>>,
}

impl RateLimitMiddleware {
    /// Creates a limiter allowing `limit` requests per `window`.
    #[must_use]
    pub fn new(name: impl Into<String>, limit: u64, window: Duration) -> Self {
        Self {
            name: name.into(),
            limit,
            window,
            key_extractor: KeyExtractor::default(),
            message: RateLimitSettings::default().message,
            store: Arc::new(Mutex::new(RateLimitStore::default())),
        }
    }

    /// Builds a limiter from entry settings.
    pub fn from_settings(name: impl Into<String>, settings: &RateLimitSettings) -> HarborResult<Self> {
        if settings.limit == 0 || settings.window_ms == 0 {
            return Err(Error::validation("rate limiter needs a non-zero limit and window"));
        }
        Ok(Self::new(name, settings.limit, Duration::from_millis(settings.window_ms))
            .with_key_extractor(KeyExtractor::parse(&settings.key)?)
            .with_message(settings.message.clone()))
    }

    /// Sets the key extractor.
    #[must_use]
    pub fn with_key_extractor(mut self, key_extractor: KeyExtractor) -> Self {
        self.key_extractor = key_extractor;
        self
    }

    /// Sets the message returned to limited callers.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    fn extract_key(&self, request: &Request, ctx: &MiddlewareContext) -> Option<String> {
        match &self.key_extractor {
            KeyExtractor::Ip => {
                if let Some(xff) = request.headers().get("x-forwarded-for") {
                    if let Ok(value) = xff.to_str() {
                        return Some(value.split(',').next()?.trim().to_string());
                    }
                }
                if let Some(real_ip) = request.headers().get("x-real-ip") {
                    if let Ok(value) = real_ip.to_str() {
                        return Some(value.to_string());
                    }
                }
                Some("unknown-ip".to_string())
            }
            KeyExtractor::Header(name) => request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            KeyExtractor::Operation => Some(ctx.operation().to_string()),
            KeyExtractor::Custom(f) => f(request),
            KeyExtractor::Global => Some("global".to_string()),
        }
    }

    #[allow(clippy::significant_drop_tightening)]
    async fn check(&self, key: &str) -> Decision {
        let mut store = self.store.lock().await;
        let now = Instant::now();
        let window = self.window;
        let limit = self.limit;

        let swept = store.sweep(now, window);
        if swept > 0 {
            tracing::trace!(middleware = %self.name, swept, "idle rate limit keys dropped");
        }

        let data = store
            .windows
            .entry(key.to_string())
            .or_insert_with(|| WindowData {
                count: 0,
                window_start: now,
                prev_count: 0,
            });

        let elapsed = now.duration_since(data.window_start);
        if elapsed >= window {
            data.prev_count = if elapsed >= window * 2 { 0 } else { data.count };
            data.count = 0;
            data.window_start = now;
        }

        let progress = now.duration_since(data.window_start).as_secs_f64() / window.as_secs_f64();
        let prev_weight = (1.0 - progress).max(0.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let weighted = data.count + (data.prev_count as f64 * prev_weight) as u64;
        let reset_in = window.saturating_sub(now.duration_since(data.window_start));

        if weighted >= limit {
            Decision::Limited { limit, reset_in }
        } else {
            data.count += 1;
            Decision::Allowed {
                limit,
                remaining: limit.saturating_sub(weighted + 1),
                reset_in,
            }
        }
    }

    fn limited_response(&self, ctx: &MiddlewareContext, transport: Transport, limit: u64, reset_in: Duration) -> Response {
        let retry_after = reset_in.as_secs().max(1);
        let error = Error::rate_limited(self.message.clone())
            .with_module("middleware")
            .with_operation(ctx.operation())
            .with_metadata("retry_after_secs", retry_after.to_string());
        let mut response = render_error(&error, transport, Some(ctx.request_id()));
        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(limit));
        headers.insert(headers::REMAINING, HeaderValue::from(0u64));
        headers.insert(headers::RESET, HeaderValue::from(unix_now() + retry_after));
        headers.insert(headers::RESET_AFTER, HeaderValue::from(retry_after));
        headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }

    fn add_headers(mut response: Response, limit: u64, remaining: u64, reset_in: Duration) -> Response {
        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(limit));
        headers.insert(headers::REMAINING, HeaderValue::from(remaining));
        headers.insert(headers::RESET, HeaderValue::from(unix_now() + reset_in.as_secs()));
        response
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Middleware for RateLimitMiddleware {
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
            let Some(key) = self.extract_key(&request, ctx) else {
                return next.run(ctx, request).await;
            };

            match self.check(&key).await {
                Decision::Allowed {
                    limit,
                    remaining,
                    reset_in,
                } => {
                    let response = next.run(ctx, request).await?;
                    Ok(Self::add_headers(response, limit, remaining, reset_in))
                }
                Decision::Limited { limit, reset_in } => {
                    tracing::info!(
                        middleware = %self.name,
                        operation = %ctx.operation(),
                        key = %key,
                        "request rate limited"
                    );
                    record_rate_limited(&self.name);
                    let transport = Transport::detect(request.headers());
                    Ok(self.limited_response(ctx, transport, limit, reset_in))
                }
            }
        })
    }
}

/// Factory for `rate_limiter`. There is no client-side form.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimitFactory;

impl MiddlewareFactory for RateLimitFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: RateLimitSettings = entry.settings()?;
        Ok(Some(Arc::new(RateLimitMiddleware::from_settings(
            entry.identity(),
            &settings,
        )?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use bytes::Bytes;
    use http::{Method, StatusCode};
    use http_body_util::Full;
    use serde_json::json;

    fn create_test_request_with_ip(ip: &str) -> Request {
        http::Request::builder()
            .method(Method::GET)
            .uri("/api/test")
            .header("x-forwarded-for", ip)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn create_handler<'a>() -> Next<'a> {
        Next::handler(|_ctx, _req| Box::pin(async { Ok(Response::empty(StatusCode::OK)) }))
    }

    async fn call(mw: &RateLimitMiddleware, request: Request) -> Response {
        let mut ctx = MiddlewareContext::server("/api.v1.Api/Test");
        mw.process(&mut ctx, request, create_handler()).await.unwrap()
    }

    #[test]
    fn test_key_parsing() {
        assert!(matches!(KeyExtractor::parse("ip").unwrap(), KeyExtractor::Ip));
        assert!(matches!(
            KeyExtractor::parse("header:X-Api-Key").unwrap(),
            KeyExtractor::Header(ref h) if h == "x-api-key"
        ));
        assert!(KeyExtractor::parse("header:").is_err());
        assert!(KeyExtractor::parse("moon-phase").is_err());
    }

    #[test]
    fn test_factory_is_server_only() {
        let entry = MiddlewareEntry::new("", "rate_limiter").with_setting("limit", json!(5));
        let opts = Options::new();
        assert!(RateLimitFactory.new_server(&entry, &opts).unwrap().is_some());
        assert!(RateLimitFactory.new_client(&entry, &opts).unwrap().is_none());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let settings = RateLimitSettings {
            limit: 0,
            ..RateLimitSettings::default()
        };
        assert!(RateLimitMiddleware::from_settings("rl", &settings).is_err());
    }

    #[tokio::test]
    async fn test_allows_under_limit_with_headers() {
        let mw = RateLimitMiddleware::new("rl", 5, Duration::from_secs(60));
        let response = call(&mw, create_test_request_with_ip("10.0.0.1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[headers::LIMIT], "5");
        assert_eq!(response.headers()[headers::REMAINING], "4");
        assert!(response.headers().contains_key(headers::RESET));
    }

    #[tokio::test]
    async fn test_limits_over_limit() {
        let mw = RateLimitMiddleware::new("rl", 2, Duration::from_secs(60));
        for _ in 0..2 {
            let response = call(&mw, create_test_request_with_ip("10.0.0.2")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = call(&mw, create_test_request_with_ip("10.0.0.2")).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[headers::REMAINING], "0");
        assert!(response.headers().contains_key(headers::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let mw = RateLimitMiddleware::new("rl", 1, Duration::from_secs(60));
        assert_eq!(
            call(&mw, create_test_request_with_ip("10.0.0.3")).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            call(&mw, create_test_request_with_ip("10.0.0.4")).await.status(),
            StatusCode::OK
        );
        assert_eq!(
            call(&mw, create_test_request_with_ip("10.0.0.3")).await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_idle_keys_are_dropped() {
        let mw = RateLimitMiddleware::new("rl", 5, Duration::from_millis(20));
        call(&mw, create_test_request_with_ip("10.0.1.1")).await;
        call(&mw, create_test_request_with_ip("10.0.1.2")).await;
        assert_eq!(mw.store.lock().await.windows.len(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;
        call(&mw, create_test_request_with_ip("10.0.1.3")).await;

        let store = mw.store.lock().await;
        assert_eq!(store.windows.len(), 1);
        assert!(store.windows.contains_key("10.0.1.3"));
    }

    #[tokio::test]
    async fn test_missing_header_key_skips_limit() {
        let mw = RateLimitMiddleware::new("rl", 1, Duration::from_secs(60))
            .with_key_extractor(KeyExtractor::Header("x-api-key".to_string()));
        for _ in 0..3 {
            let response = call(&mw, create_test_request_with_ip("10.0.0.5")).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_grpc_limited_response() {
        let mw = RateLimitMiddleware::new("rl", 1, Duration::from_secs(60))
            .with_key_extractor(KeyExtractor::Global);
        let grpc = || {
            http::Request::builder()
                .header("content-type", "application/grpc")
                .body(Full::new(Bytes::new()))
                .unwrap()
        };
        call(&mw, grpc()).await;
        let response = call(&mw, grpc()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[crate::render::GRPC_STATUS], "8");
    }
}
