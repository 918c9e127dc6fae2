//! Request validation (server side only).
//!
//! Rejects requests whose body is larger than `max_body_bytes` or whose
//! `content-type` is outside the allow-list. Requests without a body skip the
//! content-type check.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request};
use harbor_config::MiddlewareEntry;
use harbor_core::{Error, HarborResult, Options};
use http::header;
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use std::sync::Arc;

/// Reason for bodies over the size limit.
pub const BODY_TOO_LARGE: &str = "BODY_TOO_LARGE";

/// Reason for disallowed content types.
pub const UNSUPPORTED_CONTENT_TYPE: &str = "UNSUPPORTED_CONTENT_TYPE";

/// `validator` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorSettings {
    /// Allowed media types, compared without parameters. Empty allows any.
    pub content_types: Vec<String>,
    /// Maximum body size. `0` disables the check.
    pub max_body_bytes: u64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            content_types: Vec::new(),
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Validates request shape before the handler runs.
#[derive(Debug, Clone)]
pub struct ValidatorMiddleware {
    content_types: Vec<String>,
    max_body_bytes: u64,
}

impl ValidatorMiddleware {
    /// Creates the middleware from settings.
    #[must_use]
    pub fn new(settings: &ValidatorSettings) -> Self {
        Self {
            content_types: settings
                .content_types
                .iter()
                .map(|c| c.trim().to_ascii_lowercase())
                .collect(),
            max_body_bytes: settings.max_body_bytes,
        }
    }

    fn check(&self, headers: &http::HeaderMap, size: u64) -> HarborResult<()> {
        if self.max_body_bytes > 0 && size > self.max_body_bytes {
            return Err(Error::validation("request body too large")
                .with_module("validator")
                .with_reason(BODY_TOO_LARGE)
                .with_metadata("limit", self.max_body_bytes.to_string())
                .with_metadata("size", size.to_string()));
        }

        if self.content_types.is_empty() || size == 0 {
            return Ok(());
        }
        let media_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        if self.content_types.iter().any(|c| *c == media_type) {
            Ok(())
        } else {
            Err(Error::validation(format!(
                "content type '{media_type}' is not accepted"
            ))
            .with_module("validator")
            .with_reason(UNSUPPORTED_CONTENT_TYPE))
        }
    }
}

impl Middleware for ValidatorMiddleware {
    fn name(&self) -> &str {
        "validator"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let (parts, body) = request.into_parts();
            let bytes = match body.collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(never) => match never {},
            };
            if let Err(err) = self.check(&parts.headers, bytes.len() as u64) {
                tracing::debug!(
                    operation = %ctx.operation(),
                    reason = err.reason(),
                    "request rejected by validator"
                );
                return Err(err.with_operation(ctx.operation()));
            }
            next.run(ctx, Request::from_parts(parts, Full::new(bytes)))
                .await
        })
    }
}

/// Factory for `validator`. There is no client-side form.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatorFactory;

impl MiddlewareFactory for ValidatorFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: ValidatorSettings = entry.settings()?;
        Ok(Some(Arc::new(ValidatorMiddleware::new(&settings))))
    }
}
