//! Metadata propagation.
//!
//! Headers under the `x-md-` prefix are business metadata that travels
//! across service hops. On the server side they are copied into a
//! [`Metadata`] context extension; on the client side the extension (plus
//! any constants from the entry) is written back onto the outgoing request.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request, Side};
use harbor_config::MiddlewareEntry;
use harbor_core::{HarborResult, Options};
use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default propagated header prefix.
pub const DEFAULT_PREFIX: &str = "x-md-";

/// Propagated metadata carried in the middleware context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Creates empty metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Sets a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Iterates key/value pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there is no metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// `metadata` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetadataSettings {
    /// Header prefix to propagate.
    pub prefix: String,
    /// Constant metadata attached to every outgoing call.
    pub constants: BTreeMap<String, String>,
}

impl Default for MetadataSettings {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            constants: BTreeMap::new(),
        }
    }
}

/// Propagates `x-md-*` headers.
#[derive(Debug, Clone)]
pub struct MetadataMiddleware {
    side: Side,
    settings: MetadataSettings,
}

impl MetadataMiddleware {
    /// Creates the middleware for `side`.
    #[must_use]
    pub fn new(side: Side, mut settings: MetadataSettings) -> Self {
        settings.prefix = settings.prefix.to_ascii_lowercase();
        Self { side, settings }
    }

    fn extract(&self, ctx: &mut MiddlewareContext, request: &Request) {
        let mut metadata = ctx.remove_extension::<Metadata>().unwrap_or_default();
        for (name, value) in request.headers() {
            if name.as_str().starts_with(&self.settings.prefix) {
                if let Ok(value) = value.to_str() {
                    metadata.insert(name.as_str(), value);
                }
            }
        }
        ctx.set_extension(metadata);
    }

    fn inject(&self, ctx: &MiddlewareContext, request: &mut Request) {
        let carried = ctx.get_extension::<Metadata>();
        let pairs = self
            .settings
            .constants
            .iter()
            .map(|(k, v)| (self.header_key(k), v.as_str()))
            .chain(
                carried
                    .into_iter()
                    .flat_map(Metadata::iter)
                    .map(|(k, v)| (self.header_key(k), v)),
            );

        for (key, value) in pairs {
            let name = HeaderName::from_bytes(key.as_bytes());
            let value = HeaderValue::from_str(value);
            if let (Ok(name), Ok(value)) = (name, value) {
                request.headers_mut().insert(name, value);
            }
        }
    }

    fn header_key(&self, key: &str) -> String {
        let key = key.to_ascii_lowercase();
        if key.starts_with(&self.settings.prefix) {
            key
        } else {
            format!("{}{key}", self.settings.prefix)
        }
    }
}

impl Middleware for MetadataMiddleware {
    fn name(&self) -> &str {
        "metadata"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            match self.side {
                Side::Server => self.extract(ctx, &request),
                Side::Client => self.inject(ctx, &mut request),
            }
            next.run(ctx, request).await
        })
    }
}

/// Factory for `metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataFactory;

impl MiddlewareFactory for MetadataFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Ok(Some(Arc::new(MetadataMiddleware::new(
            Side::Server,
            entry.settings()?,
        ))))
    }

    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Ok(Some(Arc::new(MetadataMiddleware::new(
            Side::Client,
            entry.settings()?,
        ))))
    }
}
