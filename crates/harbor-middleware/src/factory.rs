//! Middleware factories.
//!
//! A factory turns one [`MiddlewareEntry`] into at most one server-side and
//! at most one client-side middleware. `Ok(None)` means the type has no form
//! for that side and is not an error.

use crate::middleware::BoxedMiddleware;
use harbor_config::MiddlewareEntry;
use harbor_core::{HarborResult, Options};
use std::fmt;
use std::sync::Arc;

/// Builds middlewares from configuration entries.
pub trait MiddlewareFactory: Send + Sync + 'static {
    /// Builds the server-side middleware for `entry`, if this type has one.
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let _ = (entry, opts);
        Ok(None)
    }

    /// Builds the client-side middleware for `entry`, if this type has one.
    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let _ = (entry, opts);
        Ok(None)
    }
}

/// A shared factory, as stored in the builder's registry.
pub type SharedMiddlewareFactory = Arc<dyn MiddlewareFactory>;

type BuildFn = Arc<dyn Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync>;

/// A factory assembled from closures, one per side.
///
/// # Example
///
/// ```ignore
/// let factory = FnFactory::server(|entry, _opts| {
///     Ok(Arc::new(AuditMiddleware::new(entry.identity())) as BoxedMiddleware)
/// });
/// builder.register("audit", factory);
/// ```
#[derive(Clone, Default)]
pub struct FnFactory {
    server: Option<BuildFn>,
    client: Option<BuildFn>,
}

impl FnFactory {
    /// A factory with a server side only.
    pub fn server<F>(f: F) -> Self
    where
        F: Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync + 'static,
    {
        Self::default().with_server(f)
    }

    /// A factory with a client side only.
    pub fn client<F>(f: F) -> Self
    where
        F: Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync + 'static,
    {
        Self::default().with_client(f)
    }

    /// A factory that uses the same constructor for both sides.
    pub fn symmetric<F>(f: F) -> Self
    where
        F: Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync + 'static,
    {
        let f: BuildFn = Arc::new(f);
        Self {
            server: Some(Arc::clone(&f)),
            client: Some(f),
        }
    }

    /// Sets the server-side constructor.
    #[must_use]
    pub fn with_server<F>(mut self, f: F) -> Self
    where
        F: Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync + 'static,
    {
        self.server = Some(Arc::new(f));
        self
    }

    /// Sets the client-side constructor.
    #[must_use]
    pub fn with_client<F>(mut self, f: F) -> Self
    where
        F: Fn(&MiddlewareEntry, &Options) -> HarborResult<BoxedMiddleware> + Send + Sync + 'static,
    {
        self.client = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for FnFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("server", &self.server.is_some())
            .field("client", &self.client.is_some())
            .finish()
    }
}

impl MiddlewareFactory for FnFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        self.server.as_ref().map(|f| f(entry, opts)).transpose()
    }

    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        self.client.as_ref().map(|f| f(entry, opts)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::FnMiddleware;

    fn passthrough(entry: &MiddlewareEntry, _opts: &Options) -> HarborResult<BoxedMiddleware> {
        Ok(Arc::new(FnMiddleware::new(entry.kind.clone(), |ctx, req, next| {
            Box::pin(next.run(ctx, req))
        })))
    }

    #[test]
    fn test_server_only_factory() {
        let factory = FnFactory::server(passthrough);
        let entry = MiddlewareEntry::new("", "audit");
        let opts = Options::new();

        assert!(factory.new_server(&entry, &opts).unwrap().is_some());
        assert!(factory.new_client(&entry, &opts).unwrap().is_none());
    }

    #[test]
    fn test_symmetric_factory() {
        let factory = FnFactory::symmetric(passthrough);
        let entry = MiddlewareEntry::new("", "audit");
        let opts = Options::new();

        let server = factory.new_server(&entry, &opts).unwrap().unwrap();
        let client = factory.new_client(&entry, &opts).unwrap().unwrap();
        assert_eq!(server.name(), "audit");
        assert_eq!(client.name(), "audit");
    }

    #[test]
    fn test_default_trait_methods_produce_nothing() {
        struct Inert;
        impl MiddlewareFactory for Inert {}

        let entry = MiddlewareEntry::new("x", "inert");
        assert!(Inert.new_server(&entry, &Options::new()).unwrap().is_none());
        assert!(Inert.new_client(&entry, &Options::new()).unwrap().is_none());
    }
}
