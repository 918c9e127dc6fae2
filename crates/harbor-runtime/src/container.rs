//! The component container.
//!
//! A [`Container`] holds one provider per domain. Providers are created up
//! front but receive their configuration group only when their accessor is
//! first called, so building a container never fails: a malformed section
//! surfaces from the accessor that needs it.
//!
//! ```text
//! StructuredConfig ──► caches()        ──► CacheProvider        ──► Cache
//!                  ──► databases()     ──► DatabaseProvider     ──► Database
//!                  ──► object_stores() ──► ObjectStoreProvider  ──► ObjectStore
//!                  ──► registries()    ──► RegistryProvider     ──► ServiceRegistry
//!                  ──► middlewares()   ──► MiddlewareProvider   ──► Chain
//!                  ──► components()    ──► ComponentProvider    ──► Any
//!                  ──► policy_provider() ──► PolicyProvider     ──► Policy
//! ```

use crate::cache::{self, CacheProvider, SharedCache};
use crate::component::{ComponentFactories, ComponentProvider};
use crate::database::{self, DatabaseProvider, SharedDatabase};
use crate::discovery::{RegistryProvider, SharedRegistry};
use crate::middleware::MiddlewareProvider;
use crate::object_store::{self, ObjectStoreProvider, SharedObjectStore};
use harbor_config::{
    paths, AppConfig, ClientEntry, ComponentGroup, EndpointGroup, LoggerConfig, SecurityConfig,
    ServerEntry, StructuredConfig,
};
use harbor_core::{Error, ErrorList, HarborResult, Opt, Options};
use harbor_middleware::MiddlewareBuilder;
use harbor_security::{PolicyProvider, SecurityFactory, SecuritySettings};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;
use tracing::{Instrument, Span};

struct Slot<P> {
    provider: P,
    configured: Mutex<bool>,
}

impl<P> Slot<P> {
    fn new(provider: P) -> Self {
        Self {
            provider,
            configured: Mutex::new(false),
        }
    }

    fn reset(&self) {
        *self.configured.lock() = false;
    }
}

/// Entry point to every configured component of a service.
pub struct Container {
    config: RwLock<StructuredConfig>,
    options: Options,
    span: Span,
    caches: Slot<CacheProvider>,
    databases: Slot<DatabaseProvider>,
    object_stores: Slot<ObjectStoreProvider>,
    registries: Slot<RegistryProvider>,
    middlewares: Slot<MiddlewareProvider>,
    components: Slot<ComponentProvider>,
    security: Slot<Arc<PolicyProvider>>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("caches", &self.caches.provider)
            .field("databases", &self.databases.provider)
            .field("object_stores", &self.object_stores.provider)
            .field("registries", &self.registries.provider)
            .field("middlewares", &self.middlewares.provider)
            .field("components", &self.components.provider)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Creates a container over `config`.
    ///
    /// Storage and registry drivers come from the process-wide registries;
    /// call [`register_defaults`](crate::register_defaults) first to get the
    /// built-in ones, or use [`with_defaults`](Self::with_defaults).
    #[must_use]
    pub fn new(config: StructuredConfig, factories: ComponentFactories, opts: &[Opt]) -> Self {
        let app: AppConfig = config.decode_or_default(paths::APP).unwrap_or_default();
        let span = tracing::info_span!(
            "harbor.container",
            app.id = %app.id,
            app.name = %app.name,
            app.version = %app.version,
        );

        Self {
            config: RwLock::new(config),
            options: Options::new().apply(opts),
            span,
            caches: Slot::new(cache::provider()),
            databases: Slot::new(database::provider()),
            object_stores: Slot::new(object_store::provider()),
            registries: Slot::new(RegistryProvider::default()),
            middlewares: Slot::new(MiddlewareProvider::new(Arc::new(
                MiddlewareBuilder::with_defaults(),
            ))),
            components: Slot::new(ComponentProvider::new(factories)),
            security: Slot::new(Arc::new(PolicyProvider::new())),
        }
    }

    /// Registers the built-in drivers, then creates the container.
    #[must_use]
    pub fn with_defaults(
        config: StructuredConfig,
        factories: ComponentFactories,
        opts: &[Opt],
    ) -> Self {
        crate::register_defaults();
        Self::new(config, factories, opts)
    }

    /// The option carrier handed to every factory.
    #[must_use]
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The `harbor.container` span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// A copy of the current configuration document.
    #[must_use]
    pub fn config(&self) -> StructuredConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration document.
    ///
    /// Every provider is reconfigured on its next access: config-derived
    /// instances are dropped, manually registered ones stay.
    pub fn reload(&self, config: StructuredConfig) {
        *self.config.write() = config;
        self.caches.reset();
        self.databases.reset();
        self.object_stores.reset();
        self.registries.reset();
        self.middlewares.reset();
        self.components.reset();
        self.security.reset();
        let _entered = self.span.enter();
        tracing::info!("configuration reloaded");
    }

    fn ensure<'a, P, G>(
        &self,
        slot: &'a Slot<P>,
        sources: &[&str],
        install: impl FnOnce(&P, G, Options) -> HarborResult<()>,
    ) -> HarborResult<&'a P>
    where
        G: DeserializeOwned + Default,
    {
        let mut configured = slot.configured.lock();
        if !*configured {
            let group: G = self
                .config
                .read()
                .decode_first(sources)
                .map_err(|e| Error::from(e).with_operation("configure"))?
                .unwrap_or_default();
            install(&slot.provider, group, self.options.clone())?;
            *configured = true;

            let _entered = self.span.enter();
            tracing::debug!(section = sources.first().copied().unwrap_or_default(), "section installed");
        }
        Ok(&slot.provider)
    }

    /// The cache provider (`data.caches`).
    pub fn caches(&self) -> HarborResult<&CacheProvider> {
        self.ensure(&self.caches, &[paths::CACHES], |p, g, o| {
            p.set_config(g, o);
            Ok(())
        })
    }

    /// The database provider (`data.databases`).
    pub fn databases(&self) -> HarborResult<&DatabaseProvider> {
        self.ensure(&self.databases, &[paths::DATABASES], |p, g, o| {
            p.set_config(g, o);
            Ok(())
        })
    }

    /// The object store provider (`data.object_stores`, or the older
    /// `data.filestores`).
    pub fn object_stores(&self) -> HarborResult<&ObjectStoreProvider> {
        self.ensure(
            &self.object_stores,
            &[paths::OBJECT_STORES, paths::FILESTORES],
            |p, g, o| {
                p.set_config(g, o);
                Ok(())
            },
        )
    }

    /// The service registry provider (`discoveries`).
    pub fn registries(&self) -> HarborResult<&RegistryProvider> {
        self.ensure(&self.registries, &[paths::DISCOVERIES], |p, g, o| {
            p.set_config(g, o);
            Ok(())
        })
    }

    /// The middleware provider (`middlewares`).
    pub fn middlewares(&self) -> HarborResult<&MiddlewareProvider> {
        self.ensure(&self.middlewares, &[paths::MIDDLEWARES], |p, g, o| {
            p.set_config(g, o);
            Ok(())
        })
    }

    /// The component provider (`components`).
    pub fn components(&self) -> HarborResult<&ComponentProvider> {
        self.ensure(&self.components, &[paths::COMPONENTS], |p, g, o| {
            p.set_config(g, o);
            Ok(())
        })
    }

    /// The policy provider, configured from `security`.
    pub fn policy_provider(&self) -> HarborResult<&Arc<PolicyProvider>> {
        self.ensure(
            &self.security,
            &[paths::SECURITY],
            |p: &Arc<PolicyProvider>, section: SecurityConfig, o| p.configure(&section, &o),
        )
    }

    /// Makes the `security` middleware type available to this container's
    /// chains, bound to [`policy_provider`](Self::policy_provider).
    pub fn register_security_middleware(&self) -> HarborResult<()> {
        let provider = Arc::clone(self.policy_provider()?);
        let section: SecurityConfig = self.section(paths::SECURITY)?;
        let factory = SecurityFactory::new(provider).with_defaults(SecuritySettings {
            default_policy: section.default_policy,
            trust_propagated_principal: section.trust_propagated_principal,
        });

        let middlewares = &self.middlewares.provider;
        middlewares
            .builder()
            .register(harbor_middleware::stages::kinds::SECURITY, factory);
        middlewares.invalidate();
        Ok(())
    }

    fn section<T: DeserializeOwned + Default>(&self, path: &str) -> HarborResult<T> {
        self.config
            .read()
            .decode_or_default(path)
            .map_err(Error::from)
    }

    /// The `app` section.
    pub fn app(&self) -> HarborResult<AppConfig> {
        self.section(paths::APP)
    }

    /// The `logger` section.
    pub fn logger(&self) -> HarborResult<LoggerConfig> {
        self.section(paths::LOGGER)
    }

    /// The `servers` section.
    pub fn servers(&self) -> HarborResult<EndpointGroup<ServerEntry>> {
        self.section(paths::SERVERS)
    }

    /// The `clients` section.
    pub fn clients(&self) -> HarborResult<EndpointGroup<ClientEntry>> {
        self.section(paths::CLIENTS)
    }

    /// Installs the global `tracing` subscriber from the `logger` section.
    pub fn init_logging(&self) -> HarborResult<()> {
        let logger = self.logger()?;
        harbor_telemetry::init_from_logger(&logger)
            .map_err(|e| Error::internal_with_source("logging setup failed", e).with_module("telemetry"))
    }

    /// The cache `name`.
    pub fn cache(&self, name: &str) -> HarborResult<SharedCache> {
        self.caches()?.get(name)
    }

    /// The default cache; `global` is the caller's fallback name.
    pub fn default_cache(&self, global: &str) -> HarborResult<SharedCache> {
        self.caches()?.default(global)
    }

    /// The database `name`.
    pub fn database(&self, name: &str) -> HarborResult<SharedDatabase> {
        self.databases()?.get(name)
    }

    /// The default database.
    pub fn default_database(&self, global: &str) -> HarborResult<SharedDatabase> {
        self.databases()?.default(global)
    }

    /// The object store `name`.
    pub fn object_store(&self, name: &str) -> HarborResult<SharedObjectStore> {
        self.object_stores()?.get(name)
    }

    /// The default object store.
    pub fn default_object_store(&self, global: &str) -> HarborResult<SharedObjectStore> {
        self.object_stores()?.default(global)
    }

    /// The default registrar.
    pub fn default_registrar(&self, global: &str) -> HarborResult<SharedRegistry> {
        self.registries()?.default_registrar(global)
    }

    /// The default discovery.
    pub fn default_discovery(&self, global: &str) -> HarborResult<SharedRegistry> {
        self.registries()?.default_discovery(global)
    }

    /// The component `name` as a `T`.
    pub fn component<T: Send + Sync + 'static>(&self, name: &str) -> HarborResult<Arc<T>> {
        self.components()?.get_as(name)
    }

    /// Closes every materialized instance.
    ///
    /// Domains close in reverse construction order (registries, object
    /// stores, databases, caches), and instances within a domain close
    /// newest first. A failing instance does not stop the others; all
    /// failures are returned together.
    pub async fn close(&self) -> HarborResult<()> {
        let span = self.span.clone();
        async {
            let mut errors = ErrorList::new();

            for (name, registry) in self.registries.provider.provider().drain() {
                track(&mut errors, "registry", &name, registry.close().await);
            }
            for (name, store) in self.object_stores.provider.drain() {
                track(&mut errors, "object_store", &name, store.close().await);
            }
            for (name, db) in self.databases.provider.drain() {
                track(&mut errors, "database", &name, db.close().await);
            }
            for (name, cache) in self.caches.provider.drain() {
                track(&mut errors, "cache", &name, cache.close().await);
            }

            if errors.is_empty() {
                tracing::info!("container closed");
                Ok(())
            } else {
                tracing::warn!(failures = errors.len(), "container closed with errors");
                Err(Error::from(errors).with_operation("close"))
            }
        }
        .instrument(span)
        .await
    }
}

fn track(errors: &mut ErrorList, domain: &str, name: &str, result: HarborResult<()>) {
    match result {
        Ok(()) => tracing::debug!(domain, instance = name, "closed"),
        Err(e) => {
            tracing::warn!(domain, instance = name, error = %e, "close failed");
            errors.push(e.with_metadata("instance", name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::ErrorKind;

    fn container(toml: &str) -> Container {
        let config = StructuredConfig::parse(toml, "toml").unwrap();
        Container::with_defaults(config, ComponentFactories::new(), &[])
    }

    #[test]
    fn test_empty_config_yields_empty_domains() {
        let container = container("");
        assert!(container.caches().unwrap().instances().value.is_empty());
        assert!(container.middlewares().unwrap().server().unwrap().is_empty());
        assert_eq!(container.app().unwrap(), AppConfig::default());
    }

    #[test]
    fn test_decode_error_surfaces_from_its_accessor_only() {
        let container = container(
            r#"
            [data]
            caches = "not a group"

            [[data.object_stores.configs]]
            name = "assets"
            driver = "memory"
            "#,
        );

        let err = container.caches().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.module(), "config");
        assert!(container.object_store("assets").is_ok());
    }

    #[test]
    fn test_filestores_alias() {
        let container = container(
            r#"
            [[data.filestores.configs]]
            name = "legacy"
            driver = "memory"
            bucket = "old"
            "#,
        );
        assert_eq!(container.object_store("legacy").unwrap().bucket(), "old");
    }

    #[test]
    fn test_provider_is_configured_once() {
        let container = container(
            r#"
            [[data.caches.configs]]
            name = "hot"
            driver = "memory"
            "#,
        );
        let first = container.cache("hot").unwrap();
        let again = container.cache("hot").unwrap();
        assert!(Arc::ptr_eq(&first, &again));
    }
}
