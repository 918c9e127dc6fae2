//! Service registry domain (`discoveries`).
//!
//! One registry instance serves both roles: services register themselves
//! through it and clients discover peers through it. [`RegistryProvider`]
//! exposes both views over the same cached instances.

pub mod memory;

use crate::provider::{InstanceFactory, InstanceRegistry, Provider};
use async_trait::async_trait;
use harbor_config::{ComponentGroup, DiscoveryEntry};
use harbor_core::{DuplicatePolicy, HarborResult, Options, Partial};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, LazyLock};

pub use memory::MemoryRegistry;

/// Registry domain name.
pub const DOMAIN: &str = "registry";

/// One running instance of a service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance id.
    pub id: String,
    /// Service name.
    pub name: String,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Endpoint URLs, e.g. `grpc://10.0.0.1:9000`.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ServiceInstance {
    /// Creates an instance description.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds an endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoints.push(endpoint.into());
        self
    }

    /// Sets the version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Registration and discovery of service instances.
#[async_trait]
pub trait ServiceRegistry: Send + Sync + fmt::Debug {
    /// Instance name.
    fn name(&self) -> &str;

    /// Announces `instance`.
    async fn register(&self, instance: &ServiceInstance) -> HarborResult<()>;

    /// Withdraws `instance`.
    async fn deregister(&self, instance: &ServiceInstance) -> HarborResult<()>;

    /// Lists the live instances of `service`.
    async fn discover(&self, service: &str) -> HarborResult<Vec<ServiceInstance>>;

    /// Releases resources.
    async fn close(&self) -> HarborResult<()>;
}

/// Shared registry handle.
pub type SharedRegistry = Arc<dyn ServiceRegistry>;

static REGISTRY: LazyLock<Arc<InstanceRegistry<DiscoveryEntry, SharedRegistry>>> =
    LazyLock::new(|| Arc::new(InstanceRegistry::new(DOMAIN, DuplicatePolicy::Panic)));

/// The process-wide registry driver registry.
pub fn registry() -> Arc<InstanceRegistry<DiscoveryEntry, SharedRegistry>> {
    Arc::clone(&REGISTRY)
}

/// Registers a registry driver.
///
/// # Panics
///
/// Panics if `driver` is already registered.
pub fn register<F>(driver: &str, factory: F)
where
    F: Fn(&DiscoveryEntry, &Options) -> HarborResult<SharedRegistry> + Send + Sync + 'static,
{
    let factory: InstanceFactory<DiscoveryEntry, SharedRegistry> = Arc::new(factory);
    REGISTRY.register(driver, factory);
}

/// Provider for service registries with registrar and discovery views.
#[derive(Debug)]
pub struct RegistryProvider {
    inner: Provider<DiscoveryEntry, SharedRegistry>,
}

impl Default for RegistryProvider {
    fn default() -> Self {
        Self::new(registry())
    }
}

impl RegistryProvider {
    /// Creates a provider backed by `factories`.
    #[must_use]
    pub fn new(factories: Arc<InstanceRegistry<DiscoveryEntry, SharedRegistry>>) -> Self {
        Self {
            inner: Provider::new(DOMAIN, factories),
        }
    }

    /// The underlying generic provider.
    #[must_use]
    pub fn provider(&self) -> &Provider<DiscoveryEntry, SharedRegistry> {
        &self.inner
    }

    /// Installs a new `discoveries` group.
    pub fn set_config(&self, config: ComponentGroup<DiscoveryEntry>, options: Options) {
        self.inner.set_config(config, options);
    }

    /// Registers a registry by hand.
    pub fn register(&self, name: impl Into<String>, registry: SharedRegistry) {
        self.inner.register(name, registry);
    }

    /// Every registry, materializing on first use.
    pub fn registries(&self) -> Partial<HashMap<String, SharedRegistry>> {
        self.inner.instances()
    }

    /// The registry `name`, used to announce this service.
    pub fn registrar(&self, name: &str) -> HarborResult<SharedRegistry> {
        self.inner.get(name)
    }

    /// The registry `name`, used to find peers.
    pub fn discovery(&self, name: &str) -> HarborResult<SharedRegistry> {
        self.inner.get(name)
    }

    /// The default registrar; see [`Provider::default`].
    pub fn default_registrar(&self, global: &str) -> HarborResult<SharedRegistry> {
        self.inner.default(global)
    }

    /// The default discovery; see [`Provider::default`].
    pub fn default_discovery(&self, global: &str) -> HarborResult<SharedRegistry> {
        self.inner.default(global)
    }
}
