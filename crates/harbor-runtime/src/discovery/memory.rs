//! In-process `memory` service registry.
//!
//! Useful for tests and single-process deployments. Instances are grouped by
//! service name within the entry's namespace.

use super::{ServiceInstance, ServiceRegistry, SharedRegistry};
use async_trait::async_trait;
use harbor_config::{ConfigEntry, DiscoveryEntry};
use harbor_core::{Error, HarborResult, Options};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    name: String,
    namespace: String,
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Factory registered under `memory`.
    pub fn from_entry(entry: &DiscoveryEntry, _opts: &Options) -> HarborResult<SharedRegistry> {
        Ok(Arc::new(Self::new(entry.identity(), entry.namespace.clone())))
    }

    /// Namespace instances are registered under.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl ServiceRegistry for MemoryRegistry {
    fn name(&self) -> &str {
        &self.name
    }

    async fn register(&self, instance: &ServiceInstance) -> HarborResult<()> {
        if instance.id.is_empty() || instance.name.is_empty() {
            return Err(Error::validation("service instance needs an id and a name")
                .with_module("registry"));
        }
        let mut services = self.services.write();
        let instances = services.entry(instance.name.clone()).or_default();
        instances.retain(|i| i.id != instance.id);
        instances.push(instance.clone());
        tracing::debug!(registry = %self.name, service = %instance.name, id = %instance.id, "instance registered");
        Ok(())
    }

    async fn deregister(&self, instance: &ServiceInstance) -> HarborResult<()> {
        let mut services = self.services.write();
        if let Some(instances) = services.get_mut(&instance.name) {
            instances.retain(|i| i.id != instance.id);
            if instances.is_empty() {
                services.remove(&instance.name);
            }
        }
        Ok(())
    }

    async fn discover(&self, service: &str) -> HarborResult<Vec<ServiceInstance>> {
        Ok(self.services.read().get(service).cloned().unwrap_or_default())
    }

    async fn close(&self) -> HarborResult<()> {
        self.services.write().clear();
        Ok(())
    }
}
