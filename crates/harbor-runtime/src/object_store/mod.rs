//! Object store domain (`data.object_stores`, legacy `data.filestores`).

pub mod memory;

use crate::provider::{InstanceFactory, InstanceRegistry, Provider};
use async_trait::async_trait;
use bytes::Bytes;
use harbor_config::ObjectStoreEntry;
use harbor_core::{DuplicatePolicy, HarborResult, Options};
use std::fmt;
use std::sync::{Arc, LazyLock};

pub use memory::MemoryObjectStore;

/// Registry domain name.
pub const DOMAIN: &str = "object_store";

/// Blob storage keyed by path-like names.
#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// Instance name.
    fn name(&self) -> &str;

    /// Bucket or root the store writes to.
    fn bucket(&self) -> &str;

    /// Writes `data` under `key`, replacing any previous object.
    async fn put(&self, key: &str, data: Bytes) -> HarborResult<()>;

    /// Reads the object under `key`.
    async fn get(&self, key: &str) -> HarborResult<Option<Bytes>>;

    /// Deletes `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> HarborResult<bool>;

    /// Returns `true` if `key` exists.
    async fn exists(&self, key: &str) -> HarborResult<bool>;

    /// Keys starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> HarborResult<Vec<String>>;

    /// Releases resources.
    async fn close(&self) -> HarborResult<()>;
}

/// Shared object store handle.
pub type SharedObjectStore = Arc<dyn ObjectStore>;

/// Object store provider.
pub type ObjectStoreProvider = Provider<ObjectStoreEntry, SharedObjectStore>;

static REGISTRY: LazyLock<Arc<InstanceRegistry<ObjectStoreEntry, SharedObjectStore>>> =
    LazyLock::new(|| Arc::new(InstanceRegistry::new(DOMAIN, DuplicatePolicy::Panic)));

/// The process-wide object store driver registry.
pub fn registry() -> Arc<InstanceRegistry<ObjectStoreEntry, SharedObjectStore>> {
    Arc::clone(&REGISTRY)
}

/// Registers an object store driver.
///
/// # Panics
///
/// Panics if `driver` is already registered.
pub fn register<F>(driver: &str, factory: F)
where
    F: Fn(&ObjectStoreEntry, &Options) -> HarborResult<SharedObjectStore> + Send + Sync + 'static,
{
    let factory: InstanceFactory<ObjectStoreEntry, SharedObjectStore> = Arc::new(factory);
    REGISTRY.register(driver, factory);
}

/// Creates a provider over the process-wide registry.
#[must_use]
pub fn provider() -> ObjectStoreProvider {
    Provider::new(DOMAIN, registry())
}
