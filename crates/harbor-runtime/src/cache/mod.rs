//! Cache domain (`data.caches`).

pub mod memory;

use crate::provider::{InstanceFactory, InstanceRegistry, Provider};
use async_trait::async_trait;
use bytes::Bytes;
use harbor_config::CacheEntry;
use harbor_core::{DuplicatePolicy, HarborResult, Options};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

pub use memory::{MemoryCache, MemoryCacheSettings};

/// Registry domain name.
pub const DOMAIN: &str = "cache";

/// A key/value cache.
#[async_trait]
pub trait Cache: Send + Sync + fmt::Debug {
    /// Instance name.
    fn name(&self) -> &str;

    /// Returns the value for `key`, if present and not expired.
    async fn get(&self, key: &str) -> HarborResult<Option<Bytes>>;

    /// Stores `value`; `ttl` overrides the instance default.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> HarborResult<()>;

    /// Removes `key`, returning whether it was present.
    async fn delete(&self, key: &str) -> HarborResult<bool>;

    /// Returns `true` if `key` holds a live value.
    async fn exists(&self, key: &str) -> HarborResult<bool>;

    /// Removes every key.
    async fn clear(&self) -> HarborResult<()>;

    /// Releases resources and stops background work.
    async fn close(&self) -> HarborResult<()>;
}

/// Shared cache handle.
pub type SharedCache = Arc<dyn Cache>;

/// Cache provider.
pub type CacheProvider = Provider<CacheEntry, SharedCache>;

static REGISTRY: LazyLock<Arc<InstanceRegistry<CacheEntry, SharedCache>>> =
    LazyLock::new(|| Arc::new(InstanceRegistry::new(DOMAIN, DuplicatePolicy::Panic)));

/// The process-wide cache driver registry.
pub fn registry() -> Arc<InstanceRegistry<CacheEntry, SharedCache>> {
    Arc::clone(&REGISTRY)
}

/// Registers a cache driver.
///
/// # Panics
///
/// Panics if `driver` is already registered.
pub fn register<F>(driver: &str, factory: F)
where
    F: Fn(&CacheEntry, &Options) -> HarborResult<SharedCache> + Send + Sync + 'static,
{
    let factory: InstanceFactory<CacheEntry, SharedCache> = Arc::new(factory);
    REGISTRY.register(driver, factory);
}

/// Creates a provider over the process-wide registry.
#[must_use]
pub fn provider() -> CacheProvider {
    Provider::new(DOMAIN, registry())
}
