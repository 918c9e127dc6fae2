//! In-process `memory` cache driver.
//!
//! Entries carry an optional expiry. When the cache is full the entry closest
//! to expiry goes first, then the oldest one. A cleanup task purges expired
//! entries on a fixed interval until [`Cache::close`] is called; without a
//! Tokio runtime at construction time, expired entries are only dropped when
//! touched.

use super::{Cache, SharedCache};
use async_trait::async_trait;
use bytes::Bytes;
use harbor_config::{CacheEntry, ConfigEntry};
use harbor_core::{Error, HarborResult, Options};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Settings under the entry's `memory` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemoryCacheSettings {
    /// Maximum number of entries; 0 means unbounded.
    pub capacity: usize,
    /// TTL applied when `set` is given none, in milliseconds; 0 means no expiry.
    pub default_ttl_ms: u64,
    /// Interval between cleanup sweeps, in milliseconds.
    pub cleanup_interval_ms: u64,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl_ms: 0,
            cleanup_interval_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    value: Bytes,
    inserted_at: Instant,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Store {
    slots: RwLock<HashMap<String, Slot>>,
}

impl Store {
    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write();
        let before = slots.len();
        slots.retain(|_, slot| !slot.is_expired(now));
        before - slots.len()
    }
}

/// Bounded in-memory cache with per-entry TTL.
#[derive(Debug)]
pub struct MemoryCache {
    name: String,
    settings: MemoryCacheSettings,
    store: Arc<Store>,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl MemoryCache {
    /// Creates the cache and, inside a Tokio runtime, starts its cleanup task.
    #[must_use]
    pub fn new(name: impl Into<String>, settings: MemoryCacheSettings) -> Self {
        let cache = Self {
            name: name.into(),
            settings,
            store: Arc::new(Store::default()),
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        };
        cache.start_cleanup();
        cache
    }

    /// Factory registered under `memory`.
    pub fn from_entry(entry: &CacheEntry, _opts: &Options) -> HarborResult<SharedCache> {
        let settings: MemoryCacheSettings = entry.driver_settings()?;
        Ok(Arc::new(Self::new(entry.identity(), settings)))
    }

    /// Number of stored entries, expired ones included until purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.slots.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start_cleanup(&self) {
        if self.settings.cleanup_interval_ms == 0 {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(cache = %self.name, "no runtime, expired entries purged lazily");
            return;
        };

        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown.clone();
        let every = Duration::from_millis(self.settings.cleanup_interval_ms);
        let name = self.name.clone();
        handle.spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        tracing::debug!(cache = %name, "cleanup task stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        let purged = store.purge_expired();
                        if purged > 0 {
                            tracing::trace!(cache = %name, purged, "expired entries purged");
                        }
                    }
                }
            }
        });
    }

    fn ensure_open(&self) -> HarborResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::unavailable(format!("cache '{}' is closed", self.name))
                .with_module("cache"));
        }
        Ok(())
    }

    fn expiry(&self, ttl: Option<Duration>, now: Instant) -> Option<Instant> {
        let ttl = ttl.or_else(|| {
            (self.settings.default_ttl_ms > 0)
                .then(|| Duration::from_millis(self.settings.default_ttl_ms))
        })?;
        now.checked_add(ttl)
    }

    fn evict_one(slots: &mut HashMap<String, Slot>) {
        let victim = slots
            .iter()
            .min_by_key(|(_, slot)| (slot.expires_at.is_none(), slot.expires_at, slot.inserted_at))
            .map(|(key, _)| key.clone());
        if let Some(key) = victim {
            slots.remove(&key);
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> HarborResult<Option<Bytes>> {
        self.ensure_open()?;
        let now = Instant::now();
        {
            let slots = self.store.slots.read();
            match slots.get(key) {
                None => return Ok(None),
                Some(slot) if !slot.is_expired(now) => return Ok(Some(slot.value.clone())),
                Some(_) => {}
            }
        }
        self.store.slots.write().remove(key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> HarborResult<()> {
        self.ensure_open()?;
        let now = Instant::now();
        let slot = Slot {
            value,
            inserted_at: now,
            expires_at: self.expiry(ttl, now),
        };

        let mut slots = self.store.slots.write();
        let capacity = self.settings.capacity;
        if capacity > 0 && !slots.contains_key(key) && slots.len() >= capacity {
            slots.retain(|_, s| !s.is_expired(now));
            while slots.len() >= capacity {
                Self::evict_one(&mut slots);
            }
        }
        slots.insert(key.to_string(), slot);
        Ok(())
    }

    async fn delete(&self, key: &str) -> HarborResult<bool> {
        self.ensure_open()?;
        Ok(self.store.slots.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> HarborResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn clear(&self) -> HarborResult<()> {
        self.ensure_open()?;
        self.store.slots.write().clear();
        Ok(())
    }

    async fn close(&self) -> HarborResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.store.slots.write().clear();
        tracing::debug!(cache = %self.name, "cache closed");
        Ok(())
    }
}

impl Drop for MemoryCache {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::ErrorKind;
    use serde_json::json;

    fn cache(capacity: usize) -> MemoryCache {
        MemoryCache::new(
            "test",
            MemoryCacheSettings {
                capacity,
                ..MemoryCacheSettings::default()
            },
        )
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache(0);
        cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
        assert!(cache.exists("k").await.unwrap());
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = cache(0);
        cache
            .set("k", Bytes::from_static(b"v"), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert!(cache.exists("k").await.unwrap());

        std::thread::sleep(Duration::from_millis(60));
        assert!(!cache.exists("k").await.unwrap());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest() {
        let cache = cache(2);
        cache.set("a", Bytes::from_static(b"1"), None).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.set("b", Bytes::from_static(b"2"), None).await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.set("c", Bytes::from_static(b"3"), None).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert!(!cache.exists("a").await.unwrap());
        assert!(cache.exists("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_cache_rejects_calls() {
        let cache = cache(0);
        cache.close().await.unwrap();
        cache.close().await.unwrap();
        let err = cache.get("k").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(cache.shutdown.is_cancelled());
    }

    #[test]
    fn test_from_entry_without_runtime() {
        let mut entry = CacheEntry::new("sessions", "memory");
        entry
            .body
            .insert("memory".into(), json!({ "capacity": 5, "default_ttl_ms": 1000 }));
        let cache = MemoryCache::from_entry(&entry, &Options::new()).unwrap();
        assert_eq!(cache.name(), "sessions");
        tokio_test::block_on(async {
            cache.set("k", Bytes::from_static(b"v"), None).await.unwrap();
            assert!(cache.exists("k").await.unwrap());
        });
    }
}
