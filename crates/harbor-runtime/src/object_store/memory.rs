//! In-process `memory` object store driver.

use super::{ObjectStore, SharedObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use harbor_config::{ConfigEntry, ObjectStoreEntry};
use harbor_core::{Error, HarborResult, Options};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Objects kept in a sorted map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    name: String,
    bucket: String,
    objects: RwLock<BTreeMap<String, Bytes>>,
    closed: AtomicBool,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Factory registered under `memory`.
    pub fn from_entry(entry: &ObjectStoreEntry, _opts: &Options) -> HarborResult<SharedObjectStore> {
        Ok(Arc::new(Self::new(entry.identity(), entry.bucket.clone())))
    }

    fn ensure_open(&self) -> HarborResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(
                Error::unavailable(format!("object store '{}' is closed", self.name))
                    .with_module("object_store"),
            );
        }
        Ok(())
    }

    fn check_key(key: &str) -> HarborResult<()> {
        if key.is_empty() {
            return Err(Error::validation("object key must not be empty").with_module("object_store"));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, data: Bytes) -> HarborResult<()> {
        self.ensure_open()?;
        Self::check_key(key)?;
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str) -> HarborResult<Option<Bytes>> {
        self.ensure_open()?;
        Ok(self.objects.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> HarborResult<bool> {
        self.ensure_open()?;
        Ok(self.objects.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> HarborResult<bool> {
        self.ensure_open()?;
        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> HarborResult<Vec<String>> {
        self.ensure_open()?;
        Ok(self
            .objects
            .read()
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn close(&self) -> HarborResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_list() {
        let store = MemoryObjectStore::new("assets", "bucket-1");
        store.put("img/a.png", Bytes::from_static(b"a")).await.unwrap();
        store.put("img/b.png", Bytes::from_static(b"b")).await.unwrap();
        store.put("doc/c.txt", Bytes::from_static(b"c")).await.unwrap();

        assert_eq!(store.get("img/a.png").await.unwrap(), Some(Bytes::from_static(b"a")));
        assert_eq!(store.list("img/").await.unwrap(), vec!["img/a.png", "img/b.png"]);
        assert_eq!(store.list("").await.unwrap().len(), 3);
        assert!(store.delete("doc/c.txt").await.unwrap());
        assert!(!store.exists("doc/c.txt").await.unwrap());
        assert_eq!(store.bucket(), "bucket-1");
    }

    #[tokio::test]
    async fn test_empty_key_and_closed_store() {
        let store = MemoryObjectStore::new("s", "");
        assert!(store.put("", Bytes::new()).await.is_err());
        store.close().await.unwrap();
        assert!(store.get("k").await.is_err());
    }
}
