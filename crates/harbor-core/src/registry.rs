//! Process-wide factory registries.
//!
//! A [`FactoryRegistry`] maps a driver or type name to a factory for one
//! domain. Each domain picks what happens on duplicate registration:
//! middleware factories are overwritten with a warning, storage and security
//! factories panic because duplicates indicate a wiring bug at startup.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{Error, HarborResult};

/// What a registry does when a name is registered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Replace the previous factory and log a warning.
    Overwrite,
    /// Panic.
    Panic,
}

/// Thread-safe map from name to factory.
pub struct FactoryRegistry<F> {
    domain: &'static str,
    on_duplicate: DuplicatePolicy,
    factories: RwLock<HashMap<String, F>>,
}

impl<F> std::fmt::Debug for FactoryRegistry<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("FactoryRegistry")
            .field("domain", &self.domain)
            .field("on_duplicate", &self.on_duplicate)
            .field("factories", &names)
            .finish()
    }
}

impl<F: Clone> FactoryRegistry<F> {
    /// Creates an empty registry for `domain`.
    #[must_use]
    pub fn new(domain: &'static str, on_duplicate: DuplicatePolicy) -> Self {
        Self {
            domain,
            on_duplicate,
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the domain name used in logs and errors.
    #[must_use]
    pub fn domain(&self) -> &'static str {
        self.domain
    }

    /// Registers `factory` under `name`.
    ///
    /// # Panics
    ///
    /// Panics on a duplicate name when the registry uses
    /// [`DuplicatePolicy::Panic`].
    pub fn register(&self, name: impl Into<String>, factory: F) {
        let name = name.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&name) {
            match self.on_duplicate {
                DuplicatePolicy::Overwrite => {
                    tracing::warn!(
                        domain = self.domain,
                        factory = %name,
                        "factory already registered, overwriting"
                    );
                }
                DuplicatePolicy::Panic => {
                    drop(factories);
                    panic!("{} factory '{name}' registered twice", self.domain);
                }
            }
        } else {
            tracing::debug!(domain = self.domain, factory = %name, "factory registered");
        }
        factories.insert(name, factory);
    }

    /// Looks up a factory.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<F> {
        self.factories.read().get(name).cloned()
    }

    /// Looks up a factory, failing with a not-found error listing the
    /// registered names.
    pub fn require(&self, name: &str) -> HarborResult<F> {
        self.get(name).ok_or_else(|| {
            Error::not_found(format!(
                "{} factory '{name}' is not registered (available: {})",
                self.domain,
                self.names().join(", ")
            ))
            .with_module(self.domain)
            .with_operation("factory")
            .with_metadata("factory", name)
        })
    }

    /// Returns `true` if `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories.read().contains_key(name)
    }

    /// Returns a snapshot of every registered factory.
    #[must_use]
    pub fn registered_factories(&self) -> HashMap<String, F> {
        self.factories.read().clone()
    }

    /// Returns the registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    type TestFactory = Arc<dyn Fn() -> u32 + Send + Sync>;

    fn factory(n: u32) -> TestFactory {
        Arc::new(move || n)
    }

    #[test]
    fn test_register_and_get() {
        let registry: FactoryRegistry<TestFactory> =
            FactoryRegistry::new("cache", DuplicatePolicy::Panic);
        registry.register("memory", factory(1));

        assert!(registry.contains("memory"));
        assert_eq!(registry.get("memory").map(|f| f()), Some(1));
        assert!(registry.get("redis").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_overwrite_policy_replaces() {
        let registry: FactoryRegistry<TestFactory> =
            FactoryRegistry::new("middleware", DuplicatePolicy::Overwrite);
        registry.register("logging", factory(1));
        registry.register("logging", factory(2));

        assert_eq!(registry.get("logging").map(|f| f()), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_panic_policy_panics() {
        let registry: FactoryRegistry<TestFactory> =
            FactoryRegistry::new("authenticator", DuplicatePolicy::Panic);
        registry.register("jwt", factory(1));
        registry.register("jwt", factory(2));
    }

    #[test]
    fn test_require_lists_available() {
        let registry: FactoryRegistry<TestFactory> =
            FactoryRegistry::new("cache", DuplicatePolicy::Panic);
        registry.register("memory", factory(1));
        registry.register("bolt", factory(2));

        let err = registry.require("redis").err().expect("should fail");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.message().contains("bolt, memory"));
        assert_eq!(err.module(), "cache");
    }

    #[test]
    fn test_snapshot_is_detached() {
        let registry: FactoryRegistry<TestFactory> =
            FactoryRegistry::new("cache", DuplicatePolicy::Overwrite);
        registry.register("a", factory(1));
        let snapshot = registry.registered_factories();
        registry.register("b", factory(2));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.names(), vec!["a", "b"]);
    }
}
