//! Application-defined components (`components`).
//!
//! Unlike the storage domains, component factories are not process-wide:
//! the application hands a [`ComponentFactories`] set to the container.
//! Instances are type-erased and recovered by downcast.

use crate::provider::{InstanceFactory, InstanceRegistry, Provider};
use harbor_config::{ComponentEntry, ComponentGroup};
use harbor_core::{DuplicatePolicy, Error, HarborResult, Options};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Registry domain name.
pub const DOMAIN: &str = "component";

/// A type-erased component instance.
pub type SharedComponent = Arc<dyn Any + Send + Sync>;

/// Factories for the `components` group, keyed by `type`.
///
/// # Example
///
/// ```
/// use harbor_runtime::component::ComponentFactories;
/// use std::sync::Arc;
///
/// struct Greeter(String);
///
/// let factories = ComponentFactories::new().with("greeter", |entry, _opts| {
///     let greeting: String = entry
///         .settings::<serde_json::Map<String, serde_json::Value>>()?
///         .get("greeting")
///         .and_then(|v| v.as_str())
///         .unwrap_or("hello")
///         .to_string();
///     Ok(Arc::new(Greeter(greeting)))
/// });
/// assert!(factories.contains("greeter"));
/// ```
#[derive(Clone, Default)]
pub struct ComponentFactories {
    factories: HashMap<String, InstanceFactory<ComponentEntry, SharedComponent>>,
}

impl fmt::Debug for ComponentFactories {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("ComponentFactories").field("kinds", &kinds).finish()
    }
}

impl ComponentFactories {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a factory for `kind` whose instances are of type `T`.
    #[must_use]
    pub fn with<T, F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ComponentEntry, &Options) -> HarborResult<Arc<T>> + Send + Sync + 'static,
    {
        let erased: InstanceFactory<ComponentEntry, SharedComponent> =
            Arc::new(move |entry: &ComponentEntry, opts: &Options| {
                factory(entry, opts).map(|c| c as SharedComponent)
            });
        self.factories.insert(kind.into(), erased);
        self
    }

    /// Returns `true` if `kind` has a factory.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    fn into_registry(self) -> InstanceRegistry<ComponentEntry, SharedComponent> {
        let registry = InstanceRegistry::new(DOMAIN, DuplicatePolicy::Overwrite);
        for (kind, factory) in self.factories {
            registry.register(kind, factory);
        }
        registry
    }
}

/// Provider for application components with typed access.
#[derive(Debug)]
pub struct ComponentProvider {
    inner: Provider<ComponentEntry, SharedComponent>,
}

impl ComponentProvider {
    /// Creates a provider over `factories`.
    #[must_use]
    pub fn new(factories: ComponentFactories) -> Self {
        Self {
            inner: Provider::new(DOMAIN, Arc::new(factories.into_registry())),
        }
    }

    /// The underlying generic provider.
    #[must_use]
    pub fn provider(&self) -> &Provider<ComponentEntry, SharedComponent> {
        &self.inner
    }

    /// Installs a new `components` group.
    pub fn set_config(&self, config: ComponentGroup<ComponentEntry>, options: Options) {
        self.inner.set_config(config, options);
    }

    /// Registers a component by hand.
    pub fn register<T: Send + Sync + 'static>(&self, name: impl Into<String>, component: Arc<T>) {
        self.inner.register(name, component as SharedComponent);
    }

    /// The type-erased component `name`.
    pub fn get(&self, name: &str) -> HarborResult<SharedComponent> {
        self.inner.get(name)
    }

    /// The component `name` as a `T`.
    ///
    /// Fails with a validation error when the instance has another type.
    pub fn get_as<T: Send + Sync + 'static>(&self, name: &str) -> HarborResult<Arc<T>> {
        self.get(name)?.downcast::<T>().map_err(|_| {
            Error::validation(format!(
                "component '{name}' is not a {}",
                type_name::<T>()
            ))
            .with_module(DOMAIN)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harbor_core::ErrorKind;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Limits {
        max: u32,
    }

    #[derive(Debug)]
    struct Quota(u32);

    fn provider() -> ComponentProvider {
        let factories = ComponentFactories::new().with("quota", |entry, _| {
            let limits: Limits = entry.settings()?;
            Ok(Arc::new(Quota(limits.max)))
        });
        let provider = ComponentProvider::new(factories);
        let mut entry = ComponentEntry::new("uploads", "quota");
        entry.body.insert("max".into(), serde_json::json!(10));
        provider.set_config(ComponentGroup::with_configs(vec![entry]), Options::new());
        provider
    }

    #[test]
    fn test_typed_access() {
        let provider = provider();
        assert_eq!(provider.get_as::<Quota>("uploads").unwrap().0, 10);
        let err = provider.get_as::<String>("uploads").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_manual_component() {
        let provider = provider();
        provider.register("answer", Arc::new(42_u64));
        assert_eq!(*provider.get_as::<u64>("answer").unwrap(), 42);
    }
}
