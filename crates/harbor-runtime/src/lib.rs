//! # Harbor Runtime
//!
//! The configuration-driven component container.
//!
//! Each domain (caches, databases, object stores, service registries,
//! middlewares, application components) has a [`Provider`] that turns its
//! configuration group into named, cached instances on first access. The
//! [`Container`] wires one provider per domain to a single
//! [`StructuredConfig`](harbor_config::StructuredConfig).
//!
//! ## Example
//!
//! ```
//! use harbor_config::StructuredConfig;
//! use harbor_runtime::{Cache, ComponentFactories, Container};
//!
//! let config = StructuredConfig::parse(
//!     r#"
//!     [[data.caches.configs]]
//!     name = "sessions"
//!     driver = "memory"
//!     "#,
//!     "toml",
//! )
//! .unwrap();
//!
//! let container = Container::with_defaults(config, ComponentFactories::new(), &[]);
//! let sessions = container.default_cache("").unwrap();
//! assert_eq!(sessions.name(), "sessions");
//! ```
//!
//! ## Drivers
//!
//! Drivers register into process-wide registries, one per domain.
//! [`register_defaults`] installs the built-in ones:
//!
//! | Domain | Driver |
//! |--------|--------|
//! | cache | `memory` |
//! | object store | `memory` |
//! | registry | `memory` |
//! | authenticator | `jwt`, `api_key` |
//! | authorizer | `rbac`, `allow_all`, `deny_all` |

pub mod cache;
pub mod component;
pub mod container;
pub mod database;
pub mod discovery;
pub mod middleware;
pub mod object_store;
pub mod provider;

pub use cache::{Cache, CacheProvider, SharedCache};
pub use component::{ComponentFactories, ComponentProvider, SharedComponent};
pub use container::Container;
pub use database::{Database, DatabaseProvider, SharedDatabase};
pub use discovery::{RegistryProvider, ServiceInstance, ServiceRegistry, SharedRegistry};
pub use middleware::MiddlewareProvider;
pub use object_store::{ObjectStore, ObjectStoreProvider, SharedObjectStore};
pub use provider::{InstanceFactory, InstanceRegistry, Provider};

use std::sync::Once;

static DEFAULTS: Once = Once::new();

/// Registers the built-in drivers of every domain. Safe to call repeatedly.
pub fn register_defaults() {
    DEFAULTS.call_once(|| {
        cache::register("memory", cache::MemoryCache::from_entry);
        object_store::register("memory", object_store::MemoryObjectStore::from_entry);
        discovery::register("memory", discovery::MemoryRegistry::from_entry);
        harbor_security::register_builtins();

        tracing::debug!("runtime defaults registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults_is_idempotent() {
        register_defaults();
        register_defaults();
        assert!(cache::registry().contains("memory"));
        assert!(object_store::registry().contains("memory"));
        assert!(discovery::registry().contains("memory"));
        assert!(harbor_security::authn::registry().contains("jwt"));
    }
}
