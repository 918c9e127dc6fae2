//! Configuration for Harbor.
//!
//! This crate provides:
//! - [`StructuredConfig`] - the untyped document, addressable by dotted path
//! - typed section schemas ([`ComponentGroup`], [`CacheEntry`], [`MiddlewareEntry`], ...)
//! - [`ConfigLoader`] - layered loading (defaults → files → strings → env)
//!
//! # Configuration File Format
//!
//! ```toml
//! [app]
//! name = "orders"
//! version = "1.0.0"
//!
//! [logger]
//! level = "info"
//! format = "json"
//!
//! [data.caches]
//! active = "sessions"
//!
//! [[data.caches.configs]]
//! name = "sessions"
//! driver = "memory"
//! memory = { capacity = 10000, default_ttl_ms = 60000 }
//!
//! [[middlewares.configs]]
//! type = "logging"
//!
//! [[middlewares.configs]]
//! type = "rate_limiter"
//! customize = { limit = 100, window_ms = 60000 }
//!
//! [security]
//! default_policy = "jwt-required"
//! ```
//!
//! Any section may be absent; absence means "no instances".

#![doc(html_root_url = "https://docs.rs/harbor-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod document;
mod error;
mod loader;
mod schema;

pub use document::StructuredConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::{
    AppConfig, AuthenticatorEntry, AuthorizerEntry, CacheEntry, ClientEntry, ComponentEntry,
    ComponentGroup, ConfigEntry, DataConfig, DatabaseEntry, DiscoveryEntry, EndpointGroup,
    HarborConfig, LogFormat, LoggerConfig, MiddlewareEntry, ObjectStoreEntry, PolicyEntry,
    PoolConfig, Protocol, SecurityConfig, ServerEntry, DEFAULT_INSTANCE,
};

/// Well-known document paths.
pub mod paths {
    /// Application identity.
    pub const APP: &str = "app";
    /// Logger settings.
    pub const LOGGER: &str = "logger";
    /// Caches.
    pub const CACHES: &str = "data.caches";
    /// Databases.
    pub const DATABASES: &str = "data.databases";
    /// Object stores.
    pub const OBJECT_STORES: &str = "data.object_stores";
    /// Legacy object store path.
    pub const FILESTORES: &str = "data.filestores";
    /// Service registries.
    pub const DISCOVERIES: &str = "discoveries";
    /// Middlewares.
    pub const MIDDLEWARES: &str = "middlewares";
    /// Servers.
    pub const SERVERS: &str = "servers";
    /// Clients.
    pub const CLIENTS: &str = "clients";
    /// Security.
    pub const SECURITY: &str = "security";
    /// Generic components.
    pub const COMPONENTS: &str = "components";
}
