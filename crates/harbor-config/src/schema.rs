//! Configuration schema types.
//!
//! Every domain section shares the [`ComponentGroup`] envelope
//! `{ active, default, configs[] }`. Entries implement [`ConfigEntry`], which
//! gives the provider their identity, factory key and enable flag.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::ConfigError;

/// Well-known fallback default instance name.
pub const DEFAULT_INSTANCE: &str = "default";

/// Shared shape of a per-instance configuration entry.
pub trait ConfigEntry: Clone + Send + Sync + 'static {
    /// Explicit instance name (may be empty).
    fn name(&self) -> &str;

    /// The factory lookup key (`driver`, `type` or `dialect`).
    fn factory_key(&self) -> &str;

    /// Whether the entry takes part in materialization.
    fn enabled(&self) -> bool;

    /// Effective identity: `name`, falling back to the factory key.
    fn identity(&self) -> &str {
        if self.name().is_empty() {
            self.factory_key()
        } else {
            self.name()
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Decodes `T` from the free-form fields of an entry.
fn decode_body<T: DeserializeOwned + Default>(
    body: &Map<String, Value>,
    key: Option<&str>,
) -> Result<T, ConfigError> {
    let value = match key {
        Some(key) => match body.get(key) {
            None | Some(Value::Null) => return Ok(T::default()),
            Some(v) => v.clone(),
        },
        None => Value::Object(body.clone()),
    };
    serde_json::from_value(value).map_err(|e| ConfigError::decode(key.unwrap_or("<entry>"), e))
}

/// The `{ active, default, configs[] }` envelope shared by every domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(bound(deserialize = "E: Deserialize<'de>"))]
pub struct ComponentGroup<E> {
    /// Name of the instance to use as the domain default.
    #[serde(default)]
    pub active: String,

    /// Secondary default name, consulted when `active` is empty.
    #[serde(default)]
    pub default: String,

    /// Per-instance entries.
    #[serde(default = "Vec::new")]
    pub configs: Vec<E>,
}

impl<E> Default for ComponentGroup<E> {
    fn default() -> Self {
        Self {
            active: String::new(),
            default: String::new(),
            configs: Vec::new(),
        }
    }
}

impl<E: ConfigEntry> ComponentGroup<E> {
    /// Creates a group from entries.
    #[must_use]
    pub fn with_configs(configs: Vec<E>) -> Self {
        Self {
            configs,
            ..Self::default()
        }
    }

    /// Sets `active`.
    #[must_use]
    pub fn with_active(mut self, active: impl Into<String>) -> Self {
        self.active = active.into();
        self
    }

    /// Sets `default`.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = default.into();
        self
    }

    /// Returns `true` if the group declares no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Iterates over entries with `enabled = true`.
    pub fn enabled_entries(&self) -> impl Iterator<Item = &E> {
        self.configs.iter().filter(|e| e.enabled())
    }

    /// Finds an entry by effective identity.
    #[must_use]
    pub fn find(&self, identity: &str) -> Option<&E> {
        self.configs.iter().find(|e| e.identity() == identity)
    }

    /// The provisional default name: `active`, then `default`, then the
    /// identity of the only enabled entry.
    #[must_use]
    pub fn provisional_default(&self) -> Option<String> {
        self.default_candidates().into_iter().next()
    }

    /// Every non-empty default candidate in priority order: `active`,
    /// `default`, then the identity of the only enabled entry.
    ///
    /// Callers pick the first candidate that names a live instance, so a
    /// stale `active` falls through to `default`.
    #[must_use]
    pub fn default_candidates(&self) -> Vec<String> {
        let mut candidates = Vec::with_capacity(3);
        for name in [&self.active, &self.default] {
            if !name.is_empty() && !candidates.contains(name) {
                candidates.push(name.clone());
            }
        }
        let mut enabled = self.enabled_entries();
        if let (Some(only), None) = (enabled.next(), enabled.next()) {
            let identity = only.identity();
            if !identity.is_empty() && !candidates.iter().any(|c| c == identity) {
                candidates.push(identity.to_string());
            }
        }
        candidates
    }

    /// Checks that every entry has a non-empty identity.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending entry.
    pub fn validate(&self, path: &str) -> Result<(), ConfigError> {
        for (i, entry) in self.configs.iter().enumerate() {
            if entry.identity().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("{path}.configs[{i}]"),
                    "entry needs a name or a driver/type/dialect",
                ));
            }
        }
        Ok(())
    }
}

macro_rules! impl_entry {
    ($ty:ty, $key:ident) => {
        impl ConfigEntry for $ty {
            fn name(&self) -> &str {
                &self.name
            }

            fn factory_key(&self) -> &str {
                &self.$key
            }

            fn enabled(&self) -> bool {
                self.enabled
            }
        }
    };
}

/// Application identity (`app` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Unique instance identifier.
    #[serde(default)]
    pub id: String,
    /// Service name.
    #[serde(default)]
    pub name: String,
    /// Service version.
    #[serde(default)]
    pub version: String,
    /// Deployment environment.
    #[serde(default)]
    pub env: String,
    /// Free-form metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON lines.
    #[default]
    Json,
    /// Human-readable output.
    Pretty,
}

/// Logging settings (`logger` section).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggerConfig {
    /// Filter directive (e.g. `info`, `harbor_runtime=debug`).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
    /// Include file and line number.
    #[serde(default)]
    pub file_line: bool,
    /// Include the event target.
    #[serde(default = "default_true")]
    pub target: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file_line: false,
            target: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A cache instance (`data.caches.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Driver (`memory`, `redis`, ...).
    #[serde(default)]
    pub driver: String,
    /// Whether the entry is materialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Driver-specific settings, keyed by driver name.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(CacheEntry, driver);

impl CacheEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            enabled: true,
            body: Map::new(),
        }
    }

    /// Decodes the settings block named after the driver.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the block does not fit `T`.
    pub fn driver_settings<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        decode_body(&self.body, Some(&self.driver))
    }
}

/// Connection pool settings for a database entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum open connections.
    #[serde(default)]
    pub max_open: u32,
    /// Maximum idle connections.
    #[serde(default)]
    pub max_idle: u32,
    /// Maximum connection lifetime in milliseconds.
    #[serde(default)]
    pub max_lifetime_ms: u64,
}

/// A database instance (`data.databases.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DatabaseEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// SQL dialect / driver (`postgres`, `mysql`, `sqlite`, ...).
    #[serde(default)]
    pub dialect: String,
    /// Connection source (DSN).
    #[serde(default)]
    pub source: String,
    /// Whether the entry is materialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Pool settings.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Other driver-specific fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(DatabaseEntry, dialect);

impl DatabaseEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        dialect: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect: dialect.into(),
            source: source.into(),
            enabled: true,
            ..Self::default()
        }
    }
}

/// An object store instance (`data.object_stores.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ObjectStoreEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Driver (`memory`, `local`, `s3`, ...).
    #[serde(default)]
    pub driver: String,
    /// Whether the entry is materialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Bucket or root directory.
    #[serde(default)]
    pub bucket: String,
    /// Other driver-specific fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(ObjectStoreEntry, driver);

impl ObjectStoreEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            enabled: true,
            ..Self::default()
        }
    }
}

/// A service registry instance (`discoveries.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Driver (`memory`, `etcd`, `consul`, ...).
    #[serde(default, alias = "type")]
    pub driver: String,
    /// Whether the entry is materialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Registry endpoints.
    #[serde(default)]
    pub addrs: Vec<String>,
    /// Namespace or key prefix.
    #[serde(default)]
    pub namespace: String,
    /// Other driver-specific fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(DiscoveryEntry, driver);

impl DiscoveryEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, driver: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: driver.into(),
            enabled: true,
            ..Self::default()
        }
    }
}

/// A middleware declaration (`middlewares.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MiddlewareEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Middleware type (`logging`, `selector`, `rate_limiter`, ...).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Whether the entry takes part in chain composition.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings.
    #[serde(default)]
    pub customize: Map<String, Value>,
    /// Type-specific settings given inline next to the envelope fields.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(MiddlewareEntry, kind);

impl MiddlewareEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Sets one `customize` field.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.customize.insert(key.into(), value);
        self
    }

    /// Disables the entry.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Decodes the type-specific settings. Inline fields are read first and
    /// `customize` overrides them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the settings do not fit `T`.
    pub fn settings<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        let mut merged = self.body.clone();
        for (k, v) in &self.customize {
            merged.insert(k.clone(), v.clone());
        }
        decode_body(&merged, None).map_err(|e| match e {
            ConfigError::Decode { source, .. } => {
                ConfigError::decode(format!("middlewares.{}", self.identity()), source)
            }
            other => other,
        })
    }
}

/// A generic component (`components.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComponentEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Component type; selects the factory.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Whether the entry is materialized.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(ComponentEntry, kind);

impl ComponentEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            body: Map::new(),
        }
    }

    /// Decodes the type-specific settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the settings do not fit `T`.
    pub fn settings<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        decode_body(&self.body, None)
    }
}

/// Transport protocol for servers and clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP/1.1 or HTTP/2 JSON.
    #[default]
    Http,
    /// gRPC.
    Grpc,
}

/// A server declaration (`servers.configs[]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Listen address.
    #[serde(default)]
    pub address: String,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Middleware names applied to this server (empty = all).
    #[serde(default)]
    pub middlewares: Vec<String>,
    /// Whether the server is started.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ServerEntry {
    /// The per-request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Effective identity: `name`, falling back to the protocol.
    #[must_use]
    pub fn identity(&self) -> String {
        if self.name.is_empty() {
            protocol_name(self.protocol).to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A client declaration (`clients.configs[]`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Protocol.
    #[serde(default)]
    pub protocol: Protocol,
    /// Target endpoint (address or `discovery:///service`).
    #[serde(default)]
    pub endpoint: String,
    /// Per-call timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Middleware names applied to this client (empty = all).
    #[serde(default)]
    pub middlewares: Vec<String>,
    /// Whether the client is created.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl ClientEntry {
    /// The per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Effective identity: `name`, falling back to the endpoint.
    #[must_use]
    pub fn identity(&self) -> String {
        if self.name.is_empty() {
            self.endpoint.clone()
        } else {
            self.name.clone()
        }
    }
}

const fn protocol_name(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Http => "http",
        Protocol::Grpc => "grpc",
    }
}

/// An authenticator declaration (`security.authenticators.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthenticatorEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Authenticator type (`jwt`, `api_key`, ...).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Whether the entry is usable.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(AuthenticatorEntry, kind);

impl AuthenticatorEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            body: Map::new(),
        }
    }

    /// Sets one settings field.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    /// Decodes the type-specific settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the settings do not fit `T`.
    pub fn settings<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        decode_body(&self.body, None)
    }
}

/// An authorizer declaration (`security.authorizers.configs[]`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AuthorizerEntry {
    /// Instance name.
    #[serde(default)]
    pub name: String,
    /// Authorizer type (`rbac`, `allow_all`, `deny_all`, ...).
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Whether the entry is usable.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Type-specific settings.
    #[serde(flatten)]
    pub body: Map<String, Value>,
}
impl_entry!(AuthorizerEntry, kind);

impl AuthorizerEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            enabled: true,
            body: Map::new(),
        }
    }

    /// Sets one settings field.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    /// Decodes the type-specific settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Decode`] if the settings do not fit `T`.
    pub fn settings<T: DeserializeOwned + Default>(&self) -> Result<T, ConfigError> {
        decode_body(&self.body, None)
    }
}

/// A named policy: which authenticators and authorizer guard an operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyEntry {
    /// Policy name.
    pub name: String,
    /// Authenticator names, tried in order.
    #[serde(default)]
    pub authenticators: Vec<String>,
    /// Authorizer name.
    #[serde(default)]
    pub authorizer: String,
    /// Operations (exact or `prefix*`) routed to this policy.
    #[serde(default)]
    pub operations: Vec<String>,
    /// Opaque configuration handed to the policy factory.
    #[serde(default)]
    pub config: Value,
}

/// The `security` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SecurityConfig {
    /// Policy used when an operation has no route.
    #[serde(default)]
    pub default_policy: String,
    /// Accept `x-principal-proto` from upstream callers.
    #[serde(default)]
    pub trust_propagated_principal: bool,
    /// Authenticator instances.
    #[serde(default)]
    pub authenticators: ComponentGroup<AuthenticatorEntry>,
    /// Authorizer instances.
    #[serde(default)]
    pub authorizers: ComponentGroup<AuthorizerEntry>,
    /// Named policies.
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
    /// Extra operation → policy routes (exact or `prefix*`).
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
}

/// The `data` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataConfig {
    /// Caches.
    #[serde(default)]
    pub caches: ComponentGroup<CacheEntry>,
    /// Databases.
    #[serde(default)]
    pub databases: ComponentGroup<DatabaseEntry>,
    /// Object stores (`filestores` is accepted as an alias).
    #[serde(default, alias = "filestores")]
    pub object_stores: ComponentGroup<ObjectStoreEntry>,
}

/// The `servers` / `clients` sections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointGroup<E> {
    /// Declared endpoints.
    #[serde(default = "Vec::new")]
    pub configs: Vec<E>,
}

impl<E> Default for EndpointGroup<E> {
    fn default() -> Self {
        Self {
            configs: Vec::new(),
        }
    }
}

/// The whole document, typed. Used for validation; the container decodes
/// sections individually.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HarborConfig {
    /// Application identity.
    #[serde(default)]
    pub app: AppConfig,
    /// Logging.
    #[serde(default)]
    pub logger: LoggerConfig,
    /// Storage.
    #[serde(default)]
    pub data: DataConfig,
    /// Service registries.
    #[serde(default)]
    pub discoveries: ComponentGroup<DiscoveryEntry>,
    /// Middlewares.
    #[serde(default)]
    pub middlewares: ComponentGroup<MiddlewareEntry>,
    /// Servers.
    #[serde(default)]
    pub servers: EndpointGroup<ServerEntry>,
    /// Clients.
    #[serde(default)]
    pub clients: EndpointGroup<ClientEntry>,
    /// Security.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Generic components.
    #[serde(default)]
    pub components: ComponentGroup<ComponentEntry>,
}

impl HarborConfig {
    /// Validates identities across every group.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.data.caches.validate("data.caches")?;
        self.data.databases.validate("data.databases")?;
        self.data.object_stores.validate("data.object_stores")?;
        self.discoveries.validate("discoveries")?;
        self.middlewares.validate("middlewares")?;
        self.components.validate("components")?;
        self.security
            .authenticators
            .validate("security.authenticators")?;
        self.security.authorizers.validate("security.authorizers")?;

        for (i, policy) in self.security.policies.iter().enumerate() {
            if policy.name.is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("security.policies[{i}]"),
                    "policy needs a name",
                ));
            }
        }
        for (i, server) in self.servers.configs.iter().enumerate() {
            if server.timeout_ms == 0 {
                return Err(ConfigError::invalid_value(
                    format!("servers.configs[{i}].timeout_ms"),
                    "timeout must be positive",
                ));
            }
        }
        for (i, client) in self.clients.configs.iter().enumerate() {
            if client.identity().is_empty() {
                return Err(ConfigError::invalid_value(
                    format!("clients.configs[{i}]"),
                    "client needs a name or an endpoint",
                ));
            }
        }

        Ok(())
    }
}
