//! Database domain (`data.databases`).
//!
//! No driver ships with the runtime; applications register one per dialect.
//!
//! ```ignore
//! harbor_runtime::database::register("postgres", |entry, _opts| {
//!     Ok(Arc::new(PgDatabase::lazy(entry.identity(), &entry.source, &entry.pool)?))
//! });
//! ```

use crate::provider::{InstanceFactory, InstanceRegistry, Provider};
use async_trait::async_trait;
use harbor_config::DatabaseEntry;
use harbor_core::{DuplicatePolicy, HarborResult, Options};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Registry domain name.
pub const DOMAIN: &str = "database";

/// A database handle.
#[async_trait]
pub trait Database: Send + Sync + fmt::Debug {
    /// Instance name.
    fn name(&self) -> &str;

    /// SQL dialect or driver name.
    fn dialect(&self) -> &str;

    /// Connection source, as configured.
    fn source(&self) -> &str;

    /// Checks connectivity.
    async fn ping(&self) -> HarborResult<()>;

    /// Closes every pooled connection.
    async fn close(&self) -> HarborResult<()>;
}

/// Shared database handle.
pub type SharedDatabase = Arc<dyn Database>;

/// Database provider.
pub type DatabaseProvider = Provider<DatabaseEntry, SharedDatabase>;

static REGISTRY: LazyLock<Arc<InstanceRegistry<DatabaseEntry, SharedDatabase>>> =
    LazyLock::new(|| Arc::new(InstanceRegistry::new(DOMAIN, DuplicatePolicy::Panic)));

/// The process-wide database driver registry.
pub fn registry() -> Arc<InstanceRegistry<DatabaseEntry, SharedDatabase>> {
    Arc::clone(&REGISTRY)
}

/// Registers a driver for `dialect`.
///
/// # Panics
///
/// Panics if `dialect` is already registered.
pub fn register<F>(dialect: &str, factory: F)
where
    F: Fn(&DatabaseEntry, &Options) -> HarborResult<SharedDatabase> + Send + Sync + 'static,
{
    let factory: InstanceFactory<DatabaseEntry, SharedDatabase> = Arc::new(factory);
    REGISTRY.register(dialect, factory);
}

/// Creates a provider over the process-wide registry.
#[must_use]
pub fn provider() -> DatabaseProvider {
    Provider::new(DOMAIN, registry())
}
