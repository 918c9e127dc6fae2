//! Building chains from the `middlewares` configuration group.
//!
//! For each side the builder walks `configs[]` in declaration order, skips
//! disabled entries, looks up the factory by `type` and keeps whatever the
//! factory produces for that side. `selector` entries are not middlewares:
//! their `includes` / `excludes` lists filter the assembled chain.

use crate::chain::Chain;
use crate::factory::{MiddlewareFactory, SharedMiddlewareFactory};
use crate::stages::{self, selector::SelectorSettings};
use crate::types::Side;
use harbor_config::{ComponentGroup, ConfigEntry, MiddlewareEntry};
use harbor_core::{DuplicatePolicy, Error, ErrorList, FactoryRegistry, HarborResult, Opt, Options};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// Registry domain of middleware factories.
pub const DOMAIN: &str = "middleware";

static GLOBAL: LazyLock<MiddlewareBuilder> = LazyLock::new(MiddlewareBuilder::with_defaults);

/// Registry of middleware factories plus chain composition.
///
/// Registering a type twice replaces the earlier factory with a warning.
#[derive(Debug)]
pub struct MiddlewareBuilder {
    factories: FactoryRegistry<SharedMiddlewareFactory>,
}

impl Default for MiddlewareBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MiddlewareBuilder {
    /// Creates a builder with no factories.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: FactoryRegistry::new(DOMAIN, DuplicatePolicy::Overwrite),
        }
    }

    /// Creates a builder with the built-in middleware types registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let builder = Self::new();
        stages::register_defaults(&builder);
        builder
    }

    /// The process-wide builder, pre-loaded with the built-in types.
    pub fn global() -> &'static MiddlewareBuilder {
        &GLOBAL
    }

    /// Registers a factory for `kind`.
    pub fn register(&self, kind: impl Into<String>, factory: impl MiddlewareFactory) {
        self.factories.register(kind, Arc::new(factory));
    }

    /// Registers an already shared factory.
    pub fn register_shared(&self, kind: impl Into<String>, factory: SharedMiddlewareFactory) {
        self.factories.register(kind, factory);
    }

    /// Returns the factory for `kind`.
    #[must_use]
    pub fn factory(&self, kind: &str) -> Option<SharedMiddlewareFactory> {
        self.factories.get(kind)
    }

    /// Registered types, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.factories.names()
    }

    /// Builds the server chain.
    pub fn build_server(
        &self,
        cfg: &ComponentGroup<MiddlewareEntry>,
        opts: &[Opt],
    ) -> HarborResult<Chain> {
        self.build(Side::Server, cfg, &Options::new().apply(opts))
    }

    /// Builds the client chain.
    pub fn build_client(
        &self,
        cfg: &ComponentGroup<MiddlewareEntry>,
        opts: &[Opt],
    ) -> HarborResult<Chain> {
        self.build(Side::Client, cfg, &Options::new().apply(opts))
    }

    /// Builds the chain for `side` with an already assembled option carrier.
    pub fn build(
        &self,
        side: Side,
        cfg: &ComponentGroup<MiddlewareEntry>,
        opts: &Options,
    ) -> HarborResult<Chain> {
        let mut errors = check_unique_names(cfg);
        let mut chain = Chain::new(side);
        let mut selectors = Vec::new();

        for entry in cfg.enabled_entries() {
            let name = entry.identity();

            if entry.kind == stages::kinds::SELECTOR {
                match entry.settings::<SelectorSettings>() {
                    Ok(selector) => selectors.push(selector),
                    Err(e) => errors.push(Error::from(e).with_module(DOMAIN)),
                }
                continue;
            }

            let factory = match self.factories.require(&entry.kind) {
                Ok(factory) => factory,
                Err(e) => {
                    errors.push(e.with_metadata("entry", name));
                    continue;
                }
            };

            let built = match side {
                Side::Server => factory.new_server(entry, opts),
                Side::Client => factory.new_client(entry, opts),
            };

            match built {
                Ok(Some(middleware)) => {
                    tracing::debug!(side = %side, middleware = %name, kind = %entry.kind, "middleware added");
                    chain.push(name, middleware);
                }
                Ok(None) => {
                    tracing::trace!(side = %side, middleware = %name, "no middleware for this side");
                }
                Err(e) => {
                    tracing::warn!(side = %side, middleware = %name, error = %e, "middleware construction failed");
                    errors.push(
                        e.with_module(DOMAIN)
                            .with_metadata("entry", name)
                            .with_metadata("side", side.as_str()),
                    );
                }
            }
        }

        if !errors.is_empty() {
            return Err(Error::from(errors));
        }

        Ok(selectors
            .iter()
            .fold(chain, |chain, selector| selector.apply(chain)))
    }
}

fn check_unique_names(cfg: &ComponentGroup<MiddlewareEntry>) -> ErrorList {
    let mut seen = HashSet::new();
    let mut errors = ErrorList::new();
    for entry in &cfg.configs {
        let name = entry.identity();
        if !seen.insert(name) {
            errors.push(
                Error::conflict(format!("middleware name '{name}' is declared more than once"))
                    .with_module(DOMAIN)
                    .with_metadata("entry", name),
            );
        }
    }
    errors
}
