//! Middleware provider (`middlewares`).
//!
//! Builds the server and client chains from the configuration group on first
//! use and caches them until the next `set_config`. Middlewares registered by
//! hand run after the configured ones and survive reconfiguration.

use harbor_config::{ComponentGroup, MiddlewareEntry};
use harbor_core::{HarborResult, Options};
use harbor_middleware::{BoxedMiddleware, Chain, MiddlewareBuilder, Side};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
struct State {
    config: ComponentGroup<MiddlewareEntry>,
    options: Options,
    server: Option<Arc<Chain>>,
    client: Option<Arc<Chain>>,
    manual: Vec<(Side, String, BoxedMiddleware)>,
}

/// Lazily built, cached middleware chains.
pub struct MiddlewareProvider {
    builder: Arc<MiddlewareBuilder>,
    state: RwLock<State>,
}

impl fmt::Debug for MiddlewareProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("MiddlewareProvider")
            .field("entries", &state.config.configs.len())
            .field("server_built", &state.server.is_some())
            .field("client_built", &state.client.is_some())
            .field("manual", &state.manual.len())
            .finish_non_exhaustive()
    }
}

impl MiddlewareProvider {
    /// Creates a provider that builds chains with `builder`.
    #[must_use]
    pub fn new(builder: Arc<MiddlewareBuilder>) -> Self {
        Self {
            builder,
            state: RwLock::new(State::default()),
        }
    }

    /// The builder whose factories this provider uses.
    #[must_use]
    pub fn builder(&self) -> &Arc<MiddlewareBuilder> {
        &self.builder
    }

    /// Installs a new `middlewares` group; cached chains are dropped.
    pub fn set_config(&self, config: ComponentGroup<MiddlewareEntry>, options: Options) {
        let mut state = self.state.write();
        state.config = config;
        state.options = options;
        state.server = None;
        state.client = None;
    }

    /// Appends `middleware` to the server chain.
    pub fn register_server(&self, name: impl Into<String>, middleware: BoxedMiddleware) {
        self.register(Side::Server, name.into(), middleware);
    }

    /// Appends `middleware` to the client chain.
    pub fn register_client(&self, name: impl Into<String>, middleware: BoxedMiddleware) {
        self.register(Side::Client, name.into(), middleware);
    }

    fn register(&self, side: Side, name: String, middleware: BoxedMiddleware) {
        let mut state = self.state.write();
        state.manual.push((side, name, middleware));
        match side {
            Side::Server => state.server = None,
            Side::Client => state.client = None,
        }
    }

    /// The server chain.
    pub fn server(&self) -> HarborResult<Arc<Chain>> {
        self.chain(Side::Server)
    }

    /// The client chain.
    pub fn client(&self) -> HarborResult<Arc<Chain>> {
        self.chain(Side::Client)
    }

    /// Drops cached chains so the next access rebuilds them, e.g. after a
    /// factory was registered on the builder.
    pub fn invalidate(&self) {
        let mut state = self.state.write();
        state.server = None;
        state.client = None;
    }

    fn chain(&self, side: Side) -> HarborResult<Arc<Chain>> {
        {
            let state = self.state.read();
            if let Some(chain) = Self::slot(&state, side) {
                return Ok(Arc::clone(chain));
            }
        }

        let mut state = self.state.write();
        if let Some(chain) = Self::slot(&state, side) {
            return Ok(Arc::clone(chain));
        }

        let mut chain = self.builder.build(side, &state.config, &state.options)?;
        for (_, name, middleware) in state.manual.iter().filter(|(s, _, _)| *s == side) {
            chain.push(name.clone(), Arc::clone(middleware));
        }
        tracing::debug!(side = %side, chain = ?chain.names(), "middleware chain built");

        let chain = Arc::new(chain);
        match side {
            Side::Server => state.server = Some(Arc::clone(&chain)),
            Side::Client => state.client = Some(Arc::clone(&chain)),
        }
        Ok(chain)
    }

    fn slot(state: &State, side: Side) -> Option<&Arc<Chain>> {
        match side {
            Side::Server => state.server.as_ref(),
            Side::Client => state.client.as_ref(),
        }
    }
}
