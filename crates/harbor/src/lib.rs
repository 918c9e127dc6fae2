//! # Harbor
//!
//! **Configuration-driven component runtime for microservices**
//!
//! Harbor turns one structured configuration document into live, wired
//! infrastructure:
//!
//! - **Component container** – caches, databases, object stores, service
//!   registries and application components, built lazily from `data.*`,
//!   `discoveries` and `components`
//! - **Middleware chains** – ordered server and client chains from
//!   `middlewares`, with built-in logging, metadata, rate limiting, circuit
//!   breaking, JWT, CORS, metrics, validation and timeouts
//! - **Declarative security** – per-operation policies of authenticators and
//!   authorizers, with principal propagation across services
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use harbor::prelude::*;
//!
//! # async fn run() -> HarborResult<()> {
//! let config = ConfigLoader::new()
//!     .with_file("harbor.toml")?
//!     .with_env_prefix("HARBOR")
//!     .load()?;
//!
//! let container = Container::with_defaults(config, ComponentFactories::new(), &[]);
//! container.init_logging()?;
//! container.register_security_middleware()?;
//!
//! let chain = container.middlewares()?.server()?;
//! let sessions = container.default_cache("sessions")?;
//! # let _ = (chain, sessions);
//!
//! container.close().await
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! StructuredConfig ─► Container ─► Provider (per domain) ─► FactoryRegistry ─► instance
//!
//! Request → metadata → logging → security → ... → Handler
//!                                                   ↓
//! Response ←──────────── rendered errors ←──────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/harbor/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Errors, options and factory registries
pub use harbor_core as core;

// Structured configuration
pub use harbor_config as config;

// Logging and metrics
pub use harbor_telemetry as telemetry;

// Middleware chains
pub use harbor_middleware as middleware;

// Declarative security
pub use harbor_security as security;

// Providers and the container
pub use harbor_runtime as runtime;

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```rust
/// use harbor::prelude::*;
///
/// let options = Options::new().with(3_u8);
/// assert_eq!(options.value::<u8>(), Some(3));
/// ```
pub mod prelude {
    pub use harbor_core::{
        Error, ErrorKind, ErrorList, FactoryRegistry, HarborResult, Opt, Options, Partial,
    };

    pub use harbor_config::{ComponentGroup, ConfigEntry, ConfigLoader, StructuredConfig};

    pub use harbor_middleware::{
        BoxedMiddleware, Chain, Middleware, MiddlewareBuilder, MiddlewareContext,
        MiddlewareFactory, MiddlewareResult, Next, Request, Response, ResponseExt, Side,
    };

    pub use harbor_security::{
        decode_principal, encode_principal, principal_from_context, Policy, PolicyProvider,
        Principal, PUBLIC,
    };

    pub use harbor_runtime::{
        register_defaults, Cache, ComponentFactories, Container, Database, ObjectStore,
        ServiceInstance, ServiceRegistry,
    };
}
