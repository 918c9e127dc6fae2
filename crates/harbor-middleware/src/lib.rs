//! # Harbor Middleware
//!
//! Configuration-driven middleware chains for Harbor services and clients.
//!
//! Each entry of the `middlewares` group names a middleware type. The
//! [`MiddlewareBuilder`] looks up the factory registered for that type and
//! asks it for a server-side and a client-side middleware; a factory may
//! produce either, both or neither. The resulting [`Chain`]s preserve the
//! declaration order, with the first entry running outermost.
//!
//! ```text
//! [[middlewares.configs]]      server chain          client chain
//! type = "logging"        ->   logging          ->   logging
//! type = "rate_limiter"   ->   rate_limiter          (no client form)
//! type = "metadata"       ->   metadata         ->   metadata
//! ```
//!
//! ## Example
//!
//! ```
//! use harbor_config::{ComponentGroup, MiddlewareEntry};
//! use harbor_middleware::MiddlewareBuilder;
//!
//! let cfg = ComponentGroup::with_configs(vec![
//!     MiddlewareEntry::new("", "logging"),
//!     MiddlewareEntry::new("", "rate_limiter"),
//! ]);
//!
//! let builder = MiddlewareBuilder::with_defaults();
//! let server = builder.build_server(&cfg, &[]).unwrap();
//! let client = builder.build_client(&cfg, &[]).unwrap();
//!
//! assert_eq!(server.names(), vec!["logging", "rate_limiter"]);
//! assert_eq!(client.names(), vec!["logging"]);
//! ```
//!
//! Errors raised inside a chain are structured [`harbor_core::Error`]s;
//! [`Chain::serve`] renders them for HTTP or gRPC with [`render_error`].

#![doc(html_root_url = "https://docs.rs/harbor-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod chain;
pub mod context;
pub mod factory;
pub mod middleware;
pub mod render;
pub mod stages;
pub mod types;

pub use builder::MiddlewareBuilder;
pub use chain::{Chain, ChainEntry};
pub use context::MiddlewareContext;
pub use factory::{FnFactory, MiddlewareFactory, SharedMiddlewareFactory};
pub use middleware::{BoxFuture, BoxedMiddleware, FnMiddleware, Middleware, Next};
pub use render::{error_from_response, render_error, Transport};
pub use types::{MiddlewareResult, Request, Response, ResponseExt, Side};
