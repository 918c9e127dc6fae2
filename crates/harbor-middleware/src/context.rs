//! Per-call middleware context.
//!
//! The [`MiddlewareContext`] carries state through a chain: the request id,
//! the logical operation, the chain side, typed extensions (the
//! authenticated principal lives here) and a cancellation token.

use crate::types::Side;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Header carrying the request id between services.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Context that flows through a middleware chain.
///
/// # Example
///
/// ```
/// use harbor_middleware::context::MiddlewareContext;
///
/// #[derive(Clone)]
/// struct Tenant(String);
///
/// let mut ctx = MiddlewareContext::server("/orders.v1.Orders/Create");
/// ctx.set_extension(Tenant("acme".to_string()));
///
/// assert_eq!(ctx.operation(), "/orders.v1.Orders/Create");
/// assert_eq!(ctx.get_extension::<Tenant>().unwrap().0, "acme");
/// ```
#[derive(Debug)]
pub struct MiddlewareContext {
    request_id: String,
    side: Side,
    operation: String,
    route_template: Option<String>,
    started_at: Instant,
    cancellation: CancellationToken,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MiddlewareContext {
    /// Creates a context for `side` with a fresh UUID v7 request id.
    #[must_use]
    pub fn new(side: Side, operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::now_v7().to_string(),
            side,
            operation: operation.into(),
            route_template: None,
            started_at: Instant::now(),
            cancellation: CancellationToken::new(),
            extensions: HashMap::new(),
        }
    }

    /// Creates a server-side context.
    #[must_use]
    pub fn server(operation: impl Into<String>) -> Self {
        Self::new(Side::Server, operation)
    }

    /// Creates a client-side context.
    #[must_use]
    pub fn client(operation: impl Into<String>) -> Self {
        Self::new(Side::Client, operation)
    }

    /// Uses a caller-provided request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Sets the matched route template.
    #[must_use]
    pub fn with_route_template(mut self, template: impl Into<String>) -> Self {
        self.route_template = Some(template.into());
        self
    }

    /// Binds the context to a caller's cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Sets the request id.
    pub fn set_request_id(&mut self, request_id: impl Into<String>) {
        self.request_id = request_id.into();
    }

    /// Returns the chain side.
    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    /// Returns the logical operation identifier.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Sets the operation identifier.
    pub fn set_operation(&mut self, operation: impl Into<String>) {
        self.operation = operation.into();
    }

    /// Returns the matched route template, if any.
    #[must_use]
    pub fn route_template(&self) -> Option<&str> {
        self.route_template.as_deref()
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` once the caller cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Returns when processing started.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since processing started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Number of stored extensions.
    #[must_use]
    pub fn extension_count(&self) -> usize {
        self.extensions.len()
    }
}
