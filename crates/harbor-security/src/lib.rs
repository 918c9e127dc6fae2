//! # Harbor Security
//!
//! Declarative authentication and authorization for Harbor services.
//!
//! Operations are routed to named [`Policy`] instances by a
//! [`PolicyProvider`]. The `security` middleware extracts a [`Credential`]
//! from the request, authenticates it into a [`Principal`], asks the policy's
//! authorizer for access and injects the principal into the middleware
//! context. Principals cross service boundaries as base64-encoded protobuf
//! in the `x-principal-proto` header.
//!
//! ## Example
//!
//! ```
//! use harbor_security::{
//!     Policy, PolicyProvider, SecurityServerMiddleware, PUBLIC,
//! };
//! use harbor_security::authn::CompositeAuthenticator;
//! use harbor_security::authz::AllowAll;
//! use std::sync::Arc;
//!
//! let provider = PolicyProvider::new();
//! provider.register_policy(Policy::new(
//!     "members",
//!     Arc::new(CompositeAuthenticator::default()),
//!     Arc::new(AllowAll),
//! ));
//! provider.add_route("/health.v1.Health/Check", PUBLIC);
//! provider.set_default_policy("members");
//!
//! assert_eq!(provider.policy_name_for_operation("/health.v1.Health/Check"), PUBLIC);
//! assert_eq!(provider.policy_name_for_operation("/orders.v1.Orders/Get"), "members");
//!
//! let _middleware = SecurityServerMiddleware::new(Arc::new(provider));
//! ```

pub mod authn;
pub mod authz;
pub mod credential;
pub mod extractor;
pub mod middleware;
pub mod policy;
pub mod principal;
pub mod proto;
pub mod request;

use std::sync::{Arc, Once};

pub use authn::{Authenticator, SharedAuthenticator};
pub use authz::{Authorizer, SharedAuthorizer, ACCESS};
pub use credential::{Credential, CredentialPayload, CredentialResponse};
pub use extractor::{CredentialExtractor, HeaderCredentialExtractor};
pub use middleware::{
    principal_from_context, reasons, register_security_middleware, SecurityClientMiddleware,
    SecurityFactory, SecurityServerMiddleware, SecuritySettings,
};
pub use policy::{Policy, PolicyFactory, PolicyProvider, PUBLIC};
pub use principal::{decode_principal, encode_principal, ClaimValue, Principal, PRINCIPAL_HEADER};
pub use request::{request_source, RequestKind, RequestSource};

static BUILTINS: Once = Once::new();

/// Registers the built-in authenticator and authorizer types.
///
/// | Registry | Types |
/// |----------|-------|
/// | authenticator | `jwt`, `api_key` |
/// | authorizer | `rbac`, `allow_all`, `deny_all` |
///
/// Safe to call any number of times.
pub fn register_builtins() {
    BUILTINS.call_once(|| {
        authn::register("jwt", authn::JwtAuthenticator::from_entry);
        authn::register("api_key", authn::ApiKeyAuthenticator::from_entry);

        authz::register("rbac", authz::RbacAuthorizer::from_entry);
        authz::register("allow_all", |_, _| Ok(Arc::new(authz::AllowAll) as SharedAuthorizer));
        authz::register("deny_all", |_, _| Ok(Arc::new(authz::DenyAll) as SharedAuthorizer));

        tracing::debug!("security builtins registered");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_builtins_is_idempotent() {
        register_builtins();
        register_builtins();
        assert!(authn::registry().contains("jwt"));
        assert!(authn::registry().contains("api_key"));
        for kind in ["rbac", "allow_all", "deny_all"] {
            assert!(authz::registry().contains(kind));
        }
    }
}
