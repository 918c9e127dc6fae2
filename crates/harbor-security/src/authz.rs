//! Authorizers.
//!
//! An [`Authorizer`] decides whether a principal may perform an action on an
//! operation. `Ok(false)` is a denial; `Err` means the decision could not be
//! made.

use crate::principal::Principal;
use async_trait::async_trait;
use harbor_config::{AuthorizerEntry, ConfigEntry};
use harbor_core::{DuplicatePolicy, FactoryRegistry, HarborResult, Options};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Action checked by the security middleware.
pub const ACCESS: &str = "access";

/// Makes authorization decisions.
#[async_trait]
pub trait Authorizer: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns whether `principal` may perform `action` on `operation`.
    async fn authorize(
        &self,
        principal: &Principal,
        operation: &str,
        action: &str,
    ) -> HarborResult<bool>;
}

/// Shared authorizer handle.
pub type SharedAuthorizer = Arc<dyn Authorizer>;

/// Builds an authorizer from its configuration entry.
pub type AuthorizerFactory =
    Arc<dyn Fn(&AuthorizerEntry, &Options) -> HarborResult<SharedAuthorizer> + Send + Sync>;

static REGISTRY: LazyLock<FactoryRegistry<AuthorizerFactory>> =
    LazyLock::new(|| FactoryRegistry::new("authorizer", DuplicatePolicy::Panic));

/// The process-wide authorizer factory registry.
pub fn registry() -> &'static FactoryRegistry<AuthorizerFactory> {
    &REGISTRY
}

/// Registers an authorizer factory for `kind`.
///
/// # Panics
///
/// Panics if `kind` is already registered.
pub fn register<F>(kind: &str, factory: F)
where
    F: Fn(&AuthorizerEntry, &Options) -> HarborResult<SharedAuthorizer> + Send + Sync + 'static,
{
    REGISTRY.register(kind, Arc::new(factory));
}

/// Builds the authorizer described by `entry`.
pub fn build(entry: &AuthorizerEntry, opts: &Options) -> HarborResult<SharedAuthorizer> {
    let factory = REGISTRY.require(&entry.kind)?;
    factory(entry, opts)
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    fn name(&self) -> &str {
        "allow_all"
    }

    async fn authorize(&self, _: &Principal, _: &str, _: &str) -> HarborResult<bool> {
        Ok(true)
    }
}

/// Denies everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct DenyAll;

#[async_trait]
impl Authorizer for DenyAll {
    fn name(&self) -> &str {
        "deny_all"
    }

    async fn authorize(&self, _: &Principal, _: &str, _: &str) -> HarborResult<bool> {
        Ok(false)
    }
}

/// `rbac` settings: role name → operation patterns.
///
/// A pattern is an exact operation, `*`, or a prefix ending in `*`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RbacSettings {
    /// Allowed operations per role.
    pub roles: HashMap<String, Vec<String>>,
}

/// Role-based access control.
#[derive(Debug, Clone, Default)]
pub struct RbacAuthorizer {
    name: String,
    role_permissions: HashMap<String, HashSet<String>>,
}

impl RbacAuthorizer {
    /// Creates an empty authorizer that denies everything.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role_permissions: HashMap::new(),
        }
    }

    /// Allows `role` to access `operations`.
    #[must_use]
    pub fn allow_role<S, I>(mut self, role: S, operations: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.role_permissions
            .entry(role.into())
            .or_default()
            .extend(operations.into_iter().map(Into::into));
        self
    }

    /// Factory registered under `rbac`.
    pub fn from_entry(entry: &AuthorizerEntry, _opts: &Options) -> HarborResult<SharedAuthorizer> {
        let settings: RbacSettings = entry.settings()?;
        let authorizer = settings
            .roles
            .into_iter()
            .fold(Self::new(entry.identity()), |acc, (role, ops)| {
                acc.allow_role(role, ops)
            });
        Ok(Arc::new(authorizer))
    }

    fn matches(pattern: &str, operation: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => operation.starts_with(prefix),
            None => pattern == operation,
        }
    }
}

#[async_trait]
impl Authorizer for RbacAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(
        &self,
        principal: &Principal,
        operation: &str,
        _action: &str,
    ) -> HarborResult<bool> {
        Ok(principal.roles().iter().any(|role| {
            self.role_permissions
                .get(role)
                .is_some_and(|patterns| patterns.iter().any(|p| Self::matches(p, operation)))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user(roles: &[&str]) -> Principal {
        Principal::builder("u").roles(roles.iter().copied()).build()
    }

    #[tokio::test]
    async fn test_rbac_exact_prefix_and_wildcard() {
        let rbac = RbacAuthorizer::new("rbac")
            .allow_role("admin", ["*"])
            .allow_role("reader", ["/orders.v1.Orders/Get", "/catalog.v1.*"]);

        assert!(rbac.authorize(&user(&["admin"]), "/x/Y", ACCESS).await.unwrap());
        assert!(rbac
            .authorize(&user(&["reader"]), "/orders.v1.Orders/Get", ACCESS)
            .await
            .unwrap());
        assert!(rbac
            .authorize(&user(&["reader"]), "/catalog.v1.Catalog/List", ACCESS)
            .await
            .unwrap());
        assert!(!rbac
            .authorize(&user(&["reader"]), "/orders.v1.Orders/Delete", ACCESS)
            .await
            .unwrap());
        assert!(!rbac.authorize(&user(&[]), "/x/Y", ACCESS).await.unwrap());
    }

    #[tokio::test]
    async fn test_rbac_from_entry() {
        let entry = AuthorizerEntry::new("roles", "rbac")
            .with_setting("roles", json!({ "ops": ["/admin.*"] }));
        let rbac = RbacAuthorizer::from_entry(&entry, &Options::new()).unwrap();
        assert_eq!(rbac.name(), "roles");
        assert!(rbac
            .authorize(&user(&["ops"]), "/admin.v1.Admin/Reset", ACCESS)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_allow_and_deny_all() {
        let p = user(&[]);
        assert!(AllowAll.authorize(&p, "op", ACCESS).await.unwrap());
        assert!(!DenyAll.authorize(&p, "op", ACCESS).await.unwrap());
    }
}
