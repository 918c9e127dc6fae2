//! Security policies and the policy provider.
//!
//! A [`Policy`] pairs an authenticator with an authorizer. The
//! [`PolicyProvider`] knows how to build each named policy, memoizes the
//! built instances and routes operations to policy names.
//!
//! Per policy name the provider moves through
//! `unregistered → registered (factory only) → instantiated`. An instantiated
//! policy is never replaced; re-registering its factory only affects a
//! provider that has not built it yet.
//!
//! # Routing
//!
//! [`PolicyProvider::policy_name_for_operation`] checks, in order: an exact
//! route, the longest matching `prefix*` route, the provider's default
//! policy. [`PUBLIC`] bypasses all checks.

use crate::authn::{self, CompositeAuthenticator, SharedAuthenticator};
use crate::authz::{self, AllowAll, SharedAuthorizer};
use crate::credential::Credential;
use crate::principal::Principal;
use harbor_config::{ConfigEntry, PolicyEntry, SecurityConfig};
use harbor_core::{Error, ErrorList, HarborResult, Options};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Policy name that skips authentication and authorization.
pub const PUBLIC: &str = "public";

/// An authenticator and an authorizer under one name.
#[derive(Debug, Clone)]
pub struct Policy {
    name: String,
    authenticator: SharedAuthenticator,
    authorizer: SharedAuthorizer,
}

impl Policy {
    /// Creates a policy.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        authenticator: SharedAuthenticator,
        authorizer: SharedAuthorizer,
    ) -> Self {
        Self {
            name: name.into(),
            authenticator,
            authorizer,
        }
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authenticates `credential`.
    pub async fn authenticate(&self, credential: &Credential) -> HarborResult<Principal> {
        self.authenticator.authenticate(credential).await
    }

    /// Authorizes `principal` for `action` on `operation`.
    pub async fn authorize(
        &self,
        principal: &Principal,
        operation: &str,
        action: &str,
    ) -> HarborResult<bool> {
        self.authorizer.authorize(principal, operation, action).await
    }
}

/// Builds a policy from its raw configuration blob.
pub type PolicyFactory = Arc<dyn Fn(&Value) -> HarborResult<Arc<Policy>> + Send + Sync>;

#[derive(Default)]
struct State {
    factories: HashMap<String, PolicyFactory>,
    policies: HashMap<String, Arc<Policy>>,
    configs: HashMap<String, Value>,
    exact_routes: HashMap<String, String>,
    prefix_routes: Vec<(String, String)>,
    default_policy: String,
}

/// Owns policy factories, built policies and operation routing.
#[derive(Default)]
pub struct PolicyProvider {
    state: RwLock<State>,
}

impl fmt::Debug for PolicyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        let mut factories: Vec<&String> = state.factories.keys().collect();
        factories.sort();
        let mut policies: Vec<&String> = state.policies.keys().collect();
        policies.sort();
        f.debug_struct("PolicyProvider")
            .field("factories", &factories)
            .field("policies", &policies)
            .field("default_policy", &state.default_policy)
            .finish_non_exhaustive()
    }
}

impl PolicyProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider configured from the `security` section.
    pub fn from_config(config: &SecurityConfig, opts: &Options) -> HarborResult<Self> {
        let provider = Self::new();
        provider.configure(config, opts)?;
        Ok(provider)
    }

    /// Registers how to build `name`.
    pub fn register_factory<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&Value) -> HarborResult<Arc<Policy>> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut state = self.state.write();
        if state.policies.contains_key(&name) {
            tracing::warn!(policy = %name, "policy already instantiated, new factory only applies after restart");
        }
        state.factories.insert(name, Arc::new(factory));
    }

    /// Registers an already built policy. It is not replaced if `name` was
    /// already instantiated.
    pub fn register_policy(&self, policy: Policy) {
        let mut state = self.state.write();
        let name = policy.name().to_string();
        if state.policies.contains_key(&name) {
            tracing::warn!(policy = %name, "policy already instantiated, keeping existing instance");
            return;
        }
        state.policies.insert(name, Arc::new(policy));
    }

    /// Stores the raw configuration handed to `name`'s factory.
    pub fn set_config(&self, name: impl Into<String>, config: Value) {
        self.state.write().configs.insert(name.into(), config);
    }

    /// Routes `pattern` to `policy`. A pattern ending in `*` matches by prefix.
    pub fn add_route(&self, pattern: impl Into<String>, policy: impl Into<String>) {
        let mut state = self.state.write();
        let State {
            exact_routes,
            prefix_routes,
            ..
        } = &mut *state;
        insert_route(exact_routes, prefix_routes, pattern.into(), policy.into());
    }

    /// Sets the policy used for operations without a route.
    pub fn set_default_policy(&self, name: impl Into<String>) {
        self.state.write().default_policy = name.into();
    }

    /// The provider's default policy name; may be empty.
    #[must_use]
    pub fn default_policy(&self) -> String {
        self.state.read().default_policy.clone()
    }

    /// Resolves the policy name for `operation`. Empty means "unrouted and
    /// no default".
    #[must_use]
    pub fn policy_name_for_operation(&self, operation: &str) -> String {
        let state = self.state.read();
        if let Some(name) = state.exact_routes.get(operation) {
            return name.clone();
        }
        state
            .prefix_routes
            .iter()
            .find(|(prefix, _)| operation.starts_with(prefix.as_str()))
            .map_or_else(|| state.default_policy.clone(), |(_, name)| name.clone())
    }

    /// Returns `true` if `name` has been built.
    #[must_use]
    pub fn is_instantiated(&self, name: &str) -> bool {
        self.state.read().policies.contains_key(name)
    }

    /// Returns the policy `name`, building it on first use.
    ///
    /// Fails with not-found when no factory is registered for `name`.
    pub fn get_policy(&self, name: &str) -> HarborResult<Arc<Policy>> {
        if let Some(policy) = self.state.read().policies.get(name) {
            return Ok(Arc::clone(policy));
        }

        let mut state = self.state.write();
        if let Some(policy) = state.policies.get(name) {
            return Ok(Arc::clone(policy));
        }

        let factory = state.factories.get(name).cloned().ok_or_else(|| {
            Error::not_found(format!("security policy '{name}' is not registered"))
                .with_module("security")
                .with_metadata("policy", name)
        })?;
        let config = state.configs.get(name).cloned().unwrap_or(Value::Null);
        let policy = factory(&config).map_err(|e| {
            e.with_module("security").with_metadata("policy", name)
        })?;

        tracing::debug!(policy = %name, "security policy instantiated");
        state.policies.insert(name.to_string(), Arc::clone(&policy));
        Ok(policy)
    }

    /// Installs authenticators, authorizers, policies and routes from the
    /// `security` section.
    ///
    /// The route tables and the default policy are replaced by the section's,
    /// so a reconfiguration drops routes the section no longer names. Policies
    /// already instantiated stay as they are. Every failing entry is
    /// reported; the others are still installed.
    pub fn configure(&self, config: &SecurityConfig, opts: &Options) -> HarborResult<()> {
        crate::register_builtins();
        let mut errors = ErrorList::new();

        let mut authenticators: HashMap<String, SharedAuthenticator> = HashMap::new();
        for entry in config.authenticators.enabled_entries() {
            match authn::build(entry, opts) {
                Ok(a) => {
                    authenticators.insert(entry.identity().to_string(), a);
                }
                Err(e) => errors.push(e.with_metadata("authenticator", entry.identity())),
            }
        }

        let mut authorizers: HashMap<String, SharedAuthorizer> = HashMap::new();
        for entry in config.authorizers.enabled_entries() {
            match authz::build(entry, opts) {
                Ok(a) => {
                    authorizers.insert(entry.identity().to_string(), a);
                }
                Err(e) => errors.push(e.with_metadata("authorizer", entry.identity())),
            }
        }

        let mut exact_routes = HashMap::new();
        let mut prefix_routes = Vec::new();
        for entry in &config.policies {
            match compose_policy(entry, &authenticators, &authorizers) {
                Ok(factory) => {
                    self.register_factory(entry.name.clone(), move |_| Ok(Arc::clone(&factory)));
                    if !entry.config.is_null() {
                        self.set_config(entry.name.clone(), entry.config.clone());
                    }
                    for operation in &entry.operations {
                        insert_route(
                            &mut exact_routes,
                            &mut prefix_routes,
                            operation.clone(),
                            entry.name.clone(),
                        );
                    }
                }
                Err(e) => errors.push(e.with_metadata("policy", entry.name.as_str())),
            }
        }
        for (operation, policy) in &config.routes {
            insert_route(&mut exact_routes, &mut prefix_routes, operation.clone(), policy.clone());
        }

        {
            let mut state = self.state.write();
            state.exact_routes = exact_routes;
            state.prefix_routes = prefix_routes;
            state.default_policy = config.default_policy.clone();
        }

        tracing::debug!(
            authenticators = authenticators.len(),
            authorizers = authorizers.len(),
            policies = config.policies.len(),
            errors = errors.len(),
            "security configured"
        );
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::from(errors))
        }
    }
}

fn insert_route(
    exact_routes: &mut HashMap<String, String>,
    prefix_routes: &mut Vec<(String, String)>,
    pattern: String,
    policy: String,
) {
    if let Some(prefix) = pattern.strip_suffix('*') {
        let prefix = prefix.to_string();
        prefix_routes.retain(|(p, _)| *p != prefix);
        prefix_routes.push((prefix, policy));
        prefix_routes.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
    } else {
        exact_routes.insert(pattern, policy);
    }
}

fn compose_policy(
    entry: &PolicyEntry,
    authenticators: &HashMap<String, SharedAuthenticator>,
    authorizers: &HashMap<String, SharedAuthorizer>,
) -> HarborResult<Arc<Policy>> {
    if entry.name.is_empty() {
        return Err(Error::validation("security policy needs a name").with_module("security"));
    }
    if entry.name == PUBLIC {
        return Err(Error::validation("'public' is reserved and cannot be defined")
            .with_module("security"));
    }

    let mut members = Vec::with_capacity(entry.authenticators.len());
    for name in &entry.authenticators {
        let authenticator = authenticators.get(name).ok_or_else(|| {
            Error::not_found(format!("authenticator '{name}' is not configured"))
                .with_module("security")
        })?;
        members.push(Arc::clone(authenticator));
    }
    if members.is_empty() {
        return Err(Error::validation(format!(
            "policy '{}' lists no authenticators",
            entry.name
        ))
        .with_module("security"));
    }
    let authenticator: SharedAuthenticator = if members.len() == 1 {
        members.remove(0)
    } else {
        Arc::new(CompositeAuthenticator::new(members))
    };

    let authorizer: SharedAuthorizer = if entry.authorizer.is_empty() {
        Arc::new(AllowAll)
    } else {
        let authorizer = authorizers.get(&entry.authorizer).ok_or_else(|| {
            Error::not_found(format!("authorizer '{}' is not configured", entry.authorizer))
                .with_module("security")
        })?;
        Arc::clone(authorizer)
    };

    Ok(Arc::new(Policy::new(entry.name.clone(), authenticator, authorizer)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::DenyAll;
    use harbor_config::{AuthenticatorEntry, AuthorizerEntry, ComponentGroup};
    use harbor_core::ErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deny_policy(name: &str) -> Arc<Policy> {
        Arc::new(Policy::new(
            name,
            Arc::new(CompositeAuthenticator::default()),
            Arc::new(DenyAll),
        ))
    }

    #[test]
    fn test_routing_order() {
        let provider = PolicyProvider::new();
        provider.add_route("/health.v1.Health/Check", PUBLIC);
        provider.add_route("/orders.*", "orders");
        provider.add_route("/orders.v1.Admin*", "admin");
        provider.set_default_policy("default");

        assert_eq!(provider.policy_name_for_operation("/health.v1.Health/Check"), PUBLIC);
        assert_eq!(provider.policy_name_for_operation("/orders.v1.Orders/Get"), "orders");
        assert_eq!(provider.policy_name_for_operation("/orders.v1.Admin/Reset"), "admin");
        assert_eq!(provider.policy_name_for_operation("/other/Op"), "default");
        assert_eq!(PolicyProvider::new().policy_name_for_operation("/x"), "");
    }

    #[test]
    fn test_get_policy_builds_once() {
        let provider = PolicyProvider::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        provider.set_config("strict", json!({ "level": 3 }));
        provider.register_factory("strict", move |config| {
            assert_eq!(config["level"], 3);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(deny_policy("strict"))
        });

        assert!(!provider.is_instantiated("strict"));
        let a = provider.get_policy("strict").unwrap();
        let b = provider.get_policy("strict").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(provider.is_instantiated("strict"));
    }

    #[test]
    fn test_instantiated_policy_is_not_replaced() {
        let provider = PolicyProvider::new();
        provider.register_factory("p", |_| Ok(deny_policy("p")));
        let first = provider.get_policy("p").unwrap();

        provider.register_factory("p", |_| Ok(deny_policy("p")));
        provider.register_policy(Policy::new(
            "p",
            Arc::new(CompositeAuthenticator::default()),
            Arc::new(AllowAll),
        ));
        assert!(Arc::ptr_eq(&first, &provider.get_policy("p").unwrap()));
    }

    #[test]
    fn test_unknown_policy_is_not_found() {
        let err = PolicyProvider::new().get_policy("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_concurrent_first_use_builds_once() {
        let provider = Arc::new(PolicyProvider::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        provider.register_factory("p", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(deny_policy("p"))
        });

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let provider = Arc::clone(&provider);
                std::thread::spawn(move || provider.get_policy("p").map(|p| p.name().to_string()))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), "p");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_configure_from_security_section() {
        let config = SecurityConfig {
            default_policy: "members".into(),
            authenticators: ComponentGroup::with_configs(vec![AuthenticatorEntry::new(
                "tokens", "jwt",
            )
            .with_setting("secret", json!("s3cret"))]),
            authorizers: ComponentGroup::with_configs(vec![AuthorizerEntry::new("roles", "rbac")
                .with_setting("roles", json!({ "member": ["*"] }))]),
            policies: vec![PolicyEntry {
                name: "members".into(),
                authenticators: vec!["tokens".into()],
                authorizer: "roles".into(),
                operations: vec!["/members.*".into()],
                config: Value::Null,
            }],
            routes: [("/health.v1.Health/Check".to_string(), PUBLIC.to_string())].into(),
            ..SecurityConfig::default()
        };

        let provider = PolicyProvider::from_config(&config, &Options::new()).unwrap();
        assert_eq!(provider.policy_name_for_operation("/members.v1.M/Get"), "members");
        assert_eq!(provider.policy_name_for_operation("/health.v1.Health/Check"), PUBLIC);
        assert_eq!(provider.policy_name_for_operation("/x"), "members");
        assert_eq!(provider.get_policy("members").unwrap().name(), "members");
    }

    #[test]
    fn test_reconfigure_replaces_routes_and_default() {
        let config = SecurityConfig {
            default_policy: "members".into(),
            authenticators: ComponentGroup::with_configs(vec![AuthenticatorEntry::new(
                "tokens", "jwt",
            )
            .with_setting("secret", json!("s3cret"))]),
            policies: vec![PolicyEntry {
                name: "members".into(),
                authenticators: vec!["tokens".into()],
                operations: vec!["/members.*".into()],
                ..PolicyEntry::default()
            }],
            routes: [("/admin.v1.Admin/Reset".to_string(), PUBLIC.to_string())].into(),
            ..SecurityConfig::default()
        };
        let provider = PolicyProvider::from_config(&config, &Options::new()).unwrap();
        let members = provider.get_policy("members").unwrap();
        assert_eq!(provider.policy_name_for_operation("/admin.v1.Admin/Reset"), PUBLIC);

        provider
            .configure(&SecurityConfig::default(), &Options::new())
            .unwrap();
        assert_eq!(provider.policy_name_for_operation("/admin.v1.Admin/Reset"), "");
        assert_eq!(provider.policy_name_for_operation("/members.v1.M/Get"), "");
        assert_eq!(provider.default_policy(), "");
        assert!(Arc::ptr_eq(&members, &provider.get_policy("members").unwrap()));
    }

    #[test]
    fn test_configure_reports_broken_policies() {
        let config = SecurityConfig {
            policies: vec![
                PolicyEntry {
                    name: "a".into(),
                    authenticators: vec!["missing".into()],
                    ..PolicyEntry::default()
                },
                PolicyEntry {
                    name: PUBLIC.into(),
                    authenticators: vec!["missing".into()],
                    ..PolicyEntry::default()
                },
            ],
            ..SecurityConfig::default()
        };
        let err = PolicyProvider::new()
            .configure(&config, &Options::new())
            .unwrap_err();
        assert_eq!(err.metadata()["errors"], "2");
    }
}
