//! Authenticators.
//!
//! An [`Authenticator`] turns a [`Credential`] into a [`Principal`]. The
//! [`CompositeAuthenticator`] delegates to the first member that supports the
//! credential type.
//!
//! Factories for configured authenticators live in a process-wide registry
//! keyed by `type`. Registering the same type twice panics.

use crate::credential::{types, Credential};
use crate::principal::{ClaimValue, Principal};
use async_trait::async_trait;
use harbor_config::{AuthenticatorEntry, ConfigEntry};
use harbor_core::{DuplicatePolicy, Error, FactoryRegistry, HarborResult, Options};
use harbor_middleware::stages::jwt::{JwtClaims, JwtCodec, JwtSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Verifies credentials.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Returns `true` if this authenticator understands `credential`.
    fn supports(&self, credential: &Credential) -> bool;

    /// Verifies `credential` and returns the principal it proves.
    async fn authenticate(&self, credential: &Credential) -> HarborResult<Principal>;
}

/// Shared authenticator handle.
pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// Builds an authenticator from its configuration entry.
pub type AuthenticatorFactory =
    Arc<dyn Fn(&AuthenticatorEntry, &Options) -> HarborResult<SharedAuthenticator> + Send + Sync>;

static REGISTRY: LazyLock<FactoryRegistry<AuthenticatorFactory>> =
    LazyLock::new(|| FactoryRegistry::new("authenticator", DuplicatePolicy::Panic));

/// The process-wide authenticator factory registry.
pub fn registry() -> &'static FactoryRegistry<AuthenticatorFactory> {
    &REGISTRY
}

/// Registers an authenticator factory for `kind`.
///
/// # Panics
///
/// Panics if `kind` is already registered.
pub fn register<F>(kind: &str, factory: F)
where
    F: Fn(&AuthenticatorEntry, &Options) -> HarborResult<SharedAuthenticator>
        + Send
        + Sync
        + 'static,
{
    REGISTRY.register(kind, Arc::new(factory));
}

/// Builds the authenticator described by `entry`.
pub fn build(entry: &AuthenticatorEntry, opts: &Options) -> HarborResult<SharedAuthenticator> {
    let factory = REGISTRY.require(&entry.kind)?;
    factory(entry, opts)
}

/// Validates HS256 bearer tokens.
#[derive(Debug, Clone)]
pub struct JwtAuthenticator {
    name: String,
    codec: JwtCodec,
}

impl JwtAuthenticator {
    /// Creates the authenticator.
    #[must_use]
    pub fn new(name: impl Into<String>, codec: JwtCodec) -> Self {
        Self {
            name: name.into(),
            codec,
        }
    }

    /// Factory registered under `jwt`.
    pub fn from_entry(entry: &AuthenticatorEntry, _opts: &Options) -> HarborResult<SharedAuthenticator> {
        let settings: JwtSettings = entry.settings()?;
        let codec = JwtCodec::from_settings(&settings)?;
        Ok(Arc::new(Self::new(entry.identity(), codec)))
    }

    fn principal_from_claims(claims: JwtClaims) -> Principal {
        let mut builder = Principal::builder(claims.sub)
            .roles(claims.roles)
            .permissions(claims.permissions);
        for scope in claims.scopes {
            builder = builder.scope(scope);
        }
        for (key, value) in &claims.extra {
            if let Some(claim) = ClaimValue::from_json(value) {
                builder = builder.claim(key.clone(), claim);
            }
        }
        builder.build()
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, credential: &Credential) -> bool {
        credential.kind() == types::BEARER
    }

    async fn authenticate(&self, credential: &Credential) -> HarborResult<Principal> {
        let token = credential.payload().token().ok_or_else(|| {
            Error::authentication("credential carries no token").with_module("jwt")
        })?;
        let claims = self.codec.verify(token)?;
        if claims.sub.is_empty() {
            return Err(Error::authentication("token has no subject").with_module("jwt"));
        }
        Ok(Self::principal_from_claims(claims))
    }
}

/// Identity bound to an API key.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ApiKeyIdentity {
    /// Principal id.
    pub subject: String,
    /// Roles.
    pub roles: Vec<String>,
    /// Permissions.
    pub permissions: Vec<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

/// `api_key` settings: key material → identity.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ApiKeySettings {
    /// Known keys.
    pub keys: HashMap<String, ApiKeyIdentity>,
}

/// Looks API keys up in a static table.
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    name: String,
    keys: HashMap<String, ApiKeyIdentity>,
}

impl fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthenticator")
            .field("name", &self.name)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl ApiKeyAuthenticator {
    /// Creates the authenticator.
    #[must_use]
    pub fn new(name: impl Into<String>, keys: HashMap<String, ApiKeyIdentity>) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }

    /// Factory registered under `api_key`.
    pub fn from_entry(entry: &AuthenticatorEntry, _opts: &Options) -> HarborResult<SharedAuthenticator> {
        let settings: ApiKeySettings = entry.settings()?;
        if let Some((_, identity)) = settings.keys.iter().find(|(_, id)| id.subject.is_empty()) {
            return Err(Error::validation(format!(
                "api key entry for roles {:?} has no subject",
                identity.roles
            ))
            .with_module("api_key"));
        }
        Ok(Arc::new(Self::new(entry.identity(), settings.keys)))
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, credential: &Credential) -> bool {
        credential.kind() == types::API_KEY
    }

    async fn authenticate(&self, credential: &Credential) -> HarborResult<Principal> {
        let key = credential.payload().key().unwrap_or_else(|| credential.raw());
        let identity = self
            .keys
            .get(key)
            .ok_or_else(|| Error::authentication("unknown api key").with_module("api_key"))?;

        let mut builder = Principal::builder(identity.subject.clone())
            .roles(identity.roles.iter().cloned())
            .permissions(identity.permissions.iter().cloned());
        for scope in &identity.scopes {
            builder = builder.scope(scope.clone());
        }
        Ok(builder.build())
    }
}

/// Delegates to the first member supporting the credential type.
#[derive(Debug, Clone, Default)]
pub struct CompositeAuthenticator {
    authenticators: Vec<SharedAuthenticator>,
}

impl CompositeAuthenticator {
    /// Creates the composite; order decides precedence.
    #[must_use]
    pub fn new(authenticators: Vec<SharedAuthenticator>) -> Self {
        Self { authenticators }
    }

    /// Members in precedence order.
    #[must_use]
    pub fn members(&self) -> &[SharedAuthenticator] {
        &self.authenticators
    }
}

#[async_trait]
impl Authenticator for CompositeAuthenticator {
    fn name(&self) -> &str {
        "composite"
    }

    fn supports(&self, credential: &Credential) -> bool {
        self.authenticators.iter().any(|a| a.supports(credential))
    }

    async fn authenticate(&self, credential: &Credential) -> HarborResult<Principal> {
        let Some(authenticator) = self.authenticators.iter().find(|a| a.supports(credential))
        else {
            return Err(Error::authentication(format!(
                "no authenticator found for credential type '{}'",
                credential.kind()
            ))
            .with_module("security"));
        };
        tracing::trace!(authenticator = authenticator.name(), "delegating authentication");
        authenticator.authenticate(credential).await
    }
}
