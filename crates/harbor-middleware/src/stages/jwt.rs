//! HS256 bearer tokens.
//!
//! Server side: validates `Authorization: Bearer <jwt>` and stores the
//! decoded [`JwtClaims`] in the context. Client side: signs a short-lived
//! token for the configured subject and attaches it to the outgoing call.

use crate::context::MiddlewareContext;
use crate::factory::MiddlewareFactory;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, Next};
use crate::types::{MiddlewareResult, Request};
use harbor_config::MiddlewareEntry;
use harbor_core::{Error, HarborResult, Options};
use http::{header, HeaderValue};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Reason for expired tokens.
pub const TOKEN_EXPIRED: &str = "TOKEN_EXPIRED";
/// Reason for tokens that fail validation.
pub const TOKEN_INVALID: &str = "TOKEN_INVALID";

/// Claims carried by Harbor tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    /// Subject (principal id).
    pub sub: String,
    /// Expiry, seconds since the epoch.
    pub exp: u64,
    /// Issued at, seconds since the epoch.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Roles.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Permissions.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub permissions: Vec<String>,
    /// Granted scopes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    /// Any other claims.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JwtClaims {
    /// Claims for `subject`, valid for `ttl` from now.
    #[must_use]
    pub fn for_subject(subject: impl Into<String>, ttl: Duration) -> Self {
        let now = unix_now();
        Self {
            sub: subject.into(),
            iat: now,
            exp: now + ttl.as_secs(),
            ..Self::default()
        }
    }

    /// Adds roles.
    #[must_use]
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `jwt` settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtSettings {
    /// Shared HS256 secret.
    pub secret: String,
    /// Expected / stamped issuer.
    pub issuer: Option<String>,
    /// Expected / stamped audience.
    pub audience: Option<String>,
    /// Clock skew tolerated when validating, in seconds.
    pub leeway_secs: u64,
    /// Lifetime of client-signed tokens, in seconds.
    pub ttl_secs: u64,
    /// Subject of client-signed tokens.
    pub subject: String,
    /// Roles stamped into client-signed tokens.
    pub roles: Vec<String>,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: None,
            audience: None,
            leeway_secs: 60,
            ttl_secs: 300,
            subject: String::new(),
            roles: Vec::new(),
        }
    }
}

/// Signs and verifies HS256 tokens.
#[derive(Clone)]
pub struct JwtCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: Option<String>,
    audience: Option<String>,
}

impl fmt::Debug for JwtCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtCodec")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

impl JwtCodec {
    /// Creates a codec from a shared secret.
    pub fn new(secret: &str) -> HarborResult<Self> {
        if secret.is_empty() {
            return Err(Error::validation("jwt secret must not be empty").with_module("jwt"));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_aud = false;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            issuer: None,
            audience: None,
        })
    }

    /// Creates a codec from settings.
    pub fn from_settings(settings: &JwtSettings) -> HarborResult<Self> {
        let mut codec = Self::new(&settings.secret)?.with_leeway(settings.leeway_secs);
        if let Some(issuer) = &settings.issuer {
            codec = codec.with_issuer(issuer);
        }
        if let Some(audience) = &settings.audience {
            codec = codec.with_audience(audience);
        }
        Ok(codec)
    }

    /// Requires and stamps an issuer.
    #[must_use]
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self.issuer = Some(issuer.to_string());
        self
    }

    /// Requires and stamps an audience.
    #[must_use]
    pub fn with_audience(mut self, audience: &str) -> Self {
        self.validation.set_audience(&[audience]);
        self.validation.validate_aud = true;
        self.audience = Some(audience.to_string());
        self
    }

    /// Sets the tolerated clock skew.
    #[must_use]
    pub fn with_leeway(mut self, secs: u64) -> Self {
        self.validation.leeway = secs;
        self
    }

    /// Signs `claims`, stamping the configured issuer and audience.
    pub fn sign(&self, claims: &JwtClaims) -> HarborResult<String> {
        let mut claims = claims.clone();
        if claims.iss.is_none() {
            claims.iss.clone_from(&self.issuer);
        }
        if claims.aud.is_none() {
            claims.aud.clone_from(&self.audience);
        }
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::internal(format!("failed to sign token: {e}")).with_module("jwt"))
    }

    /// Verifies `token` and returns its claims.
    pub fn verify(&self, token: &str) -> HarborResult<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let reason = match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => TOKEN_EXPIRED,
                    _ => TOKEN_INVALID,
                };
                Error::authentication(format!("invalid token: {e}"))
                    .with_module("jwt")
                    .with_reason(reason)
            })
    }
}

/// Returns the bearer token from an `Authorization` header value.
#[must_use]
pub fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Validates bearer tokens on inbound requests.
#[derive(Debug, Clone)]
pub struct JwtServerMiddleware {
    codec: JwtCodec,
}

impl JwtServerMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(codec: JwtCodec) -> Self {
        Self { codec }
    }
}

impl Middleware for JwtServerMiddleware {
    fn name(&self) -> &str {
        "jwt"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let Some(token) = bearer_token(&request) else {
                return Err(Error::authentication("missing bearer token")
                    .with_module("jwt")
                    .with_operation(ctx.operation()));
            };
            let claims = self
                .codec
                .verify(token)
                .map_err(|e| e.with_operation(ctx.operation()))?;
            tracing::debug!(principal = %claims.sub, operation = %ctx.operation(), "token accepted");
            ctx.set_extension(claims);
            next.run(ctx, request).await
        })
    }
}

/// Attaches a signed token to outbound requests.
#[derive(Debug, Clone)]
pub struct JwtClientMiddleware {
    codec: JwtCodec,
    subject: String,
    roles: Vec<String>,
    ttl: Duration,
}

impl JwtClientMiddleware {
    /// Creates the middleware.
    #[must_use]
    pub fn new(codec: JwtCodec, subject: impl Into<String>, ttl: Duration) -> Self {
        Self {
            codec,
            subject: subject.into(),
            roles: Vec::new(),
            ttl,
        }
    }

    /// Roles stamped into each token.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = roles;
        self
    }
}

impl Middleware for JwtClientMiddleware {
    fn name(&self) -> &str {
        "jwt"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let claims =
                JwtClaims::for_subject(&self.subject, self.ttl).with_roles(self.roles.clone());
            let token = self.codec.sign(&claims)?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| Error::internal(format!("invalid token header: {e}")))?;
            request.headers_mut().insert(header::AUTHORIZATION, value);
            next.run(ctx, request).await
        })
    }
}

/// Factory for `jwt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JwtFactory;

impl MiddlewareFactory for JwtFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: JwtSettings = entry.settings()?;
        let codec = JwtCodec::from_settings(&settings)?;
        Ok(Some(Arc::new(JwtServerMiddleware::new(codec))))
    }

    fn new_client(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let settings: JwtSettings = entry.settings()?;
        if settings.subject.is_empty() {
            return Err(Error::validation("jwt client needs a subject").with_module("jwt"));
        }
        let codec = JwtCodec::from_settings(&settings)?;
        Ok(Some(Arc::new(
            JwtClientMiddleware::new(codec, settings.subject, Duration::from_secs(settings.ttl_secs))
                .with_roles(settings.roles),
        )))
    }
}
