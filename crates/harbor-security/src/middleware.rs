//! The `security` middleware.
//!
//! Server side, each request is routed to a policy by operation, its
//! credential is extracted and authenticated, and the resulting principal is
//! authorized before the handler runs. Client side, the principal already in
//! the context is forwarded in [`PRINCIPAL_HEADER`].
//!
//! | Outcome | Kind | Reason |
//! |---------|------|--------|
//! | no policy for the operation and no default | authentication (401) | [`reasons::SECURITY_POLICY_ERROR`] |
//! | policy cannot be resolved | internal (500) | [`reasons::SECURITY_POLICY_ERROR`] |
//! | malformed propagated principal | authentication (401) | [`reasons::VALUE_PROVIDER_ERROR`] |
//! | no credential | authentication (401) | [`reasons::CREDENTIAL_MISSING`] |
//! | authentication fails | authentication (401) | [`reasons::UNAUTHENTICATED`] |
//! | authorizer says no | authorization (403) | [`reasons::FORBIDDEN`] |
//! | authorizer fails | internal (500) | [`reasons::AUTHORIZATION_ERROR`] |

use crate::authz::ACCESS;
use crate::extractor::{CredentialExtractor, HeaderCredentialExtractor};
use crate::policy::{PolicyProvider, PUBLIC};
use crate::principal::{decode_principal, encode_principal, Principal, PRINCIPAL_HEADER};
use crate::request::request_source;
use harbor_config::MiddlewareEntry;
use harbor_core::{Error, HarborResult, Options};
use harbor_middleware::context::MiddlewareContext;
use harbor_middleware::stages::kinds;
use harbor_middleware::{
    BoxFuture, BoxedMiddleware, Middleware, MiddlewareBuilder, MiddlewareFactory,
    MiddlewareResult, Next, Request,
};
use harbor_telemetry::metrics::{record_authn_decision, record_authz_decision};
use http::HeaderValue;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Stable reason codes attached to security failures.
pub mod reasons {
    /// Credential present but not accepted.
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    /// Principal not allowed to call the operation.
    pub const FORBIDDEN: &str = "FORBIDDEN";
    /// No policy applies, or the policy cannot be built.
    pub const SECURITY_POLICY_ERROR: &str = "SECURITY_POLICY_ERROR";
    /// The request carries no credential.
    pub const CREDENTIAL_MISSING: &str = "CREDENTIAL_MISSING";
    /// The authorizer could not decide.
    pub const AUTHORIZATION_ERROR: &str = "AUTHORIZATION_ERROR";
    /// A request value could not be read.
    pub const VALUE_PROVIDER_ERROR: &str = "VALUE_PROVIDER_ERROR";
}

const MODULE: &str = "security";

/// Returns the principal injected by the security middleware.
#[must_use]
pub fn principal_from_context(ctx: &MiddlewareContext) -> Option<&Principal> {
    ctx.get_extension::<Principal>()
}

/// `security` entry settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SecuritySettings {
    /// Policy for operations the provider does not route.
    pub default_policy: String,
    /// Accept a principal forwarded by an upstream service.
    pub trust_propagated_principal: bool,
}

/// Server-side security checks.
pub struct SecurityServerMiddleware {
    provider: Arc<PolicyProvider>,
    extractor: Arc<dyn CredentialExtractor>,
    settings: SecuritySettings,
}

impl fmt::Debug for SecurityServerMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityServerMiddleware")
            .field("extractor", &self.extractor)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SecurityServerMiddleware {
    /// Creates the middleware with the header extractor.
    #[must_use]
    pub fn new(provider: Arc<PolicyProvider>) -> Self {
        Self {
            provider,
            extractor: Arc::new(HeaderCredentialExtractor::new()),
            settings: SecuritySettings::default(),
        }
    }

    /// Uses a different credential extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn CredentialExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Applies entry settings.
    #[must_use]
    pub fn with_settings(mut self, settings: SecuritySettings) -> Self {
        self.settings = settings;
        self
    }

    fn resolve_policy_name(&self, operation: &str) -> String {
        let name = self.provider.policy_name_for_operation(operation);
        if name.is_empty() {
            self.settings.default_policy.clone()
        } else {
            name
        }
    }

    async fn check(&self, ctx: &MiddlewareContext, request: &Request) -> HarborResult<Option<Principal>> {
        let operation = ctx.operation().to_string();
        let fail = |error: Error, reason: &str| {
            error
                .with_module(MODULE)
                .with_operation(operation.as_str())
                .with_reason(reason)
        };

        let policy_name = self.resolve_policy_name(&operation);
        if policy_name == PUBLIC {
            tracing::trace!(operation = %operation, "public operation");
            return Ok(None);
        }
        if policy_name.is_empty() {
            return Err(fail(
                Error::authentication("no policy specified"),
                reasons::SECURITY_POLICY_ERROR,
            ));
        }

        let policy = self.provider.get_policy(&policy_name).map_err(|e| {
            fail(
                Error::internal(format!("security policy '{policy_name}' unavailable")),
                reasons::SECURITY_POLICY_ERROR,
            )
            .with_metadata("policy", policy_name.as_str())
            .with_source(e)
        })?;

        let (propagated, credential) = {
            let source = request_source(ctx, request);
            let propagated = if self.settings.trust_propagated_principal {
                source
                    .get(PRINCIPAL_HEADER)
                    .map(decode_principal)
                    .transpose()
                    .map_err(|e| {
                        fail(
                            Error::authentication("propagated principal is malformed"),
                            reasons::VALUE_PROVIDER_ERROR,
                        )
                        .with_source(e)
                    })?
                    .flatten()
            } else {
                None
            };
            let credential = if propagated.is_some() {
                None
            } else {
                self.extractor.extract(source.as_ref()).map_err(|e| {
                    fail(
                        Error::authentication("credential is malformed"),
                        reasons::UNAUTHENTICATED,
                    )
                    .with_source(e)
                })?
            };
            (propagated, credential)
        };

        let principal = match (propagated, credential) {
            (Some(principal), _) => {
                tracing::debug!(principal = %principal.id(), policy = %policy_name, "trusting propagated principal");
                principal
            }
            (None, None) => {
                record_authn_decision(false, &policy_name);
                return Err(fail(
                    Error::authentication("missing credential"),
                    reasons::CREDENTIAL_MISSING,
                ));
            }
            (None, Some(credential)) => match policy.authenticate(&credential).await {
                Ok(principal) => {
                    record_authn_decision(true, &policy_name);
                    principal
                }
                Err(e) => {
                    record_authn_decision(false, &policy_name);
                    tracing::debug!(policy = %policy_name, operation = %operation, error = %e, "authentication failed");
                    return Err(fail(
                        Error::authentication("authentication failed"),
                        reasons::UNAUTHENTICATED,
                    )
                    .with_source(e));
                }
            },
        };

        match policy.authorize(&principal, &operation, ACCESS).await {
            Ok(true) => {
                record_authz_decision(true, &policy_name);
                Ok(Some(principal))
            }
            Ok(false) => {
                record_authz_decision(false, &policy_name);
                tracing::debug!(principal = %principal.id(), policy = %policy_name, operation = %operation, "access denied");
                Err(fail(Error::authorization("access denied"), reasons::FORBIDDEN))
            }
            Err(e) => {
                tracing::warn!(policy = %policy_name, operation = %operation, error = %e, "authorizer failed");
                Err(fail(
                    Error::internal("authorization failed"),
                    reasons::AUTHORIZATION_ERROR,
                )
                .with_source(e))
            }
        }
    }
}

impl Middleware for SecurityServerMiddleware {
    fn name(&self) -> &str {
        kinds::SECURITY
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if let Some(principal) = self.check(ctx, &request).await? {
                ctx.set_extension(principal);
            }
            next.run(ctx, request).await
        })
    }
}

/// Forwards the context principal to downstream services.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityClientMiddleware;

impl Middleware for SecurityClientMiddleware {
    fn name(&self) -> &str {
        kinds::SECURITY
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut MiddlewareContext,
        mut request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            if let Some(principal) = principal_from_context(ctx) {
                let encoded = encode_principal(principal)?;
                let value = HeaderValue::from_str(&encoded).map_err(|e| {
                    Error::internal(format!("invalid principal header: {e}")).with_module(MODULE)
                })?;
                request.headers_mut().insert(PRINCIPAL_HEADER, value);
            }
            next.run(ctx, request).await
        })
    }
}

/// Factory for `security`, bound to one policy provider.
#[derive(Clone)]
pub struct SecurityFactory {
    provider: Arc<PolicyProvider>,
    extractor: Arc<dyn CredentialExtractor>,
    defaults: SecuritySettings,
}

impl fmt::Debug for SecurityFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityFactory")
            .field("provider", &self.provider)
            .field("extractor", &self.extractor)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl SecurityFactory {
    /// Creates the factory with the header extractor.
    #[must_use]
    pub fn new(provider: Arc<PolicyProvider>) -> Self {
        Self {
            provider,
            extractor: Arc::new(HeaderCredentialExtractor::new()),
            defaults: SecuritySettings::default(),
        }
    }

    /// Uses a different credential extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn CredentialExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Settings applied where an entry leaves them unset, usually taken
    /// from the `security` section.
    #[must_use]
    pub fn with_defaults(mut self, defaults: SecuritySettings) -> Self {
        self.defaults = defaults;
        self
    }
}

impl MiddlewareFactory for SecurityFactory {
    fn new_server(
        &self,
        entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        let mut settings: SecuritySettings = entry.settings()?;
        if settings.default_policy.is_empty() {
            settings.default_policy = self.defaults.default_policy.clone();
        }
        settings.trust_propagated_principal |= self.defaults.trust_propagated_principal;
        Ok(Some(Arc::new(
            SecurityServerMiddleware::new(Arc::clone(&self.provider))
                .with_extractor(Arc::clone(&self.extractor))
                .with_settings(settings),
        )))
    }

    fn new_client(
        &self,
        _entry: &MiddlewareEntry,
        _opts: &Options,
    ) -> HarborResult<Option<BoxedMiddleware>> {
        Ok(Some(Arc::new(SecurityClientMiddleware)))
    }
}

/// Registers the `security` middleware type on `builder`.
pub fn register_security_middleware(builder: &MiddlewareBuilder, provider: Arc<PolicyProvider>) {
    builder.register(kinds::SECURITY, SecurityFactory::new(provider));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authn::{ApiKeyAuthenticator, ApiKeyIdentity};
    use crate::authz::{AllowAll, DenyAll, RbacAuthorizer};
    use crate::policy::Policy;
    use bytes::Bytes;
    use harbor_core::ErrorKind;
    use harbor_middleware::{Response, ResponseExt};
    use http::StatusCode;
    use http_body_util::Full;
    use std::collections::HashMap;

    fn keys() -> Arc<ApiKeyAuthenticator> {
        Arc::new(ApiKeyAuthenticator::new(
            "keys",
            HashMap::from([(
                "k-admin".to_string(),
                ApiKeyIdentity {
                    subject: "root".into(),
                    roles: vec!["admin".into()],
                    ..ApiKeyIdentity::default()
                },
            )]),
        ))
    }

    fn provider() -> Arc<PolicyProvider> {
        let provider = PolicyProvider::new();
        provider.register_policy(Policy::new(
            "admins",
            keys(),
            Arc::new(RbacAuthorizer::new("rbac").allow_role("admin", ["/admin.*"])),
        ));
        provider.register_policy(Policy::new("closed", keys(), Arc::new(DenyAll)));
        provider.register_policy(Policy::new("open", keys(), Arc::new(AllowAll)));
        provider.add_route("/admin.*", "admins");
        provider.add_route("/closed/Op", "closed");
        provider.add_route("/health/Check", PUBLIC);
        provider.add_route("/ghost/Op", "ghost");
        Arc::new(provider)
    }

    fn request(headers: &[(&str, &str)]) -> Request {
        let mut builder = http::Request::builder().uri("/x");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(Full::new(Bytes::new())).unwrap()
    }

    fn handler<'a>() -> Next<'a> {
        Next::handler(|ctx, _req| {
            let id = principal_from_context(ctx).map(|p| p.id().to_string());
            Box::pin(async move {
                let status = if id.is_some() { StatusCode::OK } else { StatusCode::NO_CONTENT };
                Ok(Response::empty(status))
            })
        })
    }

    async fn call(
        mw: &SecurityServerMiddleware,
        operation: &str,
        headers: &[(&str, &str)],
    ) -> MiddlewareResult {
        let mut ctx = MiddlewareContext::server(operation);
        mw.process(&mut ctx, request(headers), handler()).await
    }

    #[tokio::test]
    async fn test_public_bypass_injects_nothing() {
        let mw = SecurityServerMiddleware::new(provider());
        let response = call(&mw, "/health/Check", &[]).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_authorized_request_sees_principal() {
        let mw = SecurityServerMiddleware::new(provider());
        let response = call(&mw, "/admin.v1.Admin/Reset", &[("x-api-key", "k-admin")])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failure_reasons() {
        let mw = SecurityServerMiddleware::new(provider());

        let err = call(&mw, "/unrouted/Op", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.reason(), reasons::SECURITY_POLICY_ERROR);

        let err = call(&mw, "/ghost/Op", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.reason(), reasons::SECURITY_POLICY_ERROR);

        let err = call(&mw, "/admin.v1.Admin/Reset", &[]).await.unwrap_err();
        assert_eq!(err.reason(), reasons::CREDENTIAL_MISSING);

        let err = call(&mw, "/admin.v1.Admin/Reset", &[("x-api-key", "wrong")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert_eq!(err.reason(), reasons::UNAUTHENTICATED);

        let err = call(&mw, "/closed/Op", &[("x-api-key", "k-admin")])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authorization);
        assert_eq!(err.reason(), reasons::FORBIDDEN);
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_default_policy_from_settings() {
        let mw = SecurityServerMiddleware::new(provider()).with_settings(SecuritySettings {
            default_policy: "open".into(),
            ..SecuritySettings::default()
        });
        let response = call(&mw, "/unrouted/Op", &[("x-api-key", "k-admin")])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_propagated_principal_only_when_trusted() {
        let encoded = encode_principal(&Principal::builder("upstream").role("admin").build()).unwrap();

        let untrusted = SecurityServerMiddleware::new(provider());
        let err = call(&untrusted, "/admin.v1.Admin/Reset", &[(PRINCIPAL_HEADER, &encoded)])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reasons::CREDENTIAL_MISSING);

        let trusted = SecurityServerMiddleware::new(provider()).with_settings(SecuritySettings {
            trust_propagated_principal: true,
            ..SecuritySettings::default()
        });
        let response = call(&trusted, "/admin.v1.Admin/Reset", &[(PRINCIPAL_HEADER, &encoded)])
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let err = call(&trusted, "/admin.v1.Admin/Reset", &[(PRINCIPAL_HEADER, "%%%")])
            .await
            .unwrap_err();
        assert_eq!(err.reason(), reasons::VALUE_PROVIDER_ERROR);
    }

    #[tokio::test]
    async fn test_client_forwards_principal() {
        let mut ctx = MiddlewareContext::client("/downstream/Op");
        ctx.set_extension(Principal::builder("u1").role("r").build());
        let next = Next::handler(|_ctx, req| {
            let header = req.headers().get(PRINCIPAL_HEADER).cloned();
            Box::pin(async move {
                let decoded = decode_principal(header.unwrap().to_str().unwrap())
                    .unwrap()
                    .unwrap();
                assert_eq!(decoded.id(), "u1");
                Ok(Response::empty(StatusCode::OK))
            })
        });
        let response = SecurityClientMiddleware
            .process(&mut ctx, request(&[]), next)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
