//! Credential extraction from request sources.

use crate::credential::{types, Credential, CredentialPayload};
use crate::request::RequestSource;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use harbor_core::{Error, HarborResult};
use std::fmt;

/// Pulls a [`Credential`] out of a request.
///
/// `Ok(None)` means the request carries no credential at all; `Err` means it
/// carries one that cannot be parsed.
pub trait CredentialExtractor: Send + Sync + fmt::Debug {
    /// Extracts the credential.
    fn extract(&self, source: &dyn RequestSource) -> HarborResult<Option<Credential>>;
}

/// Reads `authorization`, falling back to an API key header.
///
/// | Header | Credential type | Payload |
/// |--------|-----------------|---------|
/// | `authorization: Bearer <t>` | `bearer` | token |
/// | `authorization: Basic <b64>` | `basic` | username + password |
/// | `authorization: <Scheme> <v>` | scheme, lowercased | raw bytes |
/// | `x-api-key: <k>` | `api_key` | key |
#[derive(Debug, Clone)]
pub struct HeaderCredentialExtractor {
    authorization_header: String,
    api_key_header: String,
}

impl Default for HeaderCredentialExtractor {
    fn default() -> Self {
        Self {
            authorization_header: "authorization".to_string(),
            api_key_header: "x-api-key".to_string(),
        }
    }
}

impl HeaderCredentialExtractor {
    /// Creates the extractor with the default header names.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different API key header.
    #[must_use]
    pub fn with_api_key_header(mut self, header: impl Into<String>) -> Self {
        self.api_key_header = header.into().to_ascii_lowercase();
        self
    }

    fn parse_authorization(value: &str) -> HarborResult<Credential> {
        let (scheme, rest) = value.trim().split_once(' ').ok_or_else(|| {
            Error::authentication("authorization header has no scheme").with_module("security")
        })?;
        let rest = rest.trim();
        if rest.is_empty() {
            return Err(
                Error::authentication("authorization header has no credentials")
                    .with_module("security"),
            );
        }

        if scheme.eq_ignore_ascii_case("bearer") {
            return Ok(Credential::bearer(rest));
        }

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD
                .decode(rest)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| {
                    Error::authentication("basic credentials are not valid base64")
                        .with_module("security")
                })?;
            let (username, password) = decoded.split_once(':').ok_or_else(|| {
                Error::authentication("basic credentials have no ':' separator")
                    .with_module("security")
            })?;
            return Ok(Credential::new(
                types::BASIC,
                rest,
                CredentialPayload::Basic {
                    username: username.to_string(),
                    password: password.to_string(),
                },
            ));
        }

        Ok(Credential::new(
            scheme.to_ascii_lowercase(),
            rest,
            CredentialPayload::Raw(rest.as_bytes().to_vec()),
        ))
    }
}

impl CredentialExtractor for HeaderCredentialExtractor {
    fn extract(&self, source: &dyn RequestSource) -> HarborResult<Option<Credential>> {
        if let Some(value) = source.get(&self.authorization_header) {
            let credential = Self::parse_authorization(value)?
                .with_metadata("transport", source.kind().as_str());
            return Ok(Some(credential));
        }

        Ok(source
            .get(&self.api_key_header)
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(|key| Credential::api_key(key).with_metadata("transport", source.kind().as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{MetadataSource, RequestKind};
    use harbor_core::ErrorKind;

    fn extract(key: &str, value: &str) -> HarborResult<Option<Credential>> {
        let source = MetadataSource::new(RequestKind::Http, "/op").with(key, value);
        HeaderCredentialExtractor::new().extract(&source)
    }

    #[test]
    fn test_bearer() {
        let cred = extract("Authorization", "Bearer abc.def.ghi").unwrap().unwrap();
        assert_eq!(cred.kind(), types::BEARER);
        assert_eq!(cred.payload().token(), Some("abc.def.ghi"));
        assert_eq!(cred.metadata()["transport"], vec!["http"]);
    }

    #[test]
    fn test_basic() {
        let encoded = STANDARD.encode("alice:s3cret");
        let cred = extract("authorization", &format!("Basic {encoded}"))
            .unwrap()
            .unwrap();
        assert_eq!(cred.kind(), types::BASIC);
        assert_eq!(
            cred.payload(),
            &CredentialPayload::Basic {
                username: "alice".into(),
                password: "s3cret".into()
            }
        );
    }

    #[test]
    fn test_malformed_basic_is_an_error() {
        let err = extract("authorization", "Basic !!!").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_unknown_scheme_is_raw() {
        let cred = extract("authorization", "Digest xyz").unwrap().unwrap();
        assert_eq!(cred.kind(), "digest");
        assert_eq!(cred.payload(), &CredentialPayload::Raw(b"xyz".to_vec()));
    }

    #[test]
    fn test_api_key_fallback() {
        let cred = extract("x-api-key", "key-123").unwrap().unwrap();
        assert_eq!(cred.kind(), types::API_KEY);
        assert_eq!(cred.payload().key(), Some("key-123"));
    }

    #[test]
    fn test_nothing_to_extract() {
        assert!(extract("x-other", "v").unwrap().is_none());
    }
}
