//! Credentials.
//!
//! An inbound [`Credential`] is what an extractor pulled out of a request. A
//! [`CredentialResponse`] is what a service issues to a client (for example
//! after a login) and has a protobuf wire form. Both expose the typed
//! [`CredentialPayload`] and opaque multi-valued metadata.

use crate::proto::{
    credential_response_proto::Payload, BasicCredential, CredentialResponseProto, KeyCredential,
    OidcCredential, StringList, TokenCredential,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use harbor_core::{Error, HarborResult};
use prost::Message;
use std::collections::BTreeMap;
use std::fmt;

/// Well-known credential types.
pub mod types {
    /// `Authorization: Bearer <token>`.
    pub const BEARER: &str = "bearer";
    /// `Authorization: Basic <base64>`.
    pub const BASIC: &str = "basic";
    /// API key header.
    pub const API_KEY: &str = "api_key";
    /// OpenID Connect tokens.
    pub const OIDC: &str = "oidc";
}

/// Typed credential material.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialPayload {
    /// Username and password.
    Basic {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// API key.
    Key {
        /// Key id, empty when unknown.
        id: String,
        /// Key material.
        secret: String,
    },
    /// OpenID Connect tokens.
    Oidc {
        /// ID token.
        id_token: String,
        /// Access token.
        access_token: String,
        /// Refresh token.
        refresh_token: String,
    },
    /// Bearer token.
    Token {
        /// Token string.
        token: String,
        /// Token type.
        token_type: String,
        /// Expiry in seconds since the epoch, `0` when unknown.
        expires_at: i64,
    },
    /// Anything else.
    Raw(Vec<u8>),
}

impl fmt::Debug for CredentialPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Key { id, .. } => f.debug_struct("Key").field("id", id).finish_non_exhaustive(),
            Self::Oidc { .. } => f.write_str("Oidc { .. }"),
            Self::Token { token_type, .. } => f
                .debug_struct("Token")
                .field("token_type", token_type)
                .finish_non_exhaustive(),
            Self::Raw(bytes) => write!(f, "Raw({} bytes)", bytes.len()),
        }
    }
}

impl CredentialPayload {
    /// A bearer token payload.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Token {
            token: token.into(),
            token_type: "Bearer".to_string(),
            expires_at: 0,
        }
    }

    /// The bearer token, if this is a token payload.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            Self::Token { token, .. } => Some(token),
            _ => None,
        }
    }

    /// The key secret, if this is a key payload.
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Key { secret, .. } => Some(secret),
            _ => None,
        }
    }

    fn to_proto(&self) -> Payload {
        match self.clone() {
            Self::Basic { username, password } => {
                Payload::Basic(BasicCredential { username, password })
            }
            Self::Key { id, secret } => Payload::Key(KeyCredential { id, secret }),
            Self::Oidc {
                id_token,
                access_token,
                refresh_token,
            } => Payload::Oidc(OidcCredential {
                id_token,
                access_token,
                refresh_token,
            }),
            Self::Token {
                token,
                token_type,
                expires_at,
            } => Payload::Token(TokenCredential {
                token,
                token_type,
                expires_at,
            }),
            Self::Raw(bytes) => Payload::RawData(bytes),
        }
    }

    fn from_proto(payload: Payload) -> Self {
        match payload {
            Payload::Basic(b) => Self::Basic {
                username: b.username,
                password: b.password,
            },
            Payload::Key(k) => Self::Key {
                id: k.id,
                secret: k.secret,
            },
            Payload::Oidc(o) => Self::Oidc {
                id_token: o.id_token,
                access_token: o.access_token,
                refresh_token: o.refresh_token,
            },
            Payload::Token(t) => Self::Token {
                token: t.token,
                token_type: t.token_type,
                expires_at: t.expires_at,
            },
            Payload::RawData(bytes) => Self::Raw(bytes),
        }
    }
}

/// Credential extracted from an inbound request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    kind: String,
    raw: String,
    payload: CredentialPayload,
    metadata: BTreeMap<String, Vec<String>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("kind", &self.kind)
            .field("payload", &self.payload)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Creates a credential of `kind` with its raw text and typed payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, raw: impl Into<String>, payload: CredentialPayload) -> Self {
        Self {
            kind: kind.into(),
            raw: raw.into(),
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// A bearer token credential.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        let token = token.into();
        Self::new(types::BEARER, token.clone(), CredentialPayload::bearer(token))
    }

    /// An API key credential.
    #[must_use]
    pub fn api_key(key: impl Into<String>) -> Self {
        let key = key.into();
        Self::new(
            types::API_KEY,
            key.clone(),
            CredentialPayload::Key {
                id: String::new(),
                secret: key,
            },
        )
    }

    /// Adds a metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Credential type, e.g. `bearer`.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The raw credential text as it appeared on the wire.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Typed payload.
    #[must_use]
    pub fn payload(&self) -> &CredentialPayload {
        &self.payload
    }

    /// Opaque metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Vec<String>> {
        &self.metadata
    }
}

/// Credential issued to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialResponse {
    kind: String,
    payload: CredentialPayload,
    metadata: BTreeMap<String, Vec<String>>,
}

impl CredentialResponse {
    /// Creates a response credential.
    #[must_use]
    pub fn new(kind: impl Into<String>, payload: CredentialPayload) -> Self {
        Self {
            kind: kind.into(),
            payload,
            metadata: BTreeMap::new(),
        }
    }

    /// Adds a metadata value.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Credential type.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Typed payload.
    #[must_use]
    pub fn payload(&self) -> &CredentialPayload {
        &self.payload
    }

    /// Opaque metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Vec<String>> {
        &self.metadata
    }

    /// Converts to the wire message.
    #[must_use]
    pub fn to_proto(&self) -> CredentialResponseProto {
        CredentialResponseProto {
            r#type: self.kind.clone(),
            payload: Some(self.payload.to_proto()),
            metadata: self
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), StringList { values: v.clone() }))
                .collect(),
        }
    }

    /// Builds from the wire message.
    pub fn from_proto(proto: CredentialResponseProto) -> HarborResult<Self> {
        let payload = proto.payload.ok_or_else(|| {
            Error::validation("credential response has no payload").with_module("credential")
        })?;
        Ok(Self {
            kind: proto.r#type,
            payload: CredentialPayload::from_proto(payload),
            metadata: proto
                .metadata
                .into_iter()
                .map(|(k, v)| (k, v.values))
                .collect(),
        })
    }

    /// Encodes as `base64(protobuf)`.
    #[must_use]
    pub fn encode(&self) -> String {
        STANDARD.encode(self.to_proto().encode_to_vec())
    }

    /// Decodes from `base64(protobuf)`.
    pub fn decode(encoded: &str) -> HarborResult<Self> {
        let bytes = STANDARD.decode(encoded.trim()).map_err(|e| {
            Error::validation(format!("credential is not valid base64: {e}"))
                .with_module("credential")
        })?;
        let proto = CredentialResponseProto::decode(bytes.as_slice()).map_err(|e| {
            Error::validation(format!("credential is not a valid message: {e}"))
                .with_module("credential")
        })?;
        Self::from_proto(proto)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_credential() {
        let cred = Credential::bearer("abc").with_metadata("source", "header");
        assert_eq!(cred.kind(), types::BEARER);
        assert_eq!(cred.raw(), "abc");
        assert_eq!(cred.payload().token(), Some("abc"));
        assert_eq!(cred.metadata()["source"], vec!["header"]);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let cred = Credential::new(
            types::BASIC,
            "dXNlcjpodW50ZXIy",
            CredentialPayload::Basic {
                username: "user".into(),
                password: "hunter2".into(),
            },
        );
        let debug = format!("{cred:?}");
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));
        assert!(!debug.contains("dXNlcjpodW50ZXIy"));
    }

    #[test]
    fn test_response_wire_form() {
        let issued = CredentialResponse::new(
            types::OIDC,
            CredentialPayload::Oidc {
                id_token: "id".into(),
                access_token: "access".into(),
                refresh_token: String::new(),
            },
        )
        .with_metadata("scope", "openid")
        .with_metadata("scope", "profile");

        let decoded = CredentialResponse::decode(&issued.encode()).unwrap();
        assert_eq!(decoded, issued);
        assert_eq!(decoded.metadata()["scope"], vec!["openid", "profile"]);
    }

    #[test]
    fn test_response_without_payload_is_rejected() {
        let proto = CredentialResponseProto {
            r#type: "token".into(),
            ..CredentialResponseProto::default()
        };
        assert!(CredentialResponse::from_proto(proto).is_err());
    }
}
