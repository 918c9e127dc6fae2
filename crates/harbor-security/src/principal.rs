//! Authenticated principals and their propagation codec.
//!
//! A [`Principal`] is immutable once built. It travels between services as
//! `base64(protobuf)` under the [`PRINCIPAL_HEADER`] metadata key; see
//! [`encode_principal`] and [`decode_principal`].
//!
//! # Example
//!
//! ```
//! use harbor_security::principal::{decode_principal, encode_principal, ClaimValue, Principal};
//!
//! let principal = Principal::builder("u1")
//!     .role("admin")
//!     .permission("read")
//!     .scope("api")
//!     .claim("tenant", ClaimValue::from("acme"))
//!     .build();
//!
//! let wire = encode_principal(&principal).unwrap();
//! let decoded = decode_principal(&wire).unwrap().unwrap();
//! assert_eq!(decoded, principal);
//! assert_eq!(decoded.claim("tenant"), Some(ClaimValue::from("acme")));
//! ```

use crate::proto::{
    BoolValue, DoubleValue, Int64Value, PrincipalProto, StringValue, BOOL_VALUE_URL,
    DOUBLE_VALUE_URL, INT64_VALUE_URL, STRING_VALUE_URL,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use harbor_core::{Error, HarborResult};
use prost::Message;
use prost_types::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key carrying an encoded principal.
pub const PRINCIPAL_HEADER: &str = "x-principal-proto";

/// A typed extra-claim value.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimValue {
    /// `google.protobuf.StringValue`.
    String(String),
    /// `google.protobuf.Int64Value`.
    Int(i64),
    /// `google.protobuf.BoolValue`.
    Bool(bool),
    /// `google.protobuf.DoubleValue`.
    Double(f64),
    /// Any other packed message, kept as is.
    Other(Any),
}

impl ClaimValue {
    /// Packs the value into an `Any`.
    #[must_use]
    pub fn to_any(&self) -> Any {
        match self {
            Self::String(value) => pack(STRING_VALUE_URL, &StringValue { value: value.clone() }),
            Self::Int(value) => pack(INT64_VALUE_URL, &Int64Value { value: *value }),
            Self::Bool(value) => pack(BOOL_VALUE_URL, &BoolValue { value: *value }),
            Self::Double(value) => pack(DOUBLE_VALUE_URL, &DoubleValue { value: *value }),
            Self::Other(any) => any.clone(),
        }
    }

    /// Unpacks a well-known wrapper, keeping unknown types as [`ClaimValue::Other`].
    pub fn from_any(any: &Any) -> HarborResult<Self> {
        let decode_err = |e: prost::DecodeError| {
            Error::validation(format!("malformed claim of type '{}': {e}", any.type_url))
                .with_module("principal")
        };
        Ok(match any.type_url.as_str() {
            STRING_VALUE_URL => Self::String(
                StringValue::decode(any.value.as_slice())
                    .map_err(decode_err)?
                    .value,
            ),
            INT64_VALUE_URL => {
                Self::Int(Int64Value::decode(any.value.as_slice()).map_err(decode_err)?.value)
            }
            BOOL_VALUE_URL => {
                Self::Bool(BoolValue::decode(any.value.as_slice()).map_err(decode_err)?.value)
            }
            DOUBLE_VALUE_URL => Self::Double(
                DoubleValue::decode(any.value.as_slice())
                    .map_err(decode_err)?
                    .value,
            ),
            _ => Self::Other(any.clone()),
        })
    }

    /// Converts a JSON scalar. Arrays, objects and null have no claim form.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Self::Bool(*b)),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Double)),
            _ => None,
        }
    }

    /// Returns the string value, if this is a string claim.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ClaimValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ClaimValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ClaimValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for ClaimValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

fn pack<M: Message>(type_url: &str, message: &M) -> Any {
    Any {
        type_url: type_url.to_string(),
        value: message.encode_to_vec(),
    }
}

/// An authenticated identity.
#[derive(Clone, PartialEq, Default)]
pub struct Principal {
    id: String,
    roles: Vec<String>,
    permissions: Vec<String>,
    scopes: BTreeMap<String, bool>,
    extra_claims: BTreeMap<String, Any>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("roles", &self.roles)
            .field("permissions", &self.permissions)
            .field("scopes", &self.scopes)
            .field("extra_claims", &self.extra_claims.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Principal {
    /// Starts building a principal with `id`.
    #[must_use]
    pub fn builder(id: impl Into<String>) -> PrincipalBuilder {
        PrincipalBuilder {
            principal: Self {
                id: id.into(),
                ..Self::default()
            },
        }
    }

    /// Principal id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Roles.
    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Permissions.
    #[must_use]
    pub fn permissions(&self) -> &[String] {
        &self.permissions
    }

    /// Scope map. A scope is granted when its value is `true`.
    #[must_use]
    pub fn scopes(&self) -> &BTreeMap<String, bool> {
        &self.scopes
    }

    /// Raw extra claims.
    #[must_use]
    pub fn extra_claims(&self) -> &BTreeMap<String, Any> {
        &self.extra_claims
    }

    /// Returns `true` if the principal holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Returns `true` if the principal holds `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: &str) -> bool {
        self.permissions.iter().any(|p| p == permission)
    }

    /// Returns `true` if `scope` is granted.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.get(scope).copied().unwrap_or(false)
    }

    /// Returns the decoded claim `key`. Malformed claims read as absent.
    #[must_use]
    pub fn claim(&self, key: &str) -> Option<ClaimValue> {
        self.extra_claims
            .get(key)
            .and_then(|any| ClaimValue::from_any(any).ok())
    }

    /// Converts to the wire message.
    #[must_use]
    pub fn to_proto(&self) -> PrincipalProto {
        PrincipalProto {
            id: self.id.clone(),
            roles: self.roles.clone(),
            permissions: self.permissions.clone(),
            scopes: self.scopes.clone(),
            extra_claims: self.extra_claims.clone(),
        }
    }

    /// Builds from the wire message.
    #[must_use]
    pub fn from_proto(proto: PrincipalProto) -> Self {
        Self {
            id: proto.id,
            roles: proto.roles,
            permissions: proto.permissions,
            scopes: proto.scopes,
            extra_claims: proto.extra_claims,
        }
    }
}

/// Builder for [`Principal`].
#[derive(Debug, Clone)]
pub struct PrincipalBuilder {
    principal: Principal,
}

impl PrincipalBuilder {
    /// Adds a role.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.principal.roles.push(role.into());
        self
    }

    /// Adds roles.
    #[must_use]
    pub fn roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principal.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Adds a permission.
    #[must_use]
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.principal.permissions.push(permission.into());
        self
    }

    /// Adds permissions.
    #[must_use]
    pub fn permissions<I, S>(mut self, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principal
            .permissions
            .extend(permissions.into_iter().map(Into::into));
        self
    }

    /// Grants a scope.
    #[must_use]
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.principal.scopes.insert(scope.into(), true);
        self
    }

    /// Sets a scope entry explicitly.
    #[must_use]
    pub fn scope_entry(mut self, scope: impl Into<String>, granted: bool) -> Self {
        self.principal.scopes.insert(scope.into(), granted);
        self
    }

    /// Adds a typed claim.
    #[must_use]
    pub fn claim(mut self, key: impl Into<String>, value: ClaimValue) -> Self {
        self.principal.extra_claims.insert(key.into(), value.to_any());
        self
    }

    /// Finishes the principal.
    #[must_use]
    pub fn build(self) -> Principal {
        self.principal
    }
}

/// Encodes `principal` as `base64(protobuf)`.
pub fn encode_principal(principal: &Principal) -> HarborResult<String> {
    Ok(STANDARD.encode(principal.to_proto().encode_to_vec()))
}

/// Decodes an encoded principal. An empty input decodes to `None`.
pub fn decode_principal(encoded: &str) -> HarborResult<Option<Principal>> {
    let encoded = encoded.trim();
    if encoded.is_empty() {
        return Ok(None);
    }
    let bytes = STANDARD.decode(encoded).map_err(|e| {
        Error::validation(format!("principal is not valid base64: {e}"))
            .with_module("principal")
    })?;
    let proto = PrincipalProto::decode(bytes.as_slice()).map_err(|e| {
        Error::validation(format!("principal is not a valid message: {e}"))
            .with_module("principal")
    })?;
    Ok(Some(Principal::from_proto(proto)))
}
