//! Protobuf wire messages for principals and issued credentials.
//!
//! The messages are declared with `prost` derives so that no build-time code
//! generation is needed. Field numbers are part of the wire contract.
//!
//! ```text
//! message Principal {
//!   string id = 1;
//!   repeated string roles = 2;
//!   repeated string permissions = 3;
//!   map<string, bool> scopes = 4;
//!   map<string, google.protobuf.Any> extra_claims = 5;
//! }
//! ```

use std::collections::BTreeMap;

/// Type URL prefix used for packed claim values.
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com/";

/// Type URL of [`StringValue`].
pub const STRING_VALUE_URL: &str = "type.googleapis.com/google.protobuf.StringValue";
/// Type URL of [`Int64Value`].
pub const INT64_VALUE_URL: &str = "type.googleapis.com/google.protobuf.Int64Value";
/// Type URL of [`BoolValue`].
pub const BOOL_VALUE_URL: &str = "type.googleapis.com/google.protobuf.BoolValue";
/// Type URL of [`DoubleValue`].
pub const DOUBLE_VALUE_URL: &str = "type.googleapis.com/google.protobuf.DoubleValue";

/// `google.protobuf.StringValue`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct StringValue {
    /// The value.
    #[prost(string, tag = "1")]
    pub value: String,
}

/// `google.protobuf.Int64Value`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct Int64Value {
    /// The value.
    #[prost(int64, tag = "1")]
    pub value: i64,
}

/// `google.protobuf.BoolValue`.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BoolValue {
    /// The value.
    #[prost(bool, tag = "1")]
    pub value: bool,
}

/// `google.protobuf.DoubleValue`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoubleValue {
    /// The value.
    #[prost(double, tag = "1")]
    pub value: f64,
}

/// Wire form of a principal.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrincipalProto {
    /// Principal id.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Roles.
    #[prost(string, repeated, tag = "2")]
    pub roles: Vec<String>,
    /// Permissions.
    #[prost(string, repeated, tag = "3")]
    pub permissions: Vec<String>,
    /// Scopes.
    #[prost(btree_map = "string, bool", tag = "4")]
    pub scopes: BTreeMap<String, bool>,
    /// Extra claims packed as `Any`.
    #[prost(btree_map = "string, message", tag = "5")]
    pub extra_claims: BTreeMap<String, ::prost_types::Any>,
}

/// A list of strings, used for multi-valued metadata.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct StringList {
    /// Values.
    #[prost(string, repeated, tag = "1")]
    pub values: Vec<String>,
}

/// Username and password.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct BasicCredential {
    /// Username.
    #[prost(string, tag = "1")]
    pub username: String,
    /// Password.
    #[prost(string, tag = "2")]
    pub password: String,
}

/// An API key.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct KeyCredential {
    /// Key id, if the key has one.
    #[prost(string, tag = "1")]
    pub id: String,
    /// Secret key material.
    #[prost(string, tag = "2")]
    pub secret: String,
}

/// OpenID Connect tokens.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct OidcCredential {
    /// ID token.
    #[prost(string, tag = "1")]
    pub id_token: String,
    /// Access token.
    #[prost(string, tag = "2")]
    pub access_token: String,
    /// Refresh token.
    #[prost(string, tag = "3")]
    pub refresh_token: String,
}

/// A bearer token.
#[derive(Clone, PartialEq, Eq, ::prost::Message)]
pub struct TokenCredential {
    /// Token string.
    #[prost(string, tag = "1")]
    pub token: String,
    /// Token type, e.g. `Bearer`.
    #[prost(string, tag = "2")]
    pub token_type: String,
    /// Expiry in seconds since the epoch, `0` when unknown.
    #[prost(int64, tag = "3")]
    pub expires_at: i64,
}

/// Wire form of a credential issued to a client.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CredentialResponseProto {
    /// Credential type.
    #[prost(string, tag = "1")]
    pub r#type: String,
    /// Typed payload.
    #[prost(oneof = "credential_response_proto::Payload", tags = "2, 3, 4, 5, 6")]
    pub payload: Option<credential_response_proto::Payload>,
    /// Opaque metadata.
    #[prost(btree_map = "string, message", tag = "7")]
    pub metadata: BTreeMap<String, StringList>,
}

/// Nested types of [`CredentialResponseProto`].
pub mod credential_response_proto {
    /// The tagged payload union.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Payload {
        /// Username and password.
        #[prost(message, tag = "2")]
        Basic(super::BasicCredential),
        /// API key.
        #[prost(message, tag = "3")]
        Key(super::KeyCredential),
        /// OIDC tokens.
        #[prost(message, tag = "4")]
        Oidc(super::OidcCredential),
        /// Bearer token.
        #[prost(message, tag = "5")]
        Token(super::TokenCredential),
        /// Anything else.
        #[prost(bytes, tag = "6")]
        RawData(Vec<u8>),
    }
}
