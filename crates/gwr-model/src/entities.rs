// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed entity records for every kind the reconciler manages.
//!
//! Field sets mirror what the control plane's Admin API accepts. Every field
//! is optional at the type level: defaults are filled by the registry's
//! version-aware defaulting step, not by constructors. Foreign keys are plain
//! ID strings resolved through the state store, never in-memory pointers.

use crate::value::ConfigValue;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// The entity type name.
///
/// Identity is kind-local: the same ID under two kinds denotes unrelated
/// entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Upstream service definition.
    Service,
    /// Routing rule attached to a service.
    Route,
    /// Plugin instance, optionally scoped.
    Plugin,
    /// API consumer.
    Consumer,
    /// Named group of consumers.
    ConsumerGroup,
    /// (consumer group, consumer) membership pair.
    ConsumerGroupMembership,
    /// Load-balancing upstream.
    Upstream,
    /// Backend target of an upstream.
    Target,
    /// TLS certificate (cert + key).
    Certificate,
    /// Server name indication attached to a certificate.
    Sni,
    /// Trusted CA certificate.
    CaCertificate,
    /// Secrets vault configuration.
    Vault,
    /// Consumer credential (key-auth, basic-auth, ...).
    Credential,
    /// RBAC role.
    RbacRole,
    /// RBAC endpoint permission attached to a role.
    RbacEndpointPermission,
    /// License payload.
    License,
    /// Reusable partial configuration block.
    Partial,
    /// A kind unknown to the registry, diffed structurally only.
    Custom(String),
}

impl EntityKind {
    /// Every statically known kind, in canonical render order
    /// (parents before children).
    pub const KNOWN: &'static [EntityKind] = &[
        EntityKind::Service,
        EntityKind::Route,
        EntityKind::Consumer,
        EntityKind::ConsumerGroup,
        EntityKind::ConsumerGroupMembership,
        EntityKind::Credential,
        EntityKind::Plugin,
        EntityKind::Upstream,
        EntityKind::Target,
        EntityKind::Certificate,
        EntityKind::Sni,
        EntityKind::CaCertificate,
        EntityKind::Vault,
        EntityKind::RbacRole,
        EntityKind::RbacEndpointPermission,
        EntityKind::License,
        EntityKind::Partial,
    ];

    /// The stable kind name used in reports and documents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Service => "service",
            Self::Route => "route",
            Self::Plugin => "plugin",
            Self::Consumer => "consumer",
            Self::ConsumerGroup => "consumer_group",
            Self::ConsumerGroupMembership => "consumer_group_membership",
            Self::Upstream => "upstream",
            Self::Target => "target",
            Self::Certificate => "certificate",
            Self::Sni => "sni",
            Self::CaCertificate => "ca_certificate",
            Self::Vault => "vault",
            Self::Credential => "credential",
            Self::RbacRole => "rbac_role",
            Self::RbacEndpointPermission => "rbac_endpoint_permission",
            Self::License => "license",
            Self::Partial => "partial",
            Self::Custom(name) => name.as_str(),
        }
    }

    /// Returns `true` for consumer-owned kinds excluded by `skip_consumers`.
    #[must_use]
    pub fn is_consumer_scoped(&self) -> bool {
        matches!(
            self,
            Self::Consumer | Self::Credential | Self::ConsumerGroupMembership
        )
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (kind, id) handle to an entity in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct EntityRef {
    /// The referenced entity's kind.
    pub kind: EntityKind,
    /// The referenced entity's ID.
    pub id: String,
}

impl EntityRef {
    /// Create a new handle.
    #[must_use]
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ---------------------------------------------------------------------------
// Entity structs
// ---------------------------------------------------------------------------

/// Upstream service definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Service {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Upstream host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Upstream port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    /// Protocol used to talk to the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Path prefix sent to the upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Connect timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<i64>,
    /// Read timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout: Option<i64>,
    /// Write timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout: Option<i64>,
    /// Number of proxy retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    /// Whether the service is enabled (control planes ≥ 2.7).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Client certificate to present upstream; references a certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    /// Whether to verify the upstream's TLS certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_verify: Option<bool>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Server-assigned update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Routing rule attached to a service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Route {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Protocols this route matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    /// HTTP methods this route matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    /// Hostnames this route matches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosts: Option<Vec<String>>,
    /// Path prefixes this route matches (order is matching priority).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paths: Option<Vec<String>>,
    /// Header constraints.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Vec<String>>>,
    /// SNI names this route matches (TLS routes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snis: Option<Vec<String>>,
    /// Status code for HTTPS redirects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_redirect_status_code: Option<i64>,
    /// Priority among regex-matched routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_priority: Option<i64>,
    /// Strip the matched path prefix before proxying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_path: Option<bool>,
    /// Path handling semantics version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_handling: Option<String>,
    /// Preserve the request Host header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preserve_host: Option<bool>,
    /// Buffer the request body (control planes ≥ 2.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_buffering: Option<bool>,
    /// Buffer the response body (control planes ≥ 2.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_buffering: Option<bool>,
    /// Owning service; references a service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Server-assigned update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Plugin instance, scoped to at most one of service, route, consumer, or
/// consumer group (global when unscoped).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Plugin {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Plugin type name (e.g. `rate-limiting`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional instance name (control planes ≥ 3.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    /// Scope: owning service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Scope: owning route.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Scope: owning consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
    /// Scope: owning consumer group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<String>,
    /// Schema-free plugin configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigValue>,
    /// Protocols the plugin runs on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocols: Option<Vec<String>>,
    /// Whether the plugin is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Execution ordering overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<ConfigValue>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Server-assigned update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

impl Plugin {
    /// The scope fields that are set, as (field, id) pairs.
    #[must_use]
    pub fn scopes(&self) -> Vec<(&'static str, &str)> {
        let mut out = Vec::new();
        if let Some(s) = self.service.as_deref() {
            out.push(("service", s));
        }
        if let Some(r) = self.route.as_deref() {
            out.push(("route", r));
        }
        if let Some(c) = self.consumer.as_deref() {
            out.push(("consumer", c));
        }
        if let Some(g) = self.consumer_group.as_deref() {
            out.push(("consumer_group", g));
        }
        out
    }

    /// Returns `true` when no scope field is set.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.scopes().is_empty()
    }
}

/// API consumer. At least one of `username` and `custom_id` must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Consumer {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Unique external identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Named group of consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsumerGroup {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Membership of a consumer in a consumer group.
///
/// A consumer may belong to multiple groups; the (group, consumer) pair is
/// the natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConsumerGroupMembership {
    /// Unique ID (synthetic; the pair is the identity).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The group; references a consumer group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer_group: Option<String>,
    /// The member; references a consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Load-balancing upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Upstream {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Load-balancing algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    /// Number of slots in the balancer ring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slots: Option<i64>,
    /// Primary hash input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    /// Fallback hash input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_fallback: Option<String>,
    /// Header name when hashing on a header.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on_header: Option<String>,
    /// Cookie name when hashing on a cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on_cookie: Option<String>,
    /// Cookie path when hashing on a cookie.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on_cookie_path: Option<String>,
    /// Active/passive health-check configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthchecks: Option<ConfigValue>,
    /// Host header override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_header: Option<String>,
    /// Client certificate for health checks; references a certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_certificate: Option<String>,
    /// Use SRV record names as targets (control planes ≥ 3.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_srv_name: Option<bool>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Backend target of an upstream. The (upstream, target) pair is unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Target {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// `host:port` address of the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Owning upstream; references an upstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    /// Relative weight for load balancing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// TLS certificate and key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Certificate {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// PEM-encoded certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// PEM-encoded private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Alternate PEM-encoded certificate (e.g. ECC alongside RSA).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_alt: Option<String>,
    /// Alternate PEM-encoded private key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_alt: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Server name indication attached to a certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Sni {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Owning certificate; references a certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Trusted CA certificate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaCertificate {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// PEM-encoded CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    /// SHA-256 digest of the DER certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_digest: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// Secrets vault configuration, addressed by prefix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Vault {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique reference prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Vault backend name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Backend-specific configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigValue>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// The credential families the reconciler understands.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// API key.
    #[default]
    KeyAuth,
    /// Encrypted API key.
    KeyAuthEnc,
    /// Username and password.
    BasicAuth,
    /// HMAC signing credential.
    HmacAuth,
    /// JWT signing credential.
    Jwt,
    /// OAuth2 application.
    Oauth2,
    /// Mutual-TLS subject credential.
    MtlsAuth,
}

impl CredentialKind {
    /// Every credential family.
    pub const ALL: &'static [CredentialKind] = &[
        CredentialKind::KeyAuth,
        CredentialKind::KeyAuthEnc,
        CredentialKind::BasicAuth,
        CredentialKind::HmacAuth,
        CredentialKind::Jwt,
        CredentialKind::Oauth2,
        CredentialKind::MtlsAuth,
    ];

    /// The Admin API collection name (e.g. `key-auths`).
    #[must_use]
    pub fn collection(&self) -> &'static str {
        match self {
            Self::KeyAuth => "key-auths",
            Self::KeyAuthEnc => "key-auths-enc",
            Self::BasicAuth => "basic-auths",
            Self::HmacAuth => "hmac-auths",
            Self::Jwt => "jwts",
            Self::Oauth2 => "oauth2-credentials",
            Self::MtlsAuth => "mtls-auths",
        }
    }

    /// The field that acts as this family's natural key.
    #[must_use]
    pub fn key_field(&self) -> &'static str {
        match self {
            Self::KeyAuth | Self::KeyAuthEnc => "key",
            Self::BasicAuth | Self::HmacAuth => "username",
            Self::Jwt => "key",
            Self::Oauth2 => "client_id",
            Self::MtlsAuth => "subject_name",
        }
    }
}

/// A consumer credential of any family.
///
/// The family-specific payload (key, username/password, client_id, ...) is
/// kept as a flattened field bag; [`CredentialKind::key_field`] names the
/// natural key within it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Credential {
    /// The credential family. Implied by the document section or API
    /// collection the record came from, never serialized with the payload.
    #[serde(skip, default)]
    pub kind: CredentialKind,
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Owning consumer; references a consumer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumer: Option<String>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Family-specific fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, ConfigValue>,
}

impl Credential {
    /// The natural-key value for this credential, if present.
    #[must_use]
    pub fn key_value(&self) -> Option<&str> {
        self.fields.get(self.kind.key_field()).and_then(ConfigValue::as_str)
    }
}

/// RBAC role.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RbacRole {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Human-readable comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
}

/// RBAC endpoint permission attached to a role.
///
/// The (role, workspace, endpoint) triple is the natural key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RbacEndpointPermission {
    /// Owning role; references an RBAC role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Workspace the permission applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<String>,
    /// Endpoint pattern the permission applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Permitted actions (e.g. `read`, `create`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<String>>,
    /// Whether this permission is a denial.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative: Option<bool>,
    /// Human-readable comment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Synthetic ID (the triple is the identity; the Admin API addresses
    /// permissions by role + endpoint).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// License payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct License {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque license payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Server-assigned update timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
}

/// Reusable partial configuration block, referenced from plugin configs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Partial {
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Partial type (e.g. `redis-ee`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub partial_type: Option<String>,
    /// The partial's configuration payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ConfigValue>,
    /// User-supplied tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// An entity of a kind unknown to the registry.
///
/// Custom entities are diffed by structural equality only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CustomEntity {
    /// The custom kind name. Implied by the caller's `custom_entity_types`
    /// option, never serialized with the payload.
    #[serde(skip, default)]
    pub entity_type: String,
    /// Unique ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Opaque payload.
    #[serde(flatten)]
    pub fields: BTreeMap<String, ConfigValue>,
}

// ---------------------------------------------------------------------------
// Entity sum type
// ---------------------------------------------------------------------------

/// Any entity the reconciler manages.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// See [`Service`].
    Service(Service),
    /// See [`Route`].
    Route(Route),
    /// See [`Plugin`].
    Plugin(Plugin),
    /// See [`Consumer`].
    Consumer(Consumer),
    /// See [`ConsumerGroup`].
    ConsumerGroup(ConsumerGroup),
    /// See [`ConsumerGroupMembership`].
    ConsumerGroupMembership(ConsumerGroupMembership),
    /// See [`Upstream`].
    Upstream(Upstream),
    /// See [`Target`].
    Target(Target),
    /// See [`Certificate`].
    Certificate(Certificate),
    /// See [`Sni`].
    Sni(Sni),
    /// See [`CaCertificate`].
    CaCertificate(CaCertificate),
    /// See [`Vault`].
    Vault(Vault),
    /// See [`Credential`].
    Credential(Credential),
    /// See [`RbacRole`].
    RbacRole(RbacRole),
    /// See [`RbacEndpointPermission`].
    RbacEndpointPermission(RbacEndpointPermission),
    /// See [`License`].
    License(License),
    /// See [`Partial`].
    Partial(Partial),
    /// See [`CustomEntity`].
    Custom(CustomEntity),
}

impl Entity {
    /// The entity's kind.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Service(_) => EntityKind::Service,
            Self::Route(_) => EntityKind::Route,
            Self::Plugin(_) => EntityKind::Plugin,
            Self::Consumer(_) => EntityKind::Consumer,
            Self::ConsumerGroup(_) => EntityKind::ConsumerGroup,
            Self::ConsumerGroupMembership(_) => EntityKind::ConsumerGroupMembership,
            Self::Upstream(_) => EntityKind::Upstream,
            Self::Target(_) => EntityKind::Target,
            Self::Certificate(_) => EntityKind::Certificate,
            Self::Sni(_) => EntityKind::Sni,
            Self::CaCertificate(_) => EntityKind::CaCertificate,
            Self::Vault(_) => EntityKind::Vault,
            Self::Credential(_) => EntityKind::Credential,
            Self::RbacRole(_) => EntityKind::RbacRole,
            Self::RbacEndpointPermission(_) => EntityKind::RbacEndpointPermission,
            Self::License(_) => EntityKind::License,
            Self::Partial(_) => EntityKind::Partial,
            Self::Custom(c) => EntityKind::Custom(c.entity_type.clone()),
        }
    }

    /// The entity's ID, if assigned.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Service(e) => e.id.as_deref(),
            Self::Route(e) => e.id.as_deref(),
            Self::Plugin(e) => e.id.as_deref(),
            Self::Consumer(e) => e.id.as_deref(),
            Self::ConsumerGroup(e) => e.id.as_deref(),
            Self::ConsumerGroupMembership(e) => e.id.as_deref(),
            Self::Upstream(e) => e.id.as_deref(),
            Self::Target(e) => e.id.as_deref(),
            Self::Certificate(e) => e.id.as_deref(),
            Self::Sni(e) => e.id.as_deref(),
            Self::CaCertificate(e) => e.id.as_deref(),
            Self::Vault(e) => e.id.as_deref(),
            Self::Credential(e) => e.id.as_deref(),
            Self::RbacRole(e) => e.id.as_deref(),
            Self::RbacEndpointPermission(e) => e.id.as_deref(),
            Self::License(e) => e.id.as_deref(),
            Self::Partial(e) => e.id.as_deref(),
            Self::Custom(e) => e.id.as_deref(),
        }
    }

    /// Set the entity's ID.
    pub fn set_id(&mut self, id: impl Into<String>) {
        let id = Some(id.into());
        match self {
            Self::Service(e) => e.id = id,
            Self::Route(e) => e.id = id,
            Self::Plugin(e) => e.id = id,
            Self::Consumer(e) => e.id = id,
            Self::ConsumerGroup(e) => e.id = id,
            Self::ConsumerGroupMembership(e) => e.id = id,
            Self::Upstream(e) => e.id = id,
            Self::Target(e) => e.id = id,
            Self::Certificate(e) => e.id = id,
            Self::Sni(e) => e.id = id,
            Self::CaCertificate(e) => e.id = id,
            Self::Vault(e) => e.id = id,
            Self::Credential(e) => e.id = id,
            Self::RbacRole(e) => e.id = id,
            Self::RbacEndpointPermission(e) => e.id = id,
            Self::License(e) => e.id = id,
            Self::Partial(e) => e.id = id,
            Self::Custom(e) => e.id = id,
        }
    }

    /// The entity's kind-local natural name, when it has one.
    ///
    /// Services, routes, upstreams, groups, SNIs, vaults (prefix), roles,
    /// and partials are addressed by name; consumers by username falling
    /// back to custom_id; targets by their `host:port`; credentials by
    /// their family key. Certificates, CA certificates, licenses,
    /// memberships, and endpoint permissions have no single natural name.
    #[must_use]
    pub fn local_name(&self) -> Option<&str> {
        match self {
            Self::Service(e) => e.name.as_deref(),
            Self::Route(e) => e.name.as_deref(),
            Self::Plugin(e) => e.name.as_deref(),
            Self::Consumer(e) => e.username.as_deref().or(e.custom_id.as_deref()),
            Self::ConsumerGroup(e) => e.name.as_deref(),
            Self::ConsumerGroupMembership(_) => None,
            Self::Upstream(e) => e.name.as_deref(),
            Self::Target(e) => e.target.as_deref(),
            Self::Certificate(_) => None,
            Self::Sni(e) => e.name.as_deref(),
            Self::CaCertificate(_) => None,
            Self::Vault(e) => e.prefix.as_deref(),
            Self::Credential(e) => e.key_value(),
            Self::RbacRole(e) => e.name.as_deref(),
            Self::RbacEndpointPermission(_) => None,
            Self::License(_) => None,
            Self::Partial(e) => e.name.as_deref(),
            Self::Custom(e) => e.fields.get("name").and_then(ConfigValue::as_str),
        }
    }

    /// Read a single-valued foreign-key field by name.
    #[must_use]
    pub fn fk(&self, field: &str) -> Option<&str> {
        match (self, field) {
            (Self::Service(e), "client_certificate") => e.client_certificate.as_deref(),
            (Self::Route(e), "service") => e.service.as_deref(),
            (Self::Plugin(e), "service") => e.service.as_deref(),
            (Self::Plugin(e), "route") => e.route.as_deref(),
            (Self::Plugin(e), "consumer") => e.consumer.as_deref(),
            (Self::Plugin(e), "consumer_group") => e.consumer_group.as_deref(),
            (Self::ConsumerGroupMembership(e), "consumer_group") => e.consumer_group.as_deref(),
            (Self::ConsumerGroupMembership(e), "consumer") => e.consumer.as_deref(),
            (Self::Upstream(e), "client_certificate") => e.client_certificate.as_deref(),
            (Self::Target(e), "upstream") => e.upstream.as_deref(),
            (Self::Sni(e), "certificate") => e.certificate.as_deref(),
            (Self::Credential(e), "consumer") => e.consumer.as_deref(),
            (Self::RbacEndpointPermission(e), "role") => e.role.as_deref(),
            _ => None,
        }
    }

    /// Write a single-valued foreign-key field by name.
    ///
    /// Returns `false` when this kind has no such field.
    pub fn set_fk(&mut self, field: &str, id: impl Into<String>) -> bool {
        let id = Some(id.into());
        match (&mut *self, field) {
            (Self::Service(e), "client_certificate") => e.client_certificate = id,
            (Self::Route(e), "service") => e.service = id,
            (Self::Plugin(e), "service") => e.service = id,
            (Self::Plugin(e), "route") => e.route = id,
            (Self::Plugin(e), "consumer") => e.consumer = id,
            (Self::Plugin(e), "consumer_group") => e.consumer_group = id,
            (Self::ConsumerGroupMembership(e), "consumer_group") => e.consumer_group = id,
            (Self::ConsumerGroupMembership(e), "consumer") => e.consumer = id,
            (Self::Upstream(e), "client_certificate") => e.client_certificate = id,
            (Self::Target(e), "upstream") => e.upstream = id,
            (Self::Sni(e), "certificate") => e.certificate = id,
            (Self::Credential(e), "consumer") => e.consumer = id,
            (Self::RbacEndpointPermission(e), "role") => e.role = id,
            _ => return false,
        }
        true
    }

    /// The entity's payload as a [`ConfigValue`] object.
    #[must_use]
    pub fn to_value(&self) -> ConfigValue {
        let json = match self {
            Self::Service(e) => serde_json::to_value(e),
            Self::Route(e) => serde_json::to_value(e),
            Self::Plugin(e) => serde_json::to_value(e),
            Self::Consumer(e) => serde_json::to_value(e),
            Self::ConsumerGroup(e) => serde_json::to_value(e),
            Self::ConsumerGroupMembership(e) => serde_json::to_value(e),
            Self::Upstream(e) => serde_json::to_value(e),
            Self::Target(e) => serde_json::to_value(e),
            Self::Certificate(e) => serde_json::to_value(e),
            Self::Sni(e) => serde_json::to_value(e),
            Self::CaCertificate(e) => serde_json::to_value(e),
            Self::Vault(e) => serde_json::to_value(e),
            Self::Credential(e) => serde_json::to_value(e),
            Self::RbacRole(e) => serde_json::to_value(e),
            Self::RbacEndpointPermission(e) => serde_json::to_value(e),
            Self::License(e) => serde_json::to_value(e),
            Self::Partial(e) => serde_json::to_value(e),
            Self::Custom(e) => serde_json::to_value(e),
        };
        json.map(ConfigValue::from).unwrap_or(ConfigValue::Null)
    }

    /// Parse an entity of the given kind from a JSON value.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error when the value does not match the
    /// kind's field set.
    pub fn from_json(
        kind: &EntityKind,
        value: serde_json::Value,
    ) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::Service => Self::Service(serde_json::from_value(value)?),
            EntityKind::Route => Self::Route(serde_json::from_value(value)?),
            EntityKind::Plugin => Self::Plugin(serde_json::from_value(value)?),
            EntityKind::Consumer => Self::Consumer(serde_json::from_value(value)?),
            EntityKind::ConsumerGroup => Self::ConsumerGroup(serde_json::from_value(value)?),
            EntityKind::ConsumerGroupMembership => {
                Self::ConsumerGroupMembership(serde_json::from_value(value)?)
            }
            EntityKind::Upstream => Self::Upstream(serde_json::from_value(value)?),
            EntityKind::Target => Self::Target(serde_json::from_value(value)?),
            EntityKind::Certificate => Self::Certificate(serde_json::from_value(value)?),
            EntityKind::Sni => Self::Sni(serde_json::from_value(value)?),
            EntityKind::CaCertificate => Self::CaCertificate(serde_json::from_value(value)?),
            EntityKind::Vault => Self::Vault(serde_json::from_value(value)?),
            EntityKind::Credential => Self::Credential(serde_json::from_value(value)?),
            EntityKind::RbacRole => Self::RbacRole(serde_json::from_value(value)?),
            EntityKind::RbacEndpointPermission => {
                Self::RbacEndpointPermission(serde_json::from_value(value)?)
            }
            EntityKind::License => Self::License(serde_json::from_value(value)?),
            EntityKind::Partial => Self::Partial(serde_json::from_value(value)?),
            EntityKind::Custom(name) => {
                let mut custom: CustomEntity = serde_json::from_value(value)?;
                custom.entity_type = name.clone();
                Self::Custom(custom)
            }
        })
    }

    /// Borrow the inner plugin, if this is a plugin.
    #[must_use]
    pub fn as_plugin(&self) -> Option<&Plugin> {
        match self {
            Self::Plugin(p) => Some(p),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(EntityKind::Service.as_str(), "service");
        assert_eq!(EntityKind::ConsumerGroupMembership.as_str(), "consumer_group_membership");
        assert_eq!(EntityKind::Custom("degraphql_routes".into()).as_str(), "degraphql_routes");
    }

    #[test]
    fn known_kinds_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in EntityKind::KNOWN {
            assert!(seen.insert(kind.as_str()), "duplicate kind {kind}");
        }
    }

    #[test]
    fn consumer_scoped_kinds() {
        assert!(EntityKind::Consumer.is_consumer_scoped());
        assert!(EntityKind::Credential.is_consumer_scoped());
        assert!(EntityKind::ConsumerGroupMembership.is_consumer_scoped());
        assert!(!EntityKind::Service.is_consumer_scoped());
        assert!(!EntityKind::Plugin.is_consumer_scoped());
    }

    #[test]
    fn service_serde_skips_absent_fields() {
        let svc = Service {
            name: Some("svc1".into()),
            host: Some("mockbin.org".into()),
            ..Service::default()
        };
        let json = serde_json::to_value(&svc).unwrap();
        assert_eq!(json, json!({"name": "svc1", "host": "mockbin.org"}));
    }

    #[test]
    fn plugin_scopes_accessor() {
        let global = Plugin {
            name: Some("rate-limiting".into()),
            ..Plugin::default()
        };
        assert!(global.is_global());
        assert!(global.scopes().is_empty());

        let scoped = Plugin {
            name: Some("rate-limiting".into()),
            service: Some("svc-id".into()),
            consumer: Some("c-id".into()),
            ..Plugin::default()
        };
        assert_eq!(
            scoped.scopes(),
            vec![("service", "svc-id"), ("consumer", "c-id")]
        );
    }

    #[test]
    fn consumer_local_name_falls_back_to_custom_id() {
        let by_username = Entity::Consumer(Consumer {
            username: Some("alice".into()),
            custom_id: Some("ext-1".into()),
            ..Consumer::default()
        });
        assert_eq!(by_username.local_name(), Some("alice"));

        let by_custom = Entity::Consumer(Consumer {
            custom_id: Some("ext-2".into()),
            ..Consumer::default()
        });
        assert_eq!(by_custom.local_name(), Some("ext-2"));
    }

    #[test]
    fn fk_get_and_set() {
        let mut route = Entity::Route(Route {
            name: Some("r1".into()),
            service: Some("old-id".into()),
            ..Route::default()
        });
        assert_eq!(route.fk("service"), Some("old-id"));
        assert!(route.set_fk("service", "new-id"));
        assert_eq!(route.fk("service"), Some("new-id"));
        assert!(!route.set_fk("upstream", "x"));
        assert_eq!(route.fk("upstream"), None);
    }

    #[test]
    fn entity_id_roundtrip() {
        let mut svc = Entity::Service(Service::default());
        assert_eq!(svc.id(), None);
        svc.set_id("abc");
        assert_eq!(svc.id(), Some("abc"));
    }

    #[test]
    fn credential_flattens_family_fields() {
        let json = json!({"id": "k1", "consumer": "c1", "key": "secret"});
        let mut cred: Credential = serde_json::from_value(json.clone()).unwrap();
        cred.kind = CredentialKind::KeyAuth;
        assert_eq!(cred.key_value(), Some("secret"));
        assert_eq!(serde_json::to_value(&cred).unwrap(), json);
    }

    #[test]
    fn credential_key_fields_cover_all_families() {
        for kind in CredentialKind::ALL {
            assert!(!kind.key_field().is_empty());
            assert!(!kind.collection().is_empty());
        }
    }

    #[test]
    fn custom_entity_type_survives_from_json() {
        let kind = EntityKind::Custom("degraphql_routes".into());
        let entity =
            Entity::from_json(&kind, json!({"id": "x", "uri": "/graphql"})).unwrap();
        assert_eq!(entity.kind(), kind);
        match entity {
            Entity::Custom(c) => {
                assert_eq!(c.entity_type, "degraphql_routes");
                assert_eq!(c.fields.get("uri").and_then(ConfigValue::as_str), Some("/graphql"));
            }
            other => panic!("expected custom entity, got {other:?}"),
        }
    }

    #[test]
    fn to_value_matches_serde_shape() {
        let entity = Entity::Sni(Sni {
            name: Some("example.com".into()),
            certificate: Some("cert-1".into()),
            ..Sni::default()
        });
        let value = entity.to_value();
        assert_eq!(value.get("name").and_then(ConfigValue::as_str), Some("example.com"));
        assert_eq!(
            value.get("certificate").and_then(ConfigValue::as_str),
            Some("cert-1")
        );
    }

    #[test]
    fn partial_type_field_renames() {
        let partial = Partial {
            name: Some("redis-common".into()),
            partial_type: Some("redis-ee".into()),
            ..Partial::default()
        };
        let json = serde_json::to_value(&partial).unwrap();
        assert_eq!(json["type"], json!("redis-ee"));
    }
}
