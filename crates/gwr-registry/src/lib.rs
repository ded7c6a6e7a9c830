// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-registry
//!
//! The single authoritative source of per-kind behavior: natural-key
//! derivation, foreign keys, comparison policy, mask policy,
//! version-dispatched defaults, and deprecated/new field-duality
//! canonicalization. Adding a new entity kind is a descriptor edit here;
//! no other component special-cases kinds.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Deprecated/new field duality canonicalization.
pub mod dual;

/// Version-dispatched server defaults.
pub mod defaults;

use gwr_model::{Entity, EntityKind, GatewayVersion};
use std::collections::BTreeMap;

/// Normalize an entity for comparison: collapse dual-form fields to the
/// canonical form for `version`, then fill server defaults.
///
/// Both snapshots pass through here (the loader for targets, the dump for
/// current state), so "equal after the server processes it" is decidable
/// locally. Returns warnings for lossy collapses.
pub fn normalize(entity: &mut Entity, version: &GatewayVersion) -> Vec<String> {
    let warnings = dual::canonicalize(entity, version);
    defaults::apply_defaults(entity, version);
    warnings
}

/// A single-valued foreign-key field on an entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// The field name holding the referenced ID.
    pub field: &'static str,
    /// The referenced entity's kind.
    pub kind: EntityKind,
}

impl ForeignKey {
    fn new(field: &'static str, kind: EntityKind) -> Self {
        Self { field, kind }
    }
}

/// Resolves (kind, id) to that entity's natural name within the snapshot
/// being indexed. Returns `None` when the entity is absent or nameless.
pub type NameLookup<'a> = dyn Fn(&EntityKind, &str) -> Option<String> + 'a;

/// Derives an entity's natural key.
///
/// Keys embed referent *names* (resolved through the [`NameLookup`]),
/// never IDs, so the same logical entity produces the same key in both the
/// current and the target snapshot even though their IDs differ.
pub type NaturalKeyFn = fn(&Entity, &NameLookup<'_>) -> Option<String>;

/// Everything the reconciler knows about one entity kind.
#[derive(Debug, Clone)]
pub struct KindDescriptor {
    /// The kind being described.
    pub kind: EntityKind,
    /// Natural-key derivation for cross-snapshot joins and uniqueness
    /// checks. Kinds addressed by ID only (certificates, licenses) derive
    /// no key.
    pub natural_key: NaturalKeyFn,
    /// Single-valued foreign keys to other kinds.
    pub foreign_keys: Vec<ForeignKey>,
    /// Fields excluded from update-equality (server bookkeeping and
    /// identity; matching may pair a synthetic target ID with a live one).
    pub excluded_from_comparison: &'static [&'static str],
    /// List fields compared as sets rather than positionally.
    pub set_like_fields: &'static [&'static str],
    /// String-bearing fields scanned by the masker at render time.
    pub maskable_fields: &'static [&'static str],
}

const EXCLUDE_STANDARD: &[&str] = &["id", "created_at", "updated_at"];

impl KindDescriptor {
    /// Derive `entity`'s natural key, resolving referents through `lookup`.
    #[must_use]
    pub fn natural_key_of(&self, entity: &Entity, lookup: &NameLookup<'_>) -> Option<String> {
        (self.natural_key)(entity, lookup)
    }

    /// Returns `true` when `field` compares as a set.
    #[must_use]
    pub fn is_set_like(&self, field: &str) -> bool {
        self.set_like_fields.contains(&field)
    }

    /// Returns `true` when `field` participates in update-equality.
    #[must_use]
    pub fn is_comparable(&self, field: &str) -> bool {
        !self.excluded_from_comparison.contains(&field)
    }

    /// Returns `true` when `field` is scanned by the masker.
    #[must_use]
    pub fn is_maskable(&self, field: &str) -> bool {
        self.maskable_fields.contains(&field)
    }

    fn structural_only(kind: EntityKind) -> Self {
        Self {
            kind,
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &[],
        }
    }
}

/// The registry of kind descriptors, including caller-registered custom
/// kinds (diffed by structural equality only).
#[derive(Debug, Clone)]
pub struct Registry {
    descriptors: BTreeMap<EntityKind, KindDescriptor>,
}

impl Registry {
    /// Build the registry over every statically known kind.
    #[must_use]
    pub fn new() -> Self {
        let mut descriptors = BTreeMap::new();
        for kind in EntityKind::KNOWN {
            descriptors.insert(kind.clone(), builtin_descriptor(kind));
        }
        Self { descriptors }
    }

    /// Register a custom kind for structural-only diffing.
    ///
    /// Registering the same type twice is idempotent.
    pub fn register_custom(&mut self, entity_type: impl Into<String>) {
        let kind = EntityKind::Custom(entity_type.into());
        self.descriptors
            .entry(kind.clone())
            .or_insert_with(|| KindDescriptor::structural_only(kind));
    }

    /// Look up the descriptor for a kind.
    #[must_use]
    pub fn get(&self, kind: &EntityKind) -> Option<&KindDescriptor> {
        self.descriptors.get(kind)
    }

    /// Every registered kind, in canonical order.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        // Canonical order first, then custom kinds sorted by name.
        EntityKind::KNOWN
            .iter()
            .chain(
                self.descriptors
                    .keys()
                    .filter(|k| matches!(k, EntityKind::Custom(_))),
            )
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Natural-key derivations
// ---------------------------------------------------------------------------

fn resolve(lookup: &NameLookup<'_>, kind: &EntityKind, id: &str) -> String {
    lookup(kind, id).unwrap_or_else(|| id.to_string())
}

/// Kinds addressed by a single unique name (consumers fall back from
/// username to custom_id through [`Entity::local_name`]).
fn local_name_key(entity: &Entity, _lookup: &NameLookup<'_>) -> Option<String> {
    entity.local_name().map(ToString::to_string)
}

/// Kinds addressed by ID only.
fn no_natural_key(_entity: &Entity, _lookup: &NameLookup<'_>) -> Option<String> {
    None
}

/// Plugins are unique per (name, scope set); the scope referents appear by
/// name so the key survives ID translation.
fn plugin_key(entity: &Entity, lookup: &NameLookup<'_>) -> Option<String> {
    let Entity::Plugin(plugin) = entity else {
        return None;
    };
    let name = plugin.name.as_deref()?;
    let mut key = format!("name={name}");
    for (field, id) in plugin.scopes() {
        let referent = resolve(lookup, &scope_kind(field), id);
        key.push_str(&format!(";{field}={referent}"));
    }
    Some(key)
}

fn membership_key(entity: &Entity, lookup: &NameLookup<'_>) -> Option<String> {
    let Entity::ConsumerGroupMembership(membership) = entity else {
        return None;
    };
    let group = resolve(
        lookup,
        &EntityKind::ConsumerGroup,
        membership.consumer_group.as_deref()?,
    );
    let consumer = resolve(lookup, &EntityKind::Consumer, membership.consumer.as_deref()?);
    Some(format!("{group}:{consumer}"))
}

fn target_key(entity: &Entity, lookup: &NameLookup<'_>) -> Option<String> {
    let Entity::Target(target) = entity else {
        return None;
    };
    let upstream = resolve(lookup, &EntityKind::Upstream, target.upstream.as_deref()?);
    Some(format!("{upstream}:{}", target.target.as_deref()?))
}

/// Credential keys carry the family collection: a key-auth `x` and a JWT
/// credential `x` are unrelated records.
fn credential_key(entity: &Entity, _lookup: &NameLookup<'_>) -> Option<String> {
    let Entity::Credential(credential) = entity else {
        return None;
    };
    Some(format!(
        "{}:{}",
        credential.kind.collection(),
        credential.key_value()?
    ))
}

fn permission_key(entity: &Entity, lookup: &NameLookup<'_>) -> Option<String> {
    let Entity::RbacEndpointPermission(permission) = entity else {
        return None;
    };
    let role = resolve(lookup, &EntityKind::RbacRole, permission.role.as_deref()?);
    Some(format!(
        "{role}:{}:{}",
        permission.workspace.as_deref().unwrap_or("*"),
        permission.endpoint.as_deref()?
    ))
}

fn scope_kind(field: &str) -> EntityKind {
    match field {
        "service" => EntityKind::Service,
        "route" => EntityKind::Route,
        "consumer" => EntityKind::Consumer,
        _ => EntityKind::ConsumerGroup,
    }
}

// ---------------------------------------------------------------------------
// Built-in descriptors
// ---------------------------------------------------------------------------

fn builtin_descriptor(kind: &EntityKind) -> KindDescriptor {
    use EntityKind as K;
    match kind {
        K::Service => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: vec![ForeignKey::new("client_certificate", K::Certificate)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["host", "path", "tags"],
        },
        K::Route => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: vec![ForeignKey::new("service", K::Service)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &["protocols", "methods", "snis"],
            maskable_fields: &["hosts", "paths", "tags"],
        },
        K::Plugin => KindDescriptor {
            kind: kind.clone(),
            natural_key: plugin_key,
            foreign_keys: vec![
                ForeignKey::new("service", K::Service),
                ForeignKey::new("route", K::Route),
                ForeignKey::new("consumer", K::Consumer),
                ForeignKey::new("consumer_group", K::ConsumerGroup),
            ],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &["protocols"],
            maskable_fields: &["config", "tags"],
        },
        K::Consumer => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["username", "custom_id", "tags"],
        },
        K::ConsumerGroup => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["tags"],
        },
        K::ConsumerGroupMembership => KindDescriptor {
            kind: kind.clone(),
            natural_key: membership_key,
            foreign_keys: vec![
                ForeignKey::new("consumer_group", K::ConsumerGroup),
                ForeignKey::new("consumer", K::Consumer),
            ],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &[],
        },
        K::Upstream => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: vec![ForeignKey::new("client_certificate", K::Certificate)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["host_header", "tags"],
        },
        K::Target => KindDescriptor {
            kind: kind.clone(),
            natural_key: target_key,
            foreign_keys: vec![ForeignKey::new("upstream", K::Upstream)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["target", "tags"],
        },
        K::Certificate => KindDescriptor {
            kind: kind.clone(),
            natural_key: no_natural_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["cert", "key", "cert_alt", "key_alt", "tags"],
        },
        K::Sni => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: vec![ForeignKey::new("certificate", K::Certificate)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["name", "tags"],
        },
        K::CaCertificate => KindDescriptor {
            kind: kind.clone(),
            natural_key: no_natural_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["cert", "tags"],
        },
        K::Vault => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["config", "description", "tags"],
        },
        K::Credential => KindDescriptor {
            kind: kind.clone(),
            natural_key: credential_key,
            foreign_keys: vec![ForeignKey::new("consumer", K::Consumer)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            // The flattened family fields carry the secrets.
            maskable_fields: &[
                "key", "secret", "password", "client_id", "client_secret", "subject_name", "tags",
            ],
        },
        K::RbacRole => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["comment"],
        },
        K::RbacEndpointPermission => KindDescriptor {
            kind: kind.clone(),
            natural_key: permission_key,
            foreign_keys: vec![ForeignKey::new("role", K::RbacRole)],
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &["actions"],
            maskable_fields: &["comment"],
        },
        K::License => KindDescriptor {
            kind: kind.clone(),
            natural_key: no_natural_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["payload"],
        },
        K::Partial => KindDescriptor {
            kind: kind.clone(),
            natural_key: local_name_key,
            foreign_keys: Vec::new(),
            excluded_from_comparison: EXCLUDE_STANDARD,
            set_like_fields: &[],
            maskable_fields: &["config", "tags"],
        },
        K::Custom(_) => KindDescriptor::structural_only(kind.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwr_model::{ConfigValue, Credential, CredentialKind, Plugin, RbacEndpointPermission};

    fn no_names(_: &EntityKind, _: &str) -> Option<String> {
        None
    }

    #[test]
    fn every_known_kind_has_a_descriptor() {
        let registry = Registry::new();
        for kind in EntityKind::KNOWN {
            assert!(registry.get(kind).is_some(), "missing descriptor for {kind}");
        }
    }

    #[test]
    fn descriptor_kind_matches_lookup_key() {
        let registry = Registry::new();
        for kind in EntityKind::KNOWN {
            assert_eq!(&registry.get(kind).unwrap().kind, kind);
        }
    }

    #[test]
    fn plugin_foreign_keys_cover_all_scopes() {
        let registry = Registry::new();
        let plugin = registry.get(&EntityKind::Plugin).unwrap();
        let fields: Vec<&str> = plugin.foreign_keys.iter().map(|fk| fk.field).collect();
        assert_eq!(fields, ["service", "route", "consumer", "consumer_group"]);
    }

    #[test]
    fn standard_exclusions_apply_everywhere() {
        let registry = Registry::new();
        for kind in EntityKind::KNOWN {
            let desc = registry.get(kind).unwrap();
            assert!(!desc.is_comparable("id"));
            assert!(!desc.is_comparable("created_at"));
            assert!(desc.is_comparable("name"));
        }
    }

    #[test]
    fn route_set_like_fields() {
        let registry = Registry::new();
        let route = registry.get(&EntityKind::Route).unwrap();
        assert!(route.is_set_like("protocols"));
        assert!(route.is_set_like("methods"));
        assert!(!route.is_set_like("paths"));
        assert!(!route.is_set_like("hosts"));
    }

    #[test]
    fn custom_kind_registration_is_idempotent() {
        let mut registry = Registry::new();
        registry.register_custom("degraphql_routes");
        registry.register_custom("degraphql_routes");
        let kind = EntityKind::Custom("degraphql_routes".into());
        let desc = registry.get(&kind).unwrap();
        assert!(desc.foreign_keys.is_empty());
        assert_eq!(registry.kinds().filter(|k| **k == kind).count(), 1);
    }

    #[test]
    fn unregistered_custom_kind_is_absent() {
        let registry = Registry::new();
        assert!(registry.get(&EntityKind::Custom("unknown".into())).is_none());
    }

    #[test]
    fn certificate_masks_key_material() {
        let registry = Registry::new();
        let cert = registry.get(&EntityKind::Certificate).unwrap();
        assert!(cert.is_maskable("cert"));
        assert!(cert.is_maskable("key"));
        assert!(!cert.is_maskable("id"));
    }

    #[test]
    fn plugin_natural_key_embeds_scope_names() {
        let registry = Registry::new();
        let descriptor = registry.get(&EntityKind::Plugin).unwrap();
        let plugin = Entity::Plugin(Plugin {
            name: Some("rate-limiting".into()),
            service: Some("svc-id".into()),
            ..Plugin::default()
        });
        let lookup = |kind: &EntityKind, id: &str| {
            (kind == &EntityKind::Service && id == "svc-id").then(|| "svc1".to_string())
        };
        assert_eq!(
            descriptor.natural_key_of(&plugin, &lookup).as_deref(),
            Some("name=rate-limiting;service=svc1")
        );
        // An unresolvable referent falls back to the raw ID.
        assert_eq!(
            descriptor.natural_key_of(&plugin, &no_names).as_deref(),
            Some("name=rate-limiting;service=svc-id")
        );
    }

    #[test]
    fn natural_keys_disambiguate_credential_families() {
        let registry = Registry::new();
        let descriptor = registry.get(&EntityKind::Credential).unwrap();
        let credential = |kind: CredentialKind, field: &str| {
            Entity::Credential(Credential {
                kind,
                fields: [(field.to_string(), ConfigValue::String("x".into()))]
                    .into_iter()
                    .collect(),
                ..Credential::default()
            })
        };
        let key_auth = descriptor
            .natural_key_of(&credential(CredentialKind::KeyAuth, "key"), &no_names)
            .unwrap();
        let jwt = descriptor
            .natural_key_of(&credential(CredentialKind::Jwt, "key"), &no_names)
            .unwrap();
        let basic = descriptor
            .natural_key_of(&credential(CredentialKind::BasicAuth, "username"), &no_names)
            .unwrap();
        assert_eq!(key_auth, "key-auths:x");
        assert_eq!(jwt, "jwts:x");
        assert_eq!(basic, "basic-auths:x");
        assert_ne!(key_auth, jwt);
    }

    #[test]
    fn credential_key_uses_the_family_key_field() {
        let registry = Registry::new();
        let descriptor = registry.get(&EntityKind::Credential).unwrap();
        // A basic-auth credential with only a password has no natural key.
        let incomplete = Entity::Credential(Credential {
            kind: CredentialKind::BasicAuth,
            fields: [("password".to_string(), ConfigValue::String("pw".into()))]
                .into_iter()
                .collect(),
            ..Credential::default()
        });
        assert!(descriptor.natural_key_of(&incomplete, &no_names).is_none());
    }

    #[test]
    fn id_only_kinds_have_no_natural_key() {
        let registry = Registry::new();
        for kind in [
            EntityKind::Certificate,
            EntityKind::CaCertificate,
            EntityKind::License,
        ] {
            let descriptor = registry.get(&kind).unwrap();
            let entity = Entity::Certificate(gwr_model::Certificate {
                id: Some("cert1".into()),
                cert: Some("PEM".into()),
                ..gwr_model::Certificate::default()
            });
            assert!(descriptor.natural_key_of(&entity, &no_names).is_none());
        }
    }

    #[test]
    fn permission_key_defaults_workspace_to_star() {
        let registry = Registry::new();
        let descriptor = registry.get(&EntityKind::RbacEndpointPermission).unwrap();
        let permission = Entity::RbacEndpointPermission(RbacEndpointPermission {
            role: Some("role-id".into()),
            endpoint: Some("/services".into()),
            ..RbacEndpointPermission::default()
        });
        let lookup = |kind: &EntityKind, id: &str| {
            (kind == &EntityKind::RbacRole && id == "role-id").then(|| "admin".to_string())
        };
        assert_eq!(
            descriptor.natural_key_of(&permission, &lookup).as_deref(),
            Some("admin:*:/services")
        );
    }
}
