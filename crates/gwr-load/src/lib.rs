// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-load
//!
//! Builds a target snapshot from a parsed, env-substituted document tree.
//!
//! The loader runs a fixed stage order, short-circuiting on the first
//! validation failure: collect (hoisting nested children to flat records) →
//! parse → assign synthetic IDs → resolve name references → validate →
//! normalize (dual-form canonicalization + server defaults) → de-duplicate →
//! freeze into a [`Snapshot`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Rendering snapshots back into document trees.
pub mod document;
/// Deterministic synthetic IDs.
pub mod ids;

use gwr_error::{ErrorCode, ReconcileError};
use gwr_model::{ConfigValue, CredentialKind, Entity, EntityKind, GatewayVersion};
use gwr_registry::Registry;
use gwr_state::Snapshot;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// A loaded target snapshot plus non-fatal findings.
#[derive(Debug)]
pub struct LoadOutcome {
    /// The frozen target snapshot.
    pub snapshot: Snapshot,
    /// Warnings: lossy dual-form collapses, stripped version-gated fields,
    /// unknown document sections.
    pub warnings: Vec<String>,
}

/// Document sections holding credentials, with their families.
const CREDENTIAL_SECTIONS: &[(&str, CredentialKind)] = &[
    ("key_auths", CredentialKind::KeyAuth),
    ("key_auths_enc", CredentialKind::KeyAuthEnc),
    ("basic_auths", CredentialKind::BasicAuth),
    ("hmac_auths", CredentialKind::HmacAuth),
    ("jwts", CredentialKind::Jwt),
    ("oauth2_credentials", CredentialKind::Oauth2),
    ("mtls_auths", CredentialKind::MtlsAuth),
];

/// Document sections mapping one-to-one onto kinds.
const PLAIN_SECTIONS: &[(&str, EntityKind)] = &[
    ("routes", EntityKind::Route),
    ("plugins", EntityKind::Plugin),
    ("consumer_groups", EntityKind::ConsumerGroup),
    ("consumer_group_memberships", EntityKind::ConsumerGroupMembership),
    ("targets", EntityKind::Target),
    ("snis", EntityKind::Sni),
    ("ca_certificates", EntityKind::CaCertificate),
    ("vaults", EntityKind::Vault),
    ("rbac_endpoint_permissions", EntityKind::RbacEndpointPermission),
    ("licenses", EntityKind::License),
    ("partials", EntityKind::Partial),
];

/// Loads documents into target snapshots for one control-plane version.
#[derive(Debug)]
pub struct Loader<'a> {
    registry: &'a Registry,
    version: GatewayVersion,
}

struct Raw {
    kind: EntityKind,
    credential: Option<CredentialKind>,
    value: serde_json::Value,
}

impl<'a> Loader<'a> {
    /// Create a loader for the given registry and control-plane version.
    #[must_use]
    pub fn new(registry: &'a Registry, version: GatewayVersion) -> Self {
        Self { registry, version }
    }

    /// Load a document tree into a target snapshot.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure: `parse` for malformed shapes,
    /// `unresolved-reference` for dangling names, `invalid-scope` for
    /// plugin scope violations, `duplicate-key` for uniqueness conflicts.
    pub fn load(&self, document: &serde_json::Value) -> Result<LoadOutcome, ReconcileError> {
        let mut warnings = Vec::new();
        let raws = self.collect(document, &mut warnings)?;

        // Parse and group by kind, preserving document order within a kind.
        let mut by_kind: BTreeMap<EntityKind, Vec<Entity>> = BTreeMap::new();
        for raw in raws {
            let mut entity = Entity::from_json(&raw.kind, raw.value).map_err(|e| {
                ReconcileError::new(
                    ErrorCode::Parse,
                    format!("malformed {} entry", raw.kind),
                )
                .with_context("detail", e.to_string())
            })?;
            if let (Entity::Credential(cred), Some(kind)) = (&mut entity, raw.credential) {
                cred.kind = kind;
            }
            by_kind.entry(raw.kind).or_default().push(entity);
        }

        // Assign IDs and index names, parents before children.
        let mut id_set: HashSet<(EntityKind, String)> = HashSet::new();
        let mut name_map: HashMap<(EntityKind, String), String> = HashMap::new();
        let kinds: Vec<EntityKind> = self.registry.kinds().cloned().collect();
        for kind in &kinds {
            let Some(entities) = by_kind.get_mut(kind) else {
                continue;
            };
            for entity in entities.iter_mut() {
                if entity.id().is_none() {
                    let id = synthesize_id(entity)?;
                    entity.set_id(id);
                }
                let id = entity.id().unwrap_or_default().to_string();
                id_set.insert((kind.clone(), id.clone()));
                for name in findable_names(entity) {
                    name_map.entry((kind.clone(), name)).or_insert(id.clone());
                }
            }
        }

        // Resolve name references to IDs.
        for kind in &kinds {
            let Some(entities) = by_kind.get_mut(kind) else {
                continue;
            };
            let Some(descriptor) = self.registry.get(kind) else {
                continue;
            };
            for entity in entities.iter_mut() {
                for fk in &descriptor.foreign_keys {
                    let Some(reference) = entity.fk(fk.field).map(ToString::to_string) else {
                        continue;
                    };
                    if id_set.contains(&(fk.kind.clone(), reference.clone())) {
                        continue;
                    }
                    match name_map.get(&(fk.kind.clone(), reference.clone())) {
                        Some(id) => {
                            let id = id.clone();
                            entity.set_fk(fk.field, id);
                        }
                        None => {
                            return Err(ReconcileError::new(
                                ErrorCode::UnresolvedReference,
                                format!(
                                    "{kind} references unknown {} {reference:?}",
                                    fk.kind
                                ),
                            )
                            .with_context("field", fk.field));
                        }
                    }
                }
            }
        }

        // Validate invariants, then normalize.
        for entities in by_kind.values_mut() {
            for entity in entities.iter_mut() {
                self.validate(entity, &mut warnings)?;
                warnings.extend(gwr_registry::normalize(entity, &self.version));
            }
        }

        // De-duplicate: identical repeated definitions collapse, conflicting
        // ones fail.
        let mut deduped: BTreeMap<EntityKind, Vec<Entity>> = BTreeMap::new();
        let mut seen: HashMap<(EntityKind, String), Entity> = HashMap::new();
        for (kind, entities) in by_kind {
            for entity in entities {
                let id = entity.id().unwrap_or_default().to_string();
                let key = (kind.clone(), id);
                match seen.get(&key) {
                    Some(existing) if *existing == entity => {
                        debug!(target: "gwr.load", kind = %kind, "collapsed duplicate definition");
                        continue;
                    }
                    Some(_) => {
                        return Err(ReconcileError::new(
                            ErrorCode::DuplicateKey,
                            format!("conflicting duplicate definitions of {kind} {:?}", key.1),
                        ));
                    }
                    None => {}
                }
                seen.insert(key, entity.clone());
                deduped.entry(kind.clone()).or_default().push(entity);
            }
        }

        // Freeze. The builder re-checks closure and uniqueness on the final
        // record set.
        let mut builder = Snapshot::builder();
        for entities in deduped.into_values() {
            for entity in entities {
                builder.add(entity).map_err(|e| e.to_reconcile_error())?;
            }
        }
        let snapshot = builder
            .build(self.registry)
            .map_err(|e| e.to_reconcile_error())?;

        debug!(target: "gwr.load", entities = snapshot.len(), "loaded target snapshot");
        Ok(LoadOutcome { snapshot, warnings })
    }

    // -- collection ------------------------------------------------------

    fn collect(
        &self,
        document: &serde_json::Value,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Raw>, ReconcileError> {
        let Some(doc) = document.as_object() else {
            return Err(ReconcileError::new(
                ErrorCode::Parse,
                "document root must be an object",
            ));
        };

        let mut raws = Vec::new();
        let mut known_sections: HashSet<&str> =
            ["services", "consumers", "upstreams", "certificates", "rbac_roles"]
                .into_iter()
                .collect();
        known_sections.extend(PLAIN_SECTIONS.iter().map(|(key, _)| *key));
        known_sections.extend(CREDENTIAL_SECTIONS.iter().map(|(key, _)| *key));

        for entry in section(doc, "services")? {
            let mut service = entry.clone();
            let routes = take_array(&mut service, "routes")?;
            let plugins = take_array(&mut service, "plugins")?;
            let parent = reference_value(&service, &["name", "id"]).ok_or_else(|| {
                ReconcileError::new(ErrorCode::Parse, "service entry needs a name or id")
            })?;
            raws.push(Raw {
                kind: EntityKind::Service,
                credential: None,
                value: service,
            });
            for mut route in routes {
                default_field(&mut route, "service", &parent);
                raws.push(Raw {
                    kind: EntityKind::Route,
                    credential: None,
                    value: route,
                });
            }
            for mut plugin in plugins {
                default_field(&mut plugin, "service", &parent);
                raws.push(Raw {
                    kind: EntityKind::Plugin,
                    credential: None,
                    value: plugin,
                });
            }
        }

        for entry in section(doc, "consumers")? {
            let mut consumer = entry.clone();
            let groups = take_array(&mut consumer, "groups")?;
            let mut nested_credentials = Vec::new();
            for (key, family) in CREDENTIAL_SECTIONS {
                for credential in take_array(&mut consumer, key)? {
                    nested_credentials.push((*family, credential));
                }
            }
            let parent = reference_value(&consumer, &["username", "custom_id", "id"])
                .ok_or_else(|| {
                    ReconcileError::new(
                        ErrorCode::Parse,
                        "consumer entry needs a username, custom_id, or id",
                    )
                })?;
            raws.push(Raw {
                kind: EntityKind::Consumer,
                credential: None,
                value: consumer,
            });
            for group in groups {
                let group_name = reference_value(&group, &["name", "id"])
                    .or_else(|| group.as_str().map(ToString::to_string))
                    .ok_or_else(|| {
                        ReconcileError::new(
                            ErrorCode::Parse,
                            "consumer group membership needs a group name",
                        )
                    })?;
                raws.push(Raw {
                    kind: EntityKind::ConsumerGroupMembership,
                    credential: None,
                    value: serde_json::json!({
                        "consumer": parent,
                        "consumer_group": group_name,
                    }),
                });
            }
            for (family, mut credential) in nested_credentials {
                default_field(&mut credential, "consumer", &parent);
                raws.push(Raw {
                    kind: EntityKind::Credential,
                    credential: Some(family),
                    value: credential,
                });
            }
        }

        for entry in section(doc, "upstreams")? {
            let mut upstream = entry.clone();
            let targets = take_array(&mut upstream, "targets")?;
            let parent = reference_value(&upstream, &["name", "id"]).ok_or_else(|| {
                ReconcileError::new(ErrorCode::Parse, "upstream entry needs a name or id")
            })?;
            raws.push(Raw {
                kind: EntityKind::Upstream,
                credential: None,
                value: upstream,
            });
            for mut target in targets {
                default_field(&mut target, "upstream", &parent);
                raws.push(Raw {
                    kind: EntityKind::Target,
                    credential: None,
                    value: target,
                });
            }
        }

        for entry in section(doc, "certificates")? {
            let mut certificate = entry.clone();
            let snis = take_array(&mut certificate, "snis")?;
            let parent = certificate_reference(&certificate).ok_or_else(|| {
                ReconcileError::new(ErrorCode::Parse, "certificate entry needs an id or cert")
            })?;
            raws.push(Raw {
                kind: EntityKind::Certificate,
                credential: None,
                value: certificate,
            });
            for sni in snis {
                let mut sni_value = if let Some(name) = sni.as_str() {
                    serde_json::json!({ "name": name })
                } else {
                    sni
                };
                default_field(&mut sni_value, "certificate", &parent);
                raws.push(Raw {
                    kind: EntityKind::Sni,
                    credential: None,
                    value: sni_value,
                });
            }
        }

        for entry in section(doc, "rbac_roles")? {
            let mut role = entry.clone();
            let permissions = take_array(&mut role, "endpoint_permissions")?;
            let parent = reference_value(&role, &["name", "id"]).ok_or_else(|| {
                ReconcileError::new(ErrorCode::Parse, "rbac role entry needs a name or id")
            })?;
            raws.push(Raw {
                kind: EntityKind::RbacRole,
                credential: None,
                value: role,
            });
            for mut permission in permissions {
                default_field(&mut permission, "role", &parent);
                raws.push(Raw {
                    kind: EntityKind::RbacEndpointPermission,
                    credential: None,
                    value: permission,
                });
            }
        }

        for (key, kind) in PLAIN_SECTIONS {
            for entry in section(doc, key)? {
                raws.push(Raw {
                    kind: kind.clone(),
                    credential: None,
                    value: entry.clone(),
                });
            }
        }

        for (key, family) in CREDENTIAL_SECTIONS {
            for entry in section(doc, key)? {
                raws.push(Raw {
                    kind: EntityKind::Credential,
                    credential: Some(*family),
                    value: entry.clone(),
                });
            }
        }

        // Registered custom kinds read their own section by type name.
        for kind in self.registry.kinds() {
            if let EntityKind::Custom(type_name) = kind {
                for entry in section(doc, type_name)? {
                    raws.push(Raw {
                        kind: kind.clone(),
                        credential: None,
                        value: entry.clone(),
                    });
                }
                known_sections.insert(type_name.as_str());
            }
        }

        for key in doc.keys() {
            if !key.starts_with('_') && !known_sections.contains(key.as_str()) {
                warnings.push(format!("ignoring unknown document section {key:?}"));
            }
        }

        Ok(raws)
    }

    // -- validation ------------------------------------------------------

    fn validate(
        &self,
        entity: &Entity,
        warnings: &mut Vec<String>,
    ) -> Result<(), ReconcileError> {
        match entity {
            Entity::Consumer(consumer) => {
                if consumer.username.is_none() && consumer.custom_id.is_none() {
                    return Err(ReconcileError::new(
                        ErrorCode::Parse,
                        "consumer needs at least one of username and custom_id",
                    ));
                }
            }
            Entity::Plugin(plugin) => {
                let scopes = plugin.scopes();
                if scopes.len() > 1 {
                    let fields: Vec<&str> = scopes.iter().map(|(field, _)| *field).collect();
                    let group_route_pair = fields.len() == 2
                        && fields.contains(&"consumer_group")
                        && fields.contains(&"route");
                    if !(group_route_pair && self.version.at_least(3, 5)) {
                        let name = plugin.name.as_deref().unwrap_or("(unnamed)");
                        return Err(ReconcileError::new(
                            ErrorCode::InvalidScope,
                            format!(
                                "plugin {name} sets multiple scopes ({})",
                                fields.join(", ")
                            ),
                        ));
                    }
                }
                if plugin.instance_name.is_some() && !self.version.at_least(3, 2) {
                    warnings.push(format!(
                        "plugin {} sets instance_name, unsupported before 3.2; dropping",
                        plugin.name.as_deref().unwrap_or("(unnamed)")
                    ));
                }
            }
            Entity::Service(service) => {
                if service.enabled.is_some() && !self.version.at_least(2, 7) {
                    warnings.push(
                        "service.enabled is unsupported before 2.7; dropping".to_string(),
                    );
                }
            }
            Entity::Route(route) => {
                if (route.request_buffering.is_some() || route.response_buffering.is_some())
                    && !self.version.at_least(2, 2)
                {
                    warnings.push(
                        "route buffering toggles are unsupported before 2.2; dropping"
                            .to_string(),
                    );
                }
            }
            Entity::Upstream(upstream) => {
                if upstream.use_srv_name.is_some() && !self.version.at_least(3, 1) {
                    warnings.push(
                        "upstream.use_srv_name is unsupported before 3.1; dropping".to_string(),
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

// -- document helpers -----------------------------------------------------

fn section<'v>(
    doc: &'v serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<&'v [serde_json::Value], ReconcileError> {
    match doc.get(key) {
        None | Some(serde_json::Value::Null) => Ok(&[]),
        Some(serde_json::Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(ReconcileError::new(
            ErrorCode::Parse,
            format!("document section {key:?} must be an array"),
        )),
    }
}

fn take_array(
    value: &mut serde_json::Value,
    key: &str,
) -> Result<Vec<serde_json::Value>, ReconcileError> {
    let Some(map) = value.as_object_mut() else {
        return Err(ReconcileError::new(
            ErrorCode::Parse,
            "document entry must be an object",
        ));
    };
    match map.remove(key) {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(serde_json::Value::Array(items)) => Ok(items),
        Some(_) => Err(ReconcileError::new(
            ErrorCode::Parse,
            format!("nested section {key:?} must be an array"),
        )),
    }
}

fn reference_value(value: &serde_json::Value, fields: &[&str]) -> Option<String> {
    let map = value.as_object()?;
    fields
        .iter()
        .find_map(|f| map.get(*f).and_then(|v| v.as_str()))
        .map(ToString::to_string)
}

fn certificate_reference(value: &serde_json::Value) -> Option<String> {
    if let Some(id) = reference_value(value, &["id"]) {
        return Some(id);
    }
    let cert = value.as_object()?.get("cert")?.as_str()?;
    Some(ids::synthetic_id("certificate", &[cert]))
}

fn default_field(value: &mut serde_json::Value, key: &str, reference: &str) {
    if let Some(map) = value.as_object_mut() {
        if !map.contains_key(key) {
            map.insert(key.to_string(), serde_json::Value::String(reference.into()));
        }
    }
}

/// The names an entity can be referenced by from elsewhere in the document.
fn findable_names(entity: &Entity) -> Vec<String> {
    match entity {
        Entity::Consumer(c) => {
            let mut names = Vec::new();
            if let Some(u) = &c.username {
                names.push(u.clone());
            }
            if let Some(cid) = &c.custom_id {
                names.push(cid.clone());
            }
            names
        }
        other => other
            .local_name()
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
    }
}

/// Derive a synthetic ID from the entity's authored natural key.
fn synthesize_id(entity: &Entity) -> Result<String, ReconcileError> {
    let kind = entity.kind();
    let kind_name = kind.as_str().to_string();
    let missing = |what: &str| {
        ReconcileError::new(
            ErrorCode::Parse,
            format!("{kind_name} entry needs an id or {what}"),
        )
    };

    let parts: Vec<String> = match entity {
        Entity::Service(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::Route(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::Plugin(p) => {
            let mut parts = vec![
                "name".to_string(),
                p.name.clone().ok_or_else(|| missing("name"))?,
            ];
            for (field, reference) in p.scopes() {
                parts.push(field.to_string());
                parts.push(reference.to_string());
            }
            parts
        }
        Entity::Consumer(c) => vec![
            c.username
                .clone()
                .or_else(|| c.custom_id.clone())
                .ok_or_else(|| missing("username or custom_id"))?,
        ],
        Entity::ConsumerGroup(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::ConsumerGroupMembership(m) => vec![
            m.consumer_group.clone().ok_or_else(|| missing("consumer_group"))?,
            m.consumer.clone().ok_or_else(|| missing("consumer"))?,
        ],
        Entity::Upstream(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::Target(t) => vec![
            t.upstream.clone().ok_or_else(|| missing("upstream"))?,
            t.target.clone().ok_or_else(|| missing("target"))?,
        ],
        Entity::Certificate(c) => vec![c.cert.clone().ok_or_else(|| missing("cert"))?],
        Entity::Sni(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::CaCertificate(c) => vec![c.cert.clone().ok_or_else(|| missing("cert"))?],
        Entity::Vault(v) => vec![v.prefix.clone().ok_or_else(|| missing("prefix"))?],
        Entity::Credential(c) => vec![
            c.kind.collection().to_string(),
            c.key_value()
                .map(ToString::to_string)
                .ok_or_else(|| missing(c.kind.key_field()))?,
        ],
        Entity::RbacRole(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::RbacEndpointPermission(p) => vec![
            p.role.clone().ok_or_else(|| missing("role"))?,
            p.workspace.clone().unwrap_or_else(|| "*".to_string()),
            p.endpoint.clone().ok_or_else(|| missing("endpoint"))?,
        ],
        Entity::License(l) => vec![l.payload.clone().ok_or_else(|| missing("payload"))?],
        Entity::Partial(e) => vec![e.name.clone().ok_or_else(|| missing("name"))?],
        Entity::Custom(c) => vec![
            c.fields
                .get("name")
                .and_then(ConfigValue::as_str)
                .map(ToString::to_string)
                .ok_or_else(|| missing("name"))?,
        ],
    };

    let part_refs: Vec<&str> = parts.iter().map(String::as_str).collect();
    Ok(ids::synthetic_id(kind.as_str(), &part_refs))
}
