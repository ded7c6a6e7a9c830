// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rendering snapshots back into document trees.
//!
//! The inverse of loading: a snapshot becomes a flat document whose
//! sections use the same vocabulary the loader accepts, so a rendered
//! snapshot re-loads to an equal snapshot (IDs included).

use gwr_model::{CredentialKind, Entity, EntityKind};
use gwr_state::Snapshot;
use serde_json::{Map, Value};

/// Document format marker emitted at the top of rendered documents.
pub const FORMAT_VERSION: &str = "3.0";

fn credential_section(kind: CredentialKind) -> &'static str {
    match kind {
        CredentialKind::KeyAuth => "key_auths",
        CredentialKind::KeyAuthEnc => "key_auths_enc",
        CredentialKind::BasicAuth => "basic_auths",
        CredentialKind::HmacAuth => "hmac_auths",
        CredentialKind::Jwt => "jwts",
        CredentialKind::Oauth2 => "oauth2_credentials",
        CredentialKind::MtlsAuth => "mtls_auths",
    }
}

fn section_key(kind: &EntityKind) -> Option<&str> {
    let key = match kind {
        EntityKind::Service => "services",
        EntityKind::Route => "routes",
        EntityKind::Plugin => "plugins",
        EntityKind::Consumer => "consumers",
        EntityKind::ConsumerGroup => "consumer_groups",
        EntityKind::ConsumerGroupMembership => "consumer_group_memberships",
        EntityKind::Upstream => "upstreams",
        EntityKind::Target => "targets",
        EntityKind::Certificate => "certificates",
        EntityKind::Sni => "snis",
        EntityKind::CaCertificate => "ca_certificates",
        EntityKind::Vault => "vaults",
        EntityKind::RbacRole => "rbac_roles",
        EntityKind::RbacEndpointPermission => "rbac_endpoint_permissions",
        EntityKind::License => "licenses",
        EntityKind::Partial => "partials",
        EntityKind::Custom(name) => name.as_str(),
        // Credentials bucket per family.
        EntityKind::Credential => return None,
    };
    Some(key)
}

/// Render a snapshot as a flat document tree.
///
/// Sections appear in canonical kind order; entities keep their IDs, so the
/// rendered document re-loads to an equal snapshot.
#[must_use]
pub fn render_document(snapshot: &Snapshot) -> Value {
    let mut doc = Map::new();
    doc.insert(
        "_format_version".to_string(),
        Value::String(FORMAT_VERSION.to_string()),
    );

    let kinds: Vec<EntityKind> = snapshot.kinds().cloned().collect();
    for kind in &kinds {
        if *kind == EntityKind::Credential {
            for family in CredentialKind::ALL {
                let items: Vec<Value> = snapshot
                    .all(kind)
                    .filter_map(|entity| match entity {
                        Entity::Credential(c) if c.kind == *family => {
                            Some(entity.to_value().to_json())
                        }
                        _ => None,
                    })
                    .collect();
                if !items.is_empty() {
                    doc.insert(credential_section(*family).to_string(), Value::Array(items));
                }
            }
            continue;
        }

        let Some(key) = section_key(kind) else {
            continue;
        };
        let items: Vec<Value> = snapshot
            .all(kind)
            .map(|entity| entity.to_value().to_json())
            .collect();
        if !items.is_empty() {
            doc.insert(key.to_string(), Value::Array(items));
        }
    }

    Value::Object(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Loader;
    use gwr_model::GatewayVersion;
    use gwr_registry::Registry;
    use serde_json::json;

    fn load(document: &Value) -> Snapshot {
        let registry = Registry::new();
        Loader::new(&registry, GatewayVersion::community(3, 4, 0))
            .load(document)
            .unwrap()
            .snapshot
    }

    #[test]
    fn rendered_document_reloads_to_equal_snapshot() {
        let original = load(&json!({
            "services": [{
                "name": "svc1",
                "host": "mockbin.org",
                "routes": [{"name": "r1", "paths": ["/v1"]}],
                "plugins": [{"name": "key-auth"}],
            }],
            "consumers": [{"username": "alice", "key_auths": [{"key": "alice-key"}]}],
            "upstreams": [{"name": "u1", "targets": [{"target": "10.0.0.1:80"}]}],
        }));

        let rendered = render_document(&original);
        let reloaded = load(&rendered);

        assert_eq!(original.len(), reloaded.len());
        for kind in original.kinds() {
            let mut first: Vec<_> = original.all(kind).collect();
            let mut second: Vec<_> = reloaded.all(kind).collect();
            first.sort_by_key(|e| e.id().map(ToString::to_string));
            second.sort_by_key(|e| e.id().map(ToString::to_string));
            assert_eq!(first, second, "kind {kind} differs after round-trip");
        }
    }

    #[test]
    fn format_version_marker_is_present() {
        let doc = render_document(&load(&json!({"services": [{"name": "svc1"}]})));
        assert_eq!(doc["_format_version"], json!(FORMAT_VERSION));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let doc = render_document(&load(&json!({"services": [{"name": "svc1"}]})));
        let map = doc.as_object().unwrap();
        assert!(map.contains_key("services"));
        assert!(!map.contains_key("routes"));
        assert!(!map.contains_key("key_auths"));
    }

    #[test]
    fn credentials_bucket_by_family() {
        let doc = render_document(&load(&json!({
            "consumers": [{
                "username": "alice",
                "key_auths": [{"key": "k1"}],
                "basic_auths": [{"username": "alice", "password": "pw"}],
            }],
        })));
        assert_eq!(doc["key_auths"].as_array().unwrap().len(), 1);
        assert_eq!(doc["basic_auths"].as_array().unwrap().len(), 1);
    }
}
