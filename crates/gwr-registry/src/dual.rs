// SPDX-License-Identifier: MIT OR Apache-2.0
//! Deprecated/new field duality canonicalization.
//!
//! Several plugins expose the same underlying attribute twice: a flat
//! deprecated shorthand (`redis_host`) and a nested replacement
//! (`redis.host`). The normalizer collapses both inputs to a single
//! canonical form so equivalent documents produce equal records. This module
//! is the only place that knows about the duality; everything downstream
//! sees the canonical form.

use gwr_model::{ConfigValue, Entity, GatewayVersion, Plugin};

/// Shorthand key → nested key under `config.redis`.
const REDIS_FIELDS: &[(&str, &str)] = &[
    ("redis_host", "host"),
    ("redis_port", "port"),
    ("redis_username", "username"),
    ("redis_password", "password"),
    ("redis_ssl", "ssl"),
    ("redis_ssl_verify", "ssl_verify"),
    ("redis_server_name", "server_name"),
    ("redis_timeout", "timeout"),
    ("redis_database", "database"),
];

/// The control-plane minor release in which a plugin's nested redis block
/// became the canonical form. `None` for plugins without the duality
/// (openid-connect is deliberately absent: its old fields are left as
/// authored rather than guessing a canonical form).
fn redis_duality_gate(plugin_name: &str) -> Option<(u64, u64)> {
    match plugin_name {
        "acme" => Some((3, 6)),
        "rate-limiting" | "response-ratelimiting" => Some((3, 8)),
        "rate-limiting-advanced" | "graphql-rate-limiting-advanced" => Some((3, 9)),
        _ => None,
    }
}

/// Canonicalize dual-form fields on `entity`, returning human-readable
/// warnings for lossy collapses (both forms present and unequal).
pub fn canonicalize(entity: &mut Entity, version: &GatewayVersion) -> Vec<String> {
    match entity {
        Entity::Plugin(plugin) => canonicalize_plugin(plugin, version),
        _ => Vec::new(),
    }
}

fn canonicalize_plugin(plugin: &mut Plugin, version: &GatewayVersion) -> Vec<String> {
    let mut warnings = Vec::new();
    let Some(name) = plugin.name.clone() else {
        return warnings;
    };
    let Some(config) = plugin.config.as_mut() else {
        return warnings;
    };

    if let Some((major, minor)) = redis_duality_gate(&name) {
        if version.at_least(major, minor) {
            nest_redis_shorthand(&name, config, &mut warnings);
        } else {
            flatten_redis_block(&name, config, &mut warnings);
        }
    }

    canonicalize_sync_rate(config, version);
    warnings
}

/// Move flat `redis_*` keys into the nested `redis` object. The nested form
/// wins when both are present and disagree.
fn nest_redis_shorthand(plugin: &str, config: &mut ConfigValue, warnings: &mut Vec<String>) {
    let Some(map) = config.as_object_mut() else {
        return;
    };

    let mut moved = Vec::new();
    for (shorthand, nested_key) in REDIS_FIELDS {
        if let Some(flat) = map.remove(*shorthand) {
            if !flat.is_null() {
                moved.push((*shorthand, *nested_key, flat));
            }
        }
    }
    if moved.is_empty() {
        return;
    }

    let redis = map
        .entry("redis".to_string())
        .or_insert_with(ConfigValue::object);
    if redis.is_null() {
        *redis = ConfigValue::object();
    }
    let Some(block) = redis.as_object_mut() else {
        return;
    };
    for (shorthand, nested_key, flat) in moved {
        let occupied = block.get(nested_key).is_some_and(|v| !v.is_null());
        if occupied {
            if block[nested_key] != flat {
                warnings.push(format!(
                    "plugin {plugin}: both {shorthand} and redis.{nested_key} set; \
                     keeping redis.{nested_key}"
                ));
            }
        } else {
            block.insert(nested_key.to_string(), flat);
        }
    }
}

/// Move nested `redis.*` keys back into the flat shorthand for control
/// planes that predate the nested form. The shorthand wins on conflict.
fn flatten_redis_block(plugin: &str, config: &mut ConfigValue, warnings: &mut Vec<String>) {
    let Some(redis) = config.remove("redis") else {
        return;
    };
    let Some(block) = redis.as_object() else {
        return;
    };
    for (shorthand, nested_key) in REDIS_FIELDS {
        let Some(value) = block.get(*nested_key) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let occupied = config.get(shorthand).is_some_and(|v| !v.is_null());
        if occupied {
            if config.get(shorthand) != Some(value) {
                warnings.push(format!(
                    "plugin {plugin}: both redis.{nested_key} and {shorthand} set; \
                     keeping {shorthand}"
                ));
            }
        } else {
            config.insert(*shorthand, value.clone());
        }
    }
}

/// `sync_rate: -1` means "no sync" on community and self-managed planes,
/// which is also the behavior when the field is absent; collapse the two.
/// Hosted planes give -1 distinct semantics, so the value is preserved there.
fn canonicalize_sync_rate(config: &mut ConfigValue, version: &GatewayVersion) {
    if version.hosted {
        return;
    }
    if config.get("sync_rate").and_then(ConfigValue::as_i64) == Some(-1) {
        config.remove("sync_rate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plugin_with_config(name: &str, config: serde_json::Value) -> Entity {
        Entity::Plugin(Plugin {
            name: Some(name.into()),
            config: Some(config.into()),
            ..Plugin::default()
        })
    }

    fn config_of(entity: &Entity) -> &ConfigValue {
        match entity {
            Entity::Plugin(p) => p.config.as_ref().unwrap(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn shorthand_nests_at_or_above_gate() {
        let mut entity = plugin_with_config(
            "rate-limiting",
            json!({"minute": 20, "redis_host": "localhost", "redis_port": 6379}),
        );
        let warnings = canonicalize(&mut entity, &GatewayVersion::community(3, 8, 0));
        assert!(warnings.is_empty());
        let config = config_of(&entity);
        assert!(config.get("redis_host").is_none());
        assert_eq!(
            config.get_path(&["redis", "host"]).unwrap().as_str(),
            Some("localhost")
        );
        assert_eq!(config.get_path(&["redis", "port"]).unwrap().as_i64(), Some(6379));
    }

    #[test]
    fn nested_flattens_below_gate() {
        let mut entity = plugin_with_config(
            "rate-limiting",
            json!({"minute": 20, "redis": {"host": "localhost"}}),
        );
        let warnings = canonicalize(&mut entity, &GatewayVersion::community(3, 7, 0));
        assert!(warnings.is_empty());
        let config = config_of(&entity);
        assert!(config.get("redis").is_none());
        assert_eq!(config.get("redis_host").unwrap().as_str(), Some("localhost"));
    }

    #[test]
    fn equivalent_dual_inputs_converge() {
        let version = GatewayVersion::community(3, 9, 0);
        let mut shorthand = plugin_with_config("rate-limiting", json!({"redis_host": "h"}));
        let mut nested = plugin_with_config("rate-limiting", json!({"redis": {"host": "h"}}));
        canonicalize(&mut shorthand, &version);
        canonicalize(&mut nested, &version);
        assert_eq!(config_of(&shorthand), config_of(&nested));
    }

    #[test]
    fn conflicting_dual_inputs_warn_and_prefer_nested() {
        let mut entity = plugin_with_config(
            "rate-limiting",
            json!({"redis_host": "old", "redis": {"host": "new"}}),
        );
        let warnings = canonicalize(&mut entity, &GatewayVersion::community(3, 8, 0));
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("redis_host"));
        assert_eq!(
            config_of(&entity).get_path(&["redis", "host"]).unwrap().as_str(),
            Some("new")
        );
    }

    #[test]
    fn equal_dual_inputs_collapse_silently() {
        let mut entity = plugin_with_config(
            "acme",
            json!({"redis_host": "same", "redis": {"host": "same"}}),
        );
        let warnings = canonicalize(&mut entity, &GatewayVersion::community(3, 6, 0));
        assert!(warnings.is_empty());
        assert!(config_of(&entity).get("redis_host").is_none());
    }

    #[test]
    fn gates_vary_by_plugin() {
        // acme nests from 3.6; rate-limiting still flattens at 3.6.
        let version = GatewayVersion::community(3, 6, 0);

        let mut acme = plugin_with_config("acme", json!({"redis_host": "h"}));
        canonicalize(&mut acme, &version);
        assert!(config_of(&acme).get("redis").is_some());

        let mut rl = plugin_with_config("rate-limiting", json!({"redis": {"host": "h"}}));
        canonicalize(&mut rl, &version);
        assert!(config_of(&rl).get("redis").is_none());
        assert!(config_of(&rl).get("redis_host").is_some());
    }

    #[test]
    fn unrelated_plugins_untouched() {
        let original = json!({"redis_host": "h", "anonymous": null});
        let mut entity = plugin_with_config("openid-connect", original.clone());
        let warnings = canonicalize(&mut entity, &GatewayVersion::community(3, 9, 0));
        assert!(warnings.is_empty());
        assert_eq!(config_of(&entity), &ConfigValue::from(original));
    }

    #[test]
    fn sync_rate_minus_one_collapses_to_absent() {
        let mut entity = plugin_with_config(
            "rate-limiting-advanced",
            json!({"sync_rate": -1, "limit": [10]}),
        );
        canonicalize(&mut entity, &GatewayVersion::enterprise(3, 9, 0));
        assert!(config_of(&entity).get("sync_rate").is_none());
    }

    #[test]
    fn sync_rate_preserved_on_hosted_planes() {
        let mut entity = plugin_with_config(
            "rate-limiting-advanced",
            json!({"sync_rate": -1, "limit": [10]}),
        );
        canonicalize(&mut entity, &GatewayVersion::enterprise(3, 9, 0).hosted());
        assert_eq!(config_of(&entity).get("sync_rate").unwrap().as_i64(), Some(-1));
    }

    #[test]
    fn positive_sync_rate_preserved_everywhere() {
        let mut entity = plugin_with_config("rate-limiting-advanced", json!({"sync_rate": 10}));
        canonicalize(&mut entity, &GatewayVersion::enterprise(3, 9, 0));
        assert_eq!(config_of(&entity).get("sync_rate").unwrap().as_i64(), Some(10));
    }

    #[test]
    fn non_plugin_entities_pass_through() {
        let mut entity = Entity::Service(gwr_model::Service::default());
        assert!(canonicalize(&mut entity, &GatewayVersion::default()).is_empty());
    }
}
