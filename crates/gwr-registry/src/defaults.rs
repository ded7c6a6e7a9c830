// SPDX-License-Identifier: MIT OR Apache-2.0
//! Version-dispatched server defaults.
//!
//! The control plane fills omitted fields on write; filling the same values
//! locally lets the differ decide "equal after the server processes it"
//! without a round-trip. Fields a given version does not know are stripped,
//! so a target written for a newer control plane still compares cleanly
//! against an older one.

use gwr_model::{ConfigValue, Entity, GatewayVersion, Plugin, Route, Service, Target, Upstream};

fn fill<T>(slot: &mut Option<T>, value: T) {
    if slot.is_none() {
        *slot = Some(value);
    }
}

fn fill_with<T>(slot: &mut Option<T>, value: impl FnOnce() -> T) {
    if slot.is_none() {
        *slot = Some(value());
    }
}

/// Deep-merge a defaults tree into a configuration bag.
///
/// Every key missing (or explicitly `null`) in `slot` is filled from
/// `defaults`; nested objects merge recursively. Explicit values always
/// win, so merging is idempotent and never changes an authored field.
fn merge_defaults(slot: &mut Option<ConfigValue>, defaults: ConfigValue) {
    match slot {
        None => *slot = Some(defaults),
        Some(existing) => merge_value(existing, defaults),
    }
}

fn merge_value(existing: &mut ConfigValue, defaults: ConfigValue) {
    if existing.is_null() {
        *existing = defaults;
        return;
    }
    let (Some(map), ConfigValue::Object(default_map)) = (existing.as_object_mut(), defaults)
    else {
        return;
    };
    for (key, default_value) in default_map {
        match map.entry(key) {
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(default_value);
            }
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                merge_value(slot.get_mut(), default_value);
            }
        }
    }
}

/// Fill server defaults on `entity` for the given control-plane version.
///
/// Only kinds with server-side defaulting are touched; everything else
/// passes through unchanged.
pub fn apply_defaults(entity: &mut Entity, version: &GatewayVersion) {
    match entity {
        Entity::Service(svc) => service_defaults(svc, version),
        Entity::Route(route) => route_defaults(route, version),
        Entity::Upstream(upstream) => upstream_defaults(upstream, version),
        Entity::Target(target) => target_defaults(target),
        Entity::Plugin(plugin) => plugin_defaults(plugin, version),
        _ => {}
    }
}

fn service_defaults(svc: &mut Service, version: &GatewayVersion) {
    fill_with(&mut svc.protocol, || "http".to_string());
    fill(&mut svc.port, 80);
    fill(&mut svc.connect_timeout, 60_000);
    fill(&mut svc.read_timeout, 60_000);
    fill(&mut svc.write_timeout, 60_000);
    fill(&mut svc.retries, 5);
    if version.at_least(2, 7) {
        fill(&mut svc.enabled, true);
    } else {
        svc.enabled = None;
    }
}

fn route_defaults(route: &mut Route, version: &GatewayVersion) {
    fill_with(&mut route.protocols, || {
        vec!["http".to_string(), "https".to_string()]
    });
    fill(&mut route.regex_priority, 0);
    fill(&mut route.preserve_host, false);
    fill(&mut route.strip_path, true);
    fill_with(&mut route.path_handling, || "v0".to_string());
    fill(&mut route.https_redirect_status_code, 426);
    if version.at_least(2, 2) {
        fill(&mut route.request_buffering, true);
        fill(&mut route.response_buffering, true);
    } else {
        route.request_buffering = None;
        route.response_buffering = None;
    }
}

fn upstream_defaults(upstream: &mut Upstream, version: &GatewayVersion) {
    fill_with(&mut upstream.algorithm, || "round-robin".to_string());
    fill(&mut upstream.slots, 10_000);
    fill_with(&mut upstream.hash_on, || "none".to_string());
    fill_with(&mut upstream.hash_fallback, || "none".to_string());
    fill_with(&mut upstream.hash_on_cookie_path, || "/".to_string());
    merge_defaults(&mut upstream.healthchecks, healthchecks_defaults());
    if version.at_least(3, 1) {
        fill(&mut upstream.use_srv_name, false);
    } else {
        upstream.use_srv_name = None;
    }
}

/// The health-check tree the server fills on every upstream.
fn healthchecks_defaults() -> ConfigValue {
    serde_json::json!({
        "active": {
            "concurrency": 10,
            "healthy": {
                "http_statuses": [200, 302],
                "interval": 0,
                "successes": 0
            },
            "http_path": "/",
            "https_verify_certificate": true,
            "timeout": 1,
            "type": "http",
            "unhealthy": {
                "http_failures": 0,
                "http_statuses": [429, 404, 500, 501, 502, 503, 504, 505],
                "interval": 0,
                "tcp_failures": 0,
                "timeouts": 0
            }
        },
        "passive": {
            "healthy": {
                "http_statuses": [
                    200, 201, 202, 203, 204, 205, 206, 207, 208, 226,
                    300, 301, 302, 303, 304, 305, 306, 307, 308
                ],
                "successes": 0
            },
            "type": "http",
            "unhealthy": {
                "http_failures": 0,
                "http_statuses": [429, 500, 503],
                "tcp_failures": 0,
                "timeouts": 0
            }
        },
        "threshold": 0
    })
    .into()
}

fn target_defaults(target: &mut Target) {
    fill(&mut target.weight, 100);
}

fn plugin_defaults(plugin: &mut Plugin, version: &GatewayVersion) {
    fill(&mut plugin.enabled, true);
    fill_with(&mut plugin.protocols, || {
        ["grpc", "grpcs", "http", "https"]
            .iter()
            .map(ToString::to_string)
            .collect()
    });
    if !version.at_least(3, 2) {
        plugin.instance_name = None;
    }
    if let Some(name) = plugin.name.clone() {
        if let Some(defaults) = plugin_config_defaults(&name) {
            merge_defaults(&mut plugin.config, defaults);
        }
    }
}

/// Per-plugin config defaults, mirroring what the server fills on write.
///
/// Only plugins whose omitted fields commonly cause spurious diffs are
/// listed; unknown plugins pass through untouched (their config stays
/// schema-free).
fn plugin_config_defaults(plugin: &str) -> Option<ConfigValue> {
    let defaults = match plugin {
        "rate-limiting" | "response-ratelimiting" => serde_json::json!({
            "fault_tolerant": true,
            "limit_by": "consumer",
            "policy": "local"
        }),
        "key-auth" | "key-auth-enc" => serde_json::json!({
            "hide_credentials": false,
            "key_in_body": false,
            "key_in_header": true,
            "key_in_query": true,
            "key_names": ["apikey"],
            "run_on_preflight": true
        }),
        "basic-auth" => serde_json::json!({
            "hide_credentials": false
        }),
        "proxy-cache" => serde_json::json!({
            "cache_control": false,
            "cache_ttl": 300,
            "content_type": ["text/plain", "application/json"],
            "request_method": ["GET", "HEAD"],
            "response_code": [200, 301, 404],
            "storage_ttl": null,
            "strategy": "memory"
        }),
        _ => return None,
    };
    Some(defaults.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwr_model::Consumer;

    #[test]
    fn service_defaults_fill_omitted_fields() {
        let mut entity = Entity::Service(Service {
            name: Some("svc1".into()),
            host: Some("mockbin.org".into()),
            ..Service::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::community(3, 4, 0));
        match entity {
            Entity::Service(svc) => {
                assert_eq!(svc.protocol.as_deref(), Some("http"));
                assert_eq!(svc.port, Some(80));
                assert_eq!(svc.retries, Some(5));
                assert_eq!(svc.connect_timeout, Some(60_000));
                assert_eq!(svc.enabled, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn service_defaults_do_not_override_explicit_values() {
        let mut entity = Entity::Service(Service {
            name: Some("svc1".into()),
            port: Some(8443),
            protocol: Some("https".into()),
            ..Service::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::community(3, 4, 0));
        match entity {
            Entity::Service(svc) => {
                assert_eq!(svc.port, Some(8443));
                assert_eq!(svc.protocol.as_deref(), Some("https"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn service_enabled_stripped_before_2_7() {
        let mut entity = Entity::Service(Service {
            name: Some("svc1".into()),
            enabled: Some(true),
            ..Service::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::community(2, 6, 0));
        match entity {
            Entity::Service(svc) => assert_eq!(svc.enabled, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn route_buffering_gated_on_2_2() {
        let mut new = Entity::Route(Route {
            name: Some("r1".into()),
            ..Route::default()
        });
        apply_defaults(&mut new, &GatewayVersion::community(2, 2, 0));
        match &new {
            Entity::Route(r) => {
                assert_eq!(r.request_buffering, Some(true));
                assert_eq!(r.response_buffering, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut old = Entity::Route(Route {
            name: Some("r1".into()),
            request_buffering: Some(false),
            ..Route::default()
        });
        apply_defaults(&mut old, &GatewayVersion::community(2, 1, 0));
        match &old {
            Entity::Route(r) => {
                assert_eq!(r.request_buffering, None);
                assert_eq!(r.response_buffering, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn upstream_use_srv_name_gated_on_3_1() {
        let mut new = Entity::Upstream(Upstream {
            name: Some("u1".into()),
            ..Upstream::default()
        });
        apply_defaults(&mut new, &GatewayVersion::community(3, 1, 0));
        match &new {
            Entity::Upstream(u) => {
                assert_eq!(u.use_srv_name, Some(false));
                assert_eq!(u.slots, Some(10_000));
                assert_eq!(u.algorithm.as_deref(), Some("round-robin"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let mut old = Entity::Upstream(Upstream {
            name: Some("u1".into()),
            use_srv_name: Some(true),
            ..Upstream::default()
        });
        apply_defaults(&mut old, &GatewayVersion::community(3, 0, 0));
        match &old {
            Entity::Upstream(u) => assert_eq!(u.use_srv_name, None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plugin_instance_name_stripped_before_3_2() {
        let mut plugin = Entity::Plugin(Plugin {
            name: Some("rate-limiting".into()),
            instance_name: Some("per-team".into()),
            ..Plugin::default()
        });
        apply_defaults(&mut plugin, &GatewayVersion::community(3, 1, 0));
        match &plugin {
            Entity::Plugin(p) => assert_eq!(p.instance_name, None),
            other => panic!("unexpected {other:?}"),
        }

        let mut kept = Entity::Plugin(Plugin {
            name: Some("rate-limiting".into()),
            instance_name: Some("per-team".into()),
            ..Plugin::default()
        });
        apply_defaults(&mut kept, &GatewayVersion::community(3, 2, 0));
        match &kept {
            Entity::Plugin(p) => {
                assert_eq!(p.instance_name.as_deref(), Some("per-team"));
                assert_eq!(p.enabled, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn healthchecks_merge_preserves_authored_overrides() {
        let mut entity = Entity::Upstream(Upstream {
            name: Some("u1".into()),
            healthchecks: Some(
                serde_json::json!({
                    "active": {"http_path": "/status", "timeout": 5}
                })
                .into(),
            ),
            ..Upstream::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::default());
        match entity {
            Entity::Upstream(u) => {
                let hc = u.healthchecks.unwrap();
                assert_eq!(
                    hc.get_path(&["active", "http_path"]).unwrap().as_str(),
                    Some("/status")
                );
                assert_eq!(hc.get_path(&["active", "timeout"]).unwrap().as_i64(), Some(5));
                // Untouched branches come from the defaults tree.
                assert_eq!(
                    hc.get_path(&["active", "concurrency"]).unwrap().as_i64(),
                    Some(10)
                );
                assert_eq!(hc.get_path(&["threshold"]).unwrap().as_i64(), Some(0));
                assert!(hc.get_path(&["passive", "healthy"]).is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plugin_config_defaults_fill_known_plugins() {
        let mut entity = Entity::Plugin(Plugin {
            name: Some("rate-limiting".into()),
            config: Some(serde_json::json!({"minute": 20, "policy": "redis"}).into()),
            ..Plugin::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::default());
        match entity {
            Entity::Plugin(p) => {
                let config = p.config.unwrap();
                // Authored value wins.
                assert_eq!(config.get("policy").unwrap().as_str(), Some("redis"));
                // Omitted fields pick up the server defaults.
                assert_eq!(config.get("limit_by").unwrap().as_str(), Some("consumer"));
                assert_eq!(config.get("fault_tolerant").unwrap().as_bool(), Some(true));
                assert_eq!(config.get("minute").unwrap().as_i64(), Some(20));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn plugin_without_config_gets_the_full_defaults_table() {
        let mut entity = Entity::Plugin(Plugin {
            name: Some("key-auth".into()),
            ..Plugin::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::default());
        match entity {
            Entity::Plugin(p) => {
                let config = p.config.unwrap();
                let key_names = config.get("key_names").unwrap().as_array().unwrap();
                assert_eq!(key_names[0].as_str(), Some("apikey"));
                assert_eq!(config.get("key_in_header").unwrap().as_bool(), Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_plugin_configs_pass_through() {
        let authored = serde_json::json!({"anything": ["goes", 1, true]});
        let mut entity = Entity::Plugin(Plugin {
            name: Some("my-custom-plugin".into()),
            config: Some(authored.clone().into()),
            ..Plugin::default()
        });
        apply_defaults(&mut entity, &GatewayVersion::default());
        match entity {
            Entity::Plugin(p) => assert_eq!(p.config.unwrap(), authored.into()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn merging_defaults_twice_is_idempotent() {
        let mut first = Entity::Plugin(Plugin {
            name: Some("rate-limiting".into()),
            config: Some(serde_json::json!({"minute": 20}).into()),
            ..Plugin::default()
        });
        apply_defaults(&mut first, &GatewayVersion::default());
        let mut second = first.clone();
        apply_defaults(&mut second, &GatewayVersion::default());
        assert_eq!(first, second);
    }

    #[test]
    fn target_weight_defaults_to_100() {
        let mut target = Entity::Target(Target {
            target: Some("10.0.0.1:8000".into()),
            ..Target::default()
        });
        apply_defaults(&mut target, &GatewayVersion::default());
        match target {
            Entity::Target(t) => assert_eq!(t.weight, Some(100)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn kinds_without_defaults_pass_through() {
        let original = Consumer {
            username: Some("alice".into()),
            ..Consumer::default()
        };
        let mut entity = Entity::Consumer(original.clone());
        apply_defaults(&mut entity, &GatewayVersion::default());
        assert_eq!(entity, Entity::Consumer(original));
    }
}
