// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end reconciliation scenarios with literal expected output.

use gwr_mask::StaticEnvironment;
use gwr_model::EntityKind;
use gwr_reconciler::{
    CancellationToken, ConfigurationClient, GatewayVersion, InMemoryClient, Options, Reconciler,
    RenderMode,
};
use serde_json::json;
use std::sync::Arc;

fn version() -> GatewayVersion {
    GatewayVersion::community(3, 4, 0)
}

/// Seed the mock plane by syncing a baseline document into it.
async fn seed(client: &Arc<InMemoryClient>, document: serde_json::Value) {
    let reconciler = Reconciler::new(Options::default());
    let target = reconciler
        .load_target(&document, version())
        .unwrap()
        .snapshot;
    let current = reconciler
        .dump_current(client.as_ref(), &version())
        .await
        .unwrap();
    let (_, report) = reconciler
        .sync(
            &current,
            &target,
            Arc::clone(client) as Arc<dyn ConfigurationClient>,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.is_clean(), "seeding failed: {:?}", report.errors);
}

async fn plan(
    client: &Arc<InMemoryClient>,
    reconciler: &Reconciler,
    document: serde_json::Value,
) -> gwr_reconciler::DiffResult {
    let target = reconciler
        .load_target(&document, version())
        .unwrap()
        .snapshot;
    let current = reconciler
        .dump_current(client.as_ref(), &version())
        .await
        .unwrap();
    reconciler.diff(&current, &target)
}

#[tokio::test]
async fn create_new_plugin_on_existing_service() {
    let client = Arc::new(InMemoryClient::new(version()));
    seed(&client, json!({"services": [{"name": "svc1", "host": "mockbin.org"}]})).await;

    let reconciler = Reconciler::new(Options::default());
    let result = plan(
        &client,
        &reconciler,
        json!({
            "services": [{"name": "svc1", "host": "mockbin.org"}],
            "plugins": [{"name": "rate-limiting"}],
        }),
    )
    .await;

    assert_eq!(result.summary.creating, 1);
    assert_eq!(result.summary.updating, 0);
    assert_eq!(result.summary.deleting, 0);
    let change = &result.changes[0];
    assert_eq!(change.name, "rate-limiting (global)");
    assert_eq!(change.kind, EntityKind::Plugin);
}

#[tokio::test]
async fn update_one_field_on_a_service() {
    let client = Arc::new(InMemoryClient::new(version()));
    seed(&client, json!({"services": [{"name": "svc1", "host": "mockbin.org"}]})).await;

    let reconciler = Reconciler::new(Options::default());
    let result = plan(
        &client,
        &reconciler,
        json!({"services": [{"name": "svc1", "host": "mockbin.org", "tags": ["test"]}]}),
    )
    .await;

    assert_eq!(result.summary.creating, 0);
    assert_eq!(result.summary.updating, 1);
    assert_eq!(result.summary.deleting, 0);
    assert!(
        result.changes[0]
            .diff
            .contains("+  \"tags\": [\n+    \"test\"\n+  ]"),
        "diff blob was: {}",
        result.changes[0].diff
    );
}

#[tokio::test]
async fn masking_covers_host_and_tags() {
    let client = Arc::new(InMemoryClient::new(version()));
    seed(&client, json!({"services": [{"name": "svc1", "host": "old.example"}]})).await;

    let env = StaticEnvironment::default().var("GWR_SVC1_HOSTNAME", "mockbin.org");
    let reconciler = Reconciler::with_environment(
        Options {
            mask_env_values: true,
            ..Options::default()
        },
        &env,
    );
    // The document arrives env-substituted: {{GWR_SVC1_HOSTNAME}} is already
    // "mockbin.org" by the time the core sees it.
    let result = plan(
        &client,
        &reconciler,
        json!({
            "services": [{
                "name": "svc1",
                "host": "mockbin.org",
                "tags": ["mockbin.org is an external host"],
            }],
        }),
    )
    .await;

    assert_eq!(result.summary.updating, 1);
    let blob = &result.changes[0].diff;
    assert!(blob.contains("\"host\": \"[masked]\""), "{blob}");
    assert!(blob.contains("\"[masked] is an external host\""), "{blob}");
    assert!(!blob.contains("mockbin.org"), "{blob}");

    // The JSON report masks payload bodies the same way.
    let rendered = reconciler.render(&result, None, RenderMode::Json);
    assert!(!rendered.contains("mockbin.org"), "{rendered}");
}

#[tokio::test]
async fn no_deletes_suppresses_plugin_removal() {
    let client = Arc::new(InMemoryClient::new(version()));
    seed(
        &client,
        json!({
            "services": [{"name": "svc1", "host": "mockbin.org"}],
            "plugins": [{"name": "key-auth"}],
        }),
    )
    .await;

    let target = json!({"services": [{"name": "svc1", "host": "mockbin.org"}]});

    let baseline = Reconciler::new(Options::default());
    let without_flag = plan(&client, &baseline, target.clone()).await;
    assert_eq!(without_flag.summary.deleting, 1);

    let suppressing = Reconciler::new(Options {
        no_deletes: true,
        ..Options::default()
    });
    let with_flag = plan(&client, &suppressing, target).await;
    assert_eq!(with_flag.summary.deleting, 0);
    assert_eq!(with_flag.summary.creating, without_flag.summary.creating);
    assert_eq!(with_flag.summary.updating, without_flag.summary.updating);
    assert!(with_flag.warnings.iter().any(|w| w.contains("key-auth")));
}

#[tokio::test]
async fn deprecated_and_new_redis_forms_are_equivalent() {
    let redis_version = GatewayVersion::community(3, 8, 0);
    let client = Arc::new(InMemoryClient::new(redis_version));

    // Current state carries the deprecated shorthand form.
    let reconciler = Reconciler::new(Options::default());
    let seed_target = reconciler
        .load_target(
            &json!({
                "plugins": [{
                    "name": "rate-limiting",
                    "config": {"minute": 20, "redis_host": "localhost"},
                }],
            }),
            redis_version,
        )
        .unwrap()
        .snapshot;
    let empty = reconciler
        .dump_current(client.as_ref(), &redis_version)
        .await
        .unwrap();
    let (_, report) = reconciler
        .sync(
            &empty,
            &seed_target,
            Arc::clone(&client) as Arc<dyn ConfigurationClient>,
            CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(report.is_clean());

    let current = reconciler
        .dump_current(client.as_ref(), &redis_version)
        .await
        .unwrap();

    for config in [
        json!({"minute": 20, "redis_host": "localhost"}),
        json!({"minute": 20, "redis": {"host": "localhost"}}),
    ] {
        let target = reconciler
            .load_target(
                &json!({"plugins": [{"name": "rate-limiting", "config": config}]}),
                redis_version,
            )
            .unwrap()
            .snapshot;
        let result = reconciler.diff(&current, &target);
        assert_eq!(
            result.summary.total(),
            0,
            "expected no changes, got {:?}",
            result.changes
        );
    }
}

#[tokio::test]
async fn cascaded_deletion_orders_snis_before_certificate() {
    let client = Arc::new(InMemoryClient::new(version()));
    seed(
        &client,
        json!({
            "certificates": [{
                "cert": "PEM-CERT",
                "key": "PEM-KEY",
                "snis": ["a.example.com", "b.example.com"],
            }],
        }),
    )
    .await;
    client
        .calls()
        .iter()
        .for_each(|c| assert_eq!(c.op, "create"));

    let reconciler = Reconciler::new(Options::default());
    let target = reconciler.load_target(&json!({}), version()).unwrap().snapshot;
    let current = reconciler
        .dump_current(client.as_ref(), &version())
        .await
        .unwrap();
    let (plan, report) = reconciler
        .sync(
            &current,
            &target,
            Arc::clone(&client) as Arc<dyn ConfigurationClient>,
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(plan.summary.deleting, 3);
    assert!(report.is_clean());
    assert_eq!(report.stats.delete_ops, 3);

    let deletes: Vec<_> = client
        .calls()
        .into_iter()
        .filter(|c| c.op == "delete")
        .collect();
    assert_eq!(deletes.len(), 3);
    assert_eq!(deletes[0].kind, EntityKind::Sni);
    assert_eq!(deletes[1].kind, EntityKind::Sni);
    assert_eq!(deletes[2].kind, EntityKind::Certificate);
    assert_eq!(client.stored(), 0);
}
