// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-reconciler
//!
//! The facade over the reconciliation pipeline: load a target document,
//! dump current state, diff the two, execute the change graph, and render
//! the outcome. The CLI (and any embedder) talks to this crate only.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gwr_client::dump::DumpOptions;
use gwr_diff::DiffOptions;
use gwr_exec::{ExecOptions, Executor};
use gwr_graph::ChangeGraph;
use gwr_load::Loader;
use gwr_mask::{Environment, MaskSet, ProcessEnvironment};
use gwr_registry::Registry;
use gwr_state::mirror::LiveMirror;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub use gwr_client::{AdminApiClient, ClientError, ConfigurationClient, InMemoryClient};
pub use gwr_diff::{ChangeOp, ChangeRecord, DiffResult, DiffSummary};
pub use gwr_error::{ErrorCategory, ErrorCode, ReconcileError};
pub use gwr_exec::{
    CancelReason, CancellationToken, Clock, OperationResult, SyncReport, SyncStats, SystemClock,
};
pub use gwr_load::LoadOutcome;
pub use gwr_model::GatewayVersion;
pub use gwr_render::RenderMode;
pub use gwr_state::Snapshot;

/// Environment-variable prefix the masker reads by default.
pub const DEFAULT_ENV_PREFIX: &str = "GWR_";

/// The full caller-facing option set.
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum concurrent operations (≥ 1).
    pub parallelism: usize,
    /// Plan only: no client calls during sync.
    pub dry_run: bool,
    /// Suppress delete operations entirely.
    pub no_deletes: bool,
    /// Exclude consumer and credential kinds from both sides.
    pub skip_consumers: bool,
    /// Include license entities.
    pub include_licenses: bool,
    /// Replace environment-variable values with `[masked]` in rendered
    /// output.
    pub mask_env_values: bool,
    /// Server-side tag filter applied to list operations.
    pub select_tags: Vec<String>,
    /// Kinds unknown to the registry, diffed by structural equality only.
    pub custom_entity_types: Vec<String>,
    /// Per-operation deadline during sync.
    pub op_deadline: Option<Duration>,
    /// Prefix filter for the masker's environment scan.
    pub env_prefix: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            parallelism: 10,
            dry_run: false,
            no_deletes: false,
            skip_consumers: false,
            include_licenses: false,
            mask_env_values: false,
            select_tags: Vec::new(),
            custom_entity_types: Vec::new(),
            op_deadline: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }
}

/// The reconciliation pipeline, configured once per run.
pub struct Reconciler {
    registry: Registry,
    options: Options,
    mask: MaskSet,
}

impl Reconciler {
    /// Build a reconciler; custom entity types are registered and the mask
    /// set is gathered from the process environment when enabled.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let env = ProcessEnvironment::with_prefix(&options.env_prefix);
        Self::with_environment(options, &env)
    }

    /// Build a reconciler with an explicit environment (tests inject a
    /// static one).
    #[must_use]
    pub fn with_environment(options: Options, env: &dyn Environment) -> Self {
        let mut registry = Registry::new();
        for entity_type in &options.custom_entity_types {
            registry.register_custom(entity_type);
        }
        let mask = if options.mask_env_values {
            MaskSet::from_environment(env)
        } else {
            MaskSet::empty()
        };
        Self {
            registry,
            options,
            mask,
        }
    }

    /// The registry backing this run (custom kinds included).
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Load a target document for the given control-plane version.
    ///
    /// # Errors
    ///
    /// Validation errors (`parse`, `unresolved-reference`, `invalid-scope`,
    /// `duplicate-key`) abort before anything else happens.
    pub fn load_target(
        &self,
        document: &serde_json::Value,
        version: GatewayVersion,
    ) -> Result<LoadOutcome, ReconcileError> {
        Loader::new(&self.registry, version).load(document)
    }

    /// Dump the control plane's current configuration.
    ///
    /// # Errors
    ///
    /// Client failures map onto transport/server codes.
    pub async fn dump_current(
        &self,
        client: &dyn ConfigurationClient,
        version: &GatewayVersion,
    ) -> Result<Snapshot, ReconcileError> {
        let dump_options = DumpOptions {
            select_tags: self.options.select_tags.clone(),
            skip_consumers: self.options.skip_consumers,
            include_licenses: self.options.include_licenses,
        };
        gwr_client::dump::dump(client, &self.registry, version, &dump_options).await
    }

    /// Compute the change set between two snapshots.
    #[must_use]
    pub fn diff(&self, current: &Snapshot, target: &Snapshot) -> DiffResult {
        let diff_options = DiffOptions {
            no_deletes: self.options.no_deletes,
            skip_consumers: self.options.skip_consumers,
            include_licenses: self.options.include_licenses,
        };
        gwr_diff::diff(current, target, &self.registry, &diff_options, &self.mask)
    }

    /// Diff and execute: drive `current` to `target` through `client`.
    ///
    /// Returns the planned change set alongside the execution report, so
    /// callers can always show what was planned even when parts failed.
    ///
    /// # Errors
    ///
    /// `cycle-detected` when the change set's dependencies are cyclic;
    /// execution failures are reported in the [`SyncReport`], never as an
    /// `Err`.
    pub async fn sync(
        &self,
        current: &Snapshot,
        target: &Snapshot,
        client: Arc<dyn ConfigurationClient>,
        token: CancellationToken,
    ) -> Result<(DiffResult, SyncReport), ReconcileError> {
        let plan = self.diff(current, target);
        info!(
            target: "gwr.reconciler",
            creating = plan.summary.creating,
            updating = plan.summary.updating,
            deleting = plan.summary.deleting,
            dry_run = self.options.dry_run,
            "executing change set"
        );
        let graph = ChangeGraph::build(plan.changes.clone(), &self.registry)?;
        let mirror = Arc::new(LiveMirror::from_snapshot(current));
        let exec_options = ExecOptions {
            parallelism: self.options.parallelism.max(1),
            dry_run: self.options.dry_run,
            op_deadline: self.options.op_deadline,
        };
        let report = Executor::new(client)
            .with_options(exec_options)
            .run(graph, mirror, token)
            .await;
        Ok((plan, report))
    }

    /// Render a change set (and optionally the execution outcome) in the
    /// requested mode.
    #[must_use]
    pub fn render(
        &self,
        plan: &DiffResult,
        report: Option<&SyncReport>,
        mode: RenderMode,
    ) -> String {
        match mode {
            RenderMode::Text => gwr_render::render_text(&plan.changes, &plan.summary),
            RenderMode::Json => {
                let errors: Vec<String> = report
                    .map(|r| r.errors.iter().map(ToString::to_string).collect())
                    .unwrap_or_default();
                gwr_render::render_json(
                    &plan.changes,
                    &plan.summary,
                    &plan.warnings,
                    &errors,
                    &self.mask,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwr_client::InMemoryClient;
    use gwr_model::EntityKind;
    use serde_json::json;

    fn client_at(version: GatewayVersion) -> Arc<InMemoryClient> {
        Arc::new(InMemoryClient::new(version))
    }

    #[tokio::test]
    async fn end_to_end_sync_creates_everything() {
        let version = GatewayVersion::default();
        let client = client_at(version);
        let reconciler = Reconciler::new(Options::default());

        let target = reconciler
            .load_target(
                &json!({
                    "services": [{
                        "name": "svc1",
                        "host": "mockbin.org",
                        "routes": [{"name": "r1", "paths": ["/v1"]}],
                    }],
                }),
                version,
            )
            .unwrap()
            .snapshot;
        let current = reconciler
            .dump_current(client.as_ref(), &version)
            .await
            .unwrap();

        let (plan, report) = reconciler
            .sync(
                &current,
                &target,
                client.clone() as Arc<dyn ConfigurationClient>,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(plan.summary.creating, 2);
        assert!(report.is_clean());
        assert_eq!(report.stats.create_ops, 2);
        assert_eq!(client.stored(), 2);
    }

    #[tokio::test]
    async fn second_sync_is_a_no_op() {
        let version = GatewayVersion::default();
        let client = client_at(version);
        let reconciler = Reconciler::new(Options::default());
        let document = json!({
            "services": [{"name": "svc1", "host": "mockbin.org", "tags": ["test"]}],
        });

        let target = reconciler
            .load_target(&document, version)
            .unwrap()
            .snapshot;
        let current = reconciler
            .dump_current(client.as_ref(), &version)
            .await
            .unwrap();
        reconciler
            .sync(
                &current,
                &target,
                client.clone() as Arc<dyn ConfigurationClient>,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        // Re-dump and re-diff: nothing left to do.
        let target = reconciler
            .load_target(&document, version)
            .unwrap()
            .snapshot;
        let current = reconciler
            .dump_current(client.as_ref(), &version)
            .await
            .unwrap();
        let plan = reconciler.diff(&current, &target);
        assert_eq!(plan.summary.total(), 0, "changes: {:?}", plan.changes);
    }

    #[tokio::test]
    async fn dry_run_plans_without_touching_the_plane() {
        let version = GatewayVersion::default();
        let client = client_at(version);
        let reconciler = Reconciler::new(Options {
            dry_run: true,
            ..Options::default()
        });

        let target = reconciler
            .load_target(&json!({"services": [{"name": "svc1"}]}), version)
            .unwrap()
            .snapshot;
        let current = reconciler
            .dump_current(client.as_ref(), &version)
            .await
            .unwrap();
        let (plan, report) = reconciler
            .sync(
                &current,
                &target,
                client.clone() as Arc<dyn ConfigurationClient>,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(plan.summary.creating, 1);
        assert_eq!(report.stats.create_ops, 1);
        assert!(client.calls().is_empty());
        assert_eq!(client.stored(), 0);
    }

    #[tokio::test]
    async fn custom_entity_types_participate() {
        let version = GatewayVersion::default();
        let reconciler = Reconciler::new(Options {
            custom_entity_types: vec!["degraphql_routes".into()],
            ..Options::default()
        });
        let target = reconciler
            .load_target(
                &json!({"degraphql_routes": [{"name": "q", "uri": "/graphql"}]}),
                version,
            )
            .unwrap()
            .snapshot;
        let current = reconciler
            .dump_current(client_at(version).as_ref(), &version)
            .await
            .unwrap();
        let plan = reconciler.diff(&current, &target);
        assert_eq!(plan.summary.creating, 1);
        assert_eq!(
            plan.changes[0].kind,
            EntityKind::Custom("degraphql_routes".into())
        );
    }

    #[test]
    fn render_modes_produce_text_and_json() {
        let reconciler = Reconciler::new(Options::default());
        let plan = DiffResult::default();
        let text = reconciler.render(&plan, None, RenderMode::Text);
        assert!(text.starts_with("Summary:"));
        let json_out = reconciler.render(&plan, None, RenderMode::Json);
        assert!(json_out.ends_with('\n'));
        assert!(serde_json::from_str::<serde_json::Value>(&json_out).is_ok());
    }
}
