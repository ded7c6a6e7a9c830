// SPDX-License-Identifier: MIT OR Apache-2.0
//! Subcommand implementations and exit-code policy.
//!
//! Exit codes: 0 success, 1 validation error, 2 execution error (at least
//! one failed operation or an unreachable control plane), 3 cancelled.

use clap::Args;
use gwr_load::document::render_document;
use gwr_reconciler::{
    AdminApiClient, CancelReason, CancellationToken, ConfigurationClient, Options, Reconciler,
    RenderMode, SyncReport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Successful run.
pub const EXIT_OK: i32 = 0;
/// The document or desired state failed validation.
pub const EXIT_VALIDATION: i32 = 1;
/// Execution reached the control plane and at least one operation failed.
pub const EXIT_EXECUTION: i32 = 2;
/// The run was cancelled.
pub const EXIT_CANCELLED: i32 = 3;

/// Where and how to reach the control plane.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Admin API base URL.
    pub addr: String,
    /// Optional `NAME=VALUE` auth header.
    pub auth_header: Option<String>,
    /// Whether the control plane is hosted.
    pub hosted: bool,
}

/// Flags shared by diff/sync/dump.
#[derive(Debug, Clone, Default, Args)]
pub struct RunFlags {
    /// Maximum concurrent operations.
    #[arg(long, default_value_t = 10)]
    pub parallelism: usize,

    /// Never delete anything, even when the state file omits it.
    #[arg(long)]
    pub no_deletes: bool,

    /// Exclude consumers and their credentials from both sides.
    #[arg(long)]
    pub skip_consumers: bool,

    /// Manage license entities as well.
    #[arg(long)]
    pub include_licenses: bool,

    /// Replace environment-variable values with [masked] in output.
    #[arg(long)]
    pub mask_env_values: bool,

    /// Server-side tag filter; repeatable.
    #[arg(long = "select-tag")]
    pub select_tags: Vec<String>,

    /// Custom entity type to manage; repeatable.
    #[arg(long = "custom-entity-type")]
    pub custom_entity_types: Vec<String>,

    /// Per-operation deadline in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Environment-variable prefix the masker scans.
    #[arg(long, default_value = "GWR_")]
    pub env_prefix: String,
}

impl RunFlags {
    fn into_options(self, dry_run: bool) -> Options {
        Options {
            parallelism: self.parallelism.max(1),
            dry_run,
            no_deletes: self.no_deletes,
            skip_consumers: self.skip_consumers,
            include_licenses: self.include_licenses,
            mask_env_values: self.mask_env_values,
            select_tags: self.select_tags,
            custom_entity_types: self.custom_entity_types,
            op_deadline: self.timeout_secs.map(Duration::from_secs),
            env_prefix: self.env_prefix,
        }
    }
}

fn client_for(connection: &Connection) -> AdminApiClient {
    let mut client = AdminApiClient::new(&connection.addr).hosted(connection.hosted);
    if let Some(header) = &connection.auth_header {
        if let Some((name, value)) = header.split_once('=') {
            client = client.with_auth_header(name, value);
        } else {
            eprintln!("ignoring malformed --auth-header (expected NAME=VALUE)");
        }
    }
    client
}

fn read_state(path: &str) -> Result<serde_json::Value, i32> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        eprintln!("cannot read state file {path}: {e}");
        EXIT_VALIDATION
    })?;
    serde_json::from_str(&text).map_err(|e| {
        eprintln!("state file {path} is not valid JSON: {e}");
        EXIT_VALIDATION
    })
}

fn parse_mode(output: &str) -> Result<RenderMode, i32> {
    output.parse::<RenderMode>().map_err(|e| {
        eprintln!("{e}");
        EXIT_VALIDATION
    })
}

/// `gwr diff`: plan against the live state, print, change nothing.
pub async fn diff(connection: &Connection, state: &str, output: &str, flags: RunFlags) -> i32 {
    let document = match read_state(state) {
        Ok(doc) => doc,
        Err(code) => return code,
    };
    let mode = match parse_mode(output) {
        Ok(mode) => mode,
        Err(code) => return code,
    };

    let client = client_for(connection);
    let reconciler = Reconciler::new(flags.into_options(true));
    let version = match client.version().await {
        Ok(version) => version,
        Err(e) => {
            eprintln!("cannot reach control plane: {e}");
            return EXIT_EXECUTION;
        }
    };

    let target = match reconciler.load_target(&document, version) {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                eprintln!("warning: {warning}");
            }
            outcome.snapshot
        }
        Err(e) => {
            eprintln!("{e}");
            return EXIT_VALIDATION;
        }
    };
    let current = match reconciler.dump_current(&client, &version).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_EXECUTION;
        }
    };

    let plan = reconciler.diff(&current, &target);
    print!("{}", reconciler.render(&plan, None, mode));
    EXIT_OK
}

/// `gwr sync`: plan, then drive the control plane to the desired state.
pub async fn sync(
    connection: &Connection,
    state: &str,
    output: &str,
    dry_run: bool,
    flags: RunFlags,
) -> i32 {
    let document = match read_state(state) {
        Ok(doc) => doc,
        Err(code) => return code,
    };
    let mode = match parse_mode(output) {
        Ok(mode) => mode,
        Err(code) => return code,
    };

    let client = Arc::new(client_for(connection));
    let reconciler = Reconciler::new(flags.into_options(dry_run));
    let version = match client.version().await {
        Ok(version) => version,
        Err(e) => {
            eprintln!("cannot reach control plane: {e}");
            return EXIT_EXECUTION;
        }
    };

    let target = match reconciler.load_target(&document, version) {
        Ok(outcome) => {
            for warning in &outcome.warnings {
                eprintln!("warning: {warning}");
            }
            outcome.snapshot
        }
        Err(e) => {
            eprintln!("{e}");
            return EXIT_VALIDATION;
        }
    };
    let current = match reconciler.dump_current(client.as_ref(), &version).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_EXECUTION;
        }
    };

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupt received; finishing in-flight operations");
            signal_token.cancel_with(CancelReason::Interrupt);
        }
    });

    let (plan, report) = match reconciler
        .sync(
            &current,
            &target,
            client as Arc<dyn ConfigurationClient>,
            token,
        )
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_VALIDATION;
        }
    };

    print!("{}", reconciler.render(&plan, Some(&report), mode));
    report_outcome(&report)
}

fn report_outcome(report: &SyncReport) -> i32 {
    for error in &report.errors {
        eprintln!("error: {error}");
    }
    debug!(
        target: "gwr.cli",
        created = report.stats.create_ops,
        updated = report.stats.update_ops,
        deleted = report.stats.delete_ops,
        failed = report.stats.failed_ops,
        skipped = report.stats.skipped_ops,
        elapsed_ms = report.stats.elapsed_ms,
        "run finished"
    );
    if report.cancelled {
        EXIT_CANCELLED
    } else if report.stats.failed_ops > 0 {
        EXIT_EXECUTION
    } else {
        EXIT_OK
    }
}

/// `gwr dump`: print the live configuration as a loadable document.
pub async fn dump(connection: &Connection, flags: RunFlags) -> i32 {
    let client = client_for(connection);
    let reconciler = Reconciler::new(flags.into_options(true));
    let version = match client.version().await {
        Ok(version) => version,
        Err(e) => {
            eprintln!("cannot reach control plane: {e}");
            return EXIT_EXECUTION;
        }
    };
    match reconciler.dump_current(&client, &version).await {
        Ok(snapshot) => {
            let document = render_document(&snapshot);
            match serde_json::to_string_pretty(&document) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("cannot render dump: {e}");
                    return EXIT_EXECUTION;
                }
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("{e}");
            EXIT_EXECUTION
        }
    }
}

/// `gwr ping`: connectivity and version check.
pub async fn ping(connection: &Connection) -> i32 {
    let client = client_for(connection);
    match client.version().await {
        Ok(version) => {
            println!(
                "control plane {version} (enterprise: {}, hosted: {})",
                version.enterprise, version.hosted
            );
            EXIT_OK
        }
        Err(e) => {
            eprintln!("cannot reach control plane: {e}");
            EXIT_EXECUTION
        }
    }
}
