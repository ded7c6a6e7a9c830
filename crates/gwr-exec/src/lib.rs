// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-exec
//!
//! Executes a change graph against a control plane with a bounded pool of
//! workers. Workers claim ready nodes, perform the HTTP call outside any
//! lock, commit successful outcomes to the live mirror, and propagate
//! readiness through the graph. Failures never abort the run: dependents
//! are skipped and accounted, everything else proceeds.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Cancellation primitives.
pub mod cancel;

pub use cancel::{CancelReason, CancellationToken};

use chrono::{DateTime, Utc};
use gwr_client::ConfigurationClient;
use gwr_diff::{ChangeOp, ChangeRecord};
use gwr_error::{ErrorCode, ReconcileError, ReconcileErrorDto};
use gwr_graph::{ChangeGraph, NodeId, NodeState};
use gwr_model::{Entity, EntityKind};
use gwr_state::mirror::LiveMirror;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Clock seam
// ---------------------------------------------------------------------------

/// Injectable time source, used only for elapsed-time stats.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// Options, stats, report
// ---------------------------------------------------------------------------

/// Executor behavior switches.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Maximum concurrent operations.
    pub parallelism: usize,
    /// Plan only: no client calls, no mirror writes.
    pub dry_run: bool,
    /// Per-operation deadline. Reaching it fails the node (no retry).
    pub op_deadline: Option<Duration>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            parallelism: 10,
            dry_run: false,
            op_deadline: None,
        }
    }
}

/// Aggregated operation counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    /// Creates completed successfully.
    pub create_ops: u64,
    /// Updates completed successfully.
    pub update_ops: u64,
    /// Deletes completed successfully.
    pub delete_ops: u64,
    /// Operations never issued because a predecessor failed or the run was
    /// cancelled.
    pub skipped_ops: u64,
    /// Operations that failed.
    pub failed_ops: u64,
    /// Elapsed wall-clock milliseconds.
    pub elapsed_ms: u64,
}

impl SyncStats {
    /// Total successful operations.
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.create_ops + self.update_ops + self.delete_ops
    }
}

/// Outcome of one planned operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Operation class.
    pub op: ChangeOp,
    /// Entity kind.
    pub kind: EntityKind,
    /// Human-facing entity name.
    pub name: String,
    /// Terminal node state.
    pub state: NodeState,
    /// The error that failed or skipped this operation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReconcileErrorDto>,
}

/// The full outcome of a sync run.
#[derive(Debug)]
pub struct SyncReport {
    /// Aggregated counters.
    pub stats: SyncStats,
    /// Per-operation outcomes, in graph node order (deterministic).
    pub results: Vec<OperationResult>,
    /// Every error, in node order, plus one summary error on cancellation.
    pub errors: Vec<ReconcileError>,
    /// Whether the run was cancelled.
    pub cancelled: bool,
}

impl SyncReport {
    /// Returns `true` when every planned operation completed successfully.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Drains a [`ChangeGraph`] against a [`ConfigurationClient`].
pub struct Executor {
    client: Arc<dyn ConfigurationClient>,
    options: ExecOptions,
    clock: Arc<dyn Clock>,
}

struct Counters {
    creates: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

struct Shared {
    graph: Mutex<ChangeGraph>,
    notify: Notify,
    client: Arc<dyn ConfigurationClient>,
    mirror: Arc<LiveMirror>,
    options: ExecOptions,
    token: CancellationToken,
    errors: Mutex<HashMap<NodeId, ReconcileError>>,
    counters: Counters,
}

enum Claim {
    Run(NodeId, ChangeRecord),
    Finished,
    Wait,
}

impl Executor {
    /// Create an executor with default options and the system clock.
    #[must_use]
    pub fn new(client: Arc<dyn ConfigurationClient>) -> Self {
        Self {
            client,
            options: ExecOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the executor options.
    #[must_use]
    pub fn with_options(mut self, options: ExecOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the clock (tests inject a fixed one).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Drain the graph to completion (every node terminal).
    ///
    /// Returns aggregated stats, per-operation outcomes, and all errors.
    /// Execution errors do not abort the run; validation has already
    /// happened by the time a graph exists.
    pub async fn run(
        &self,
        graph: ChangeGraph,
        mirror: Arc<LiveMirror>,
        token: CancellationToken,
    ) -> SyncReport {
        let started = self.clock.now();
        let node_count = graph.len();
        let shared = Arc::new(Shared {
            graph: Mutex::new(graph),
            notify: Notify::new(),
            client: Arc::clone(&self.client),
            mirror,
            options: self.options.clone(),
            token,
            errors: Mutex::new(HashMap::new()),
            counters: Counters {
                creates: AtomicU64::new(0),
                updates: AtomicU64::new(0),
                deletes: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            },
        });

        let workers = self.options.parallelism.max(1).min(node_count.max(1));
        debug!(target: "gwr.exec", workers, nodes = node_count, dry_run = self.options.dry_run, "starting run");
        let handles: Vec<_> = (0..workers)
            .map(|_| tokio::spawn(worker(Arc::clone(&shared))))
            .collect();
        futures::future::join_all(handles).await;

        let finished = self.clock.now();
        let graph = shared.graph.lock().await;
        let mut error_map = shared.errors.lock().await;

        let mut results = Vec::with_capacity(graph.len());
        let mut errors = Vec::new();
        for (id, state) in graph.states() {
            let change = graph.change(id);
            let error = error_map.remove(&id);
            if let Some(err) = &error {
                errors.push(err.clone());
            }
            results.push(OperationResult {
                op: change.op,
                kind: change.kind.clone(),
                name: change.name.clone(),
                state,
                error: error.as_ref().map(ReconcileErrorDto::from),
            });
        }

        let cancelled = shared.token.is_cancelled();
        if let Some(error) = shared.token.to_error() {
            errors.push(error);
        }

        let elapsed = finished.signed_duration_since(started);
        let stats = SyncStats {
            create_ops: shared.counters.creates.load(Ordering::Relaxed),
            update_ops: shared.counters.updates.load(Ordering::Relaxed),
            delete_ops: shared.counters.deletes.load(Ordering::Relaxed),
            skipped_ops: shared.counters.skipped.load(Ordering::Relaxed),
            failed_ops: shared.counters.failed.load(Ordering::Relaxed),
            elapsed_ms: elapsed.num_milliseconds().max(0) as u64,
        };

        SyncReport {
            stats,
            results,
            errors,
            cancelled,
        }
    }
}

async fn worker(shared: Arc<Shared>) {
    loop {
        let notified = shared.notify.notified();

        let claim = {
            let mut graph = shared.graph.lock().await;
            if let Some(reason) = shared.token.reason() {
                let skipped = graph.skip_unstarted();
                if !skipped.is_empty() {
                    let mut errors = shared.errors.lock().await;
                    for id in skipped {
                        shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        let change = graph.change(id);
                        errors.insert(
                            id,
                            ReconcileError::new(
                                ErrorCode::Cancelled,
                                format!(
                                    "{} before {} {} was issued",
                                    reason.describe(),
                                    change.kind,
                                    change.name
                                ),
                            )
                            .with_context("reason", reason),
                        );
                    }
                }
            }
            if let Some(id) = graph.take_ready() {
                Claim::Run(id, graph.change(id).clone())
            } else if graph.all_terminal() {
                Claim::Finished
            } else {
                Claim::Wait
            }
        };

        match claim {
            Claim::Run(id, change) => {
                let outcome = if shared.options.dry_run {
                    Ok(None)
                } else {
                    perform(&shared, &change).await
                };
                settle(&shared, id, &change, outcome).await;
                shared.notify.notify_waiters();
            }
            Claim::Finished => {
                shared.notify.notify_waiters();
                return;
            }
            Claim::Wait => {
                tokio::select! {
                    () = notified => {}
                    () = shared.token.cancelled() => {}
                }
            }
        }
    }
}

/// Issue the client call for one change. HTTP happens here, outside every
/// lock. Returns the server's copy for creates/updates.
async fn perform(
    shared: &Shared,
    change: &ChangeRecord,
) -> Result<Option<Entity>, ReconcileError> {
    let call = async {
        match change.op {
            ChangeOp::Create => shared.client.create(&change.entity).await.map(Some),
            ChangeOp::Update => shared.client.update(&change.entity).await.map(Some),
            ChangeOp::Delete => shared.client.delete(&change.entity).await.map(|()| None),
        }
    };

    let outcome = match shared.options.op_deadline {
        Some(deadline) => match tokio::time::timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ReconcileError::new(
                    ErrorCode::Transport,
                    format!(
                        "operation deadline of {}ms exceeded",
                        deadline.as_millis()
                    ),
                )
                .with_entity(change.kind.as_str(), change.name.clone()));
            }
        },
        None => call.await,
    };

    outcome.map_err(|e| {
        e.to_reconcile_error()
            .with_entity(change.kind.as_str(), change.name.clone())
    })
}

/// Commit an outcome: mirror write on success, error bookkeeping and skip
/// cascade on failure.
async fn settle(
    shared: &Shared,
    id: NodeId,
    change: &ChangeRecord,
    outcome: Result<Option<Entity>, ReconcileError>,
) {
    match outcome {
        Ok(server_copy) => {
            if !shared.options.dry_run {
                match change.op {
                    ChangeOp::Create | ChangeOp::Update => {
                        let committed = server_copy.unwrap_or_else(|| change.entity.clone());
                        shared.mirror.upsert(committed).await;
                    }
                    ChangeOp::Delete => {
                        if let Some(entity_id) = change.entity.id() {
                            shared.mirror.remove(&change.kind, entity_id).await;
                        }
                    }
                }
            }
            let counter = match change.op {
                ChangeOp::Create => &shared.counters.creates,
                ChangeOp::Update => &shared.counters.updates,
                ChangeOp::Delete => &shared.counters.deletes,
            };
            counter.fetch_add(1, Ordering::Relaxed);
            let mut graph = shared.graph.lock().await;
            graph.complete(id, true);
        }
        Err(error) => {
            warn!(
                target: "gwr.exec",
                kind = %change.kind,
                name = %change.name,
                %error,
                "operation failed"
            );
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            let mut graph = shared.graph.lock().await;
            let effects = graph.complete(id, false);
            let mut errors = shared.errors.lock().await;
            errors.insert(id, error);
            for (skipped, failed_dep) in effects.newly_skipped {
                shared.counters.skipped.fetch_add(1, Ordering::Relaxed);
                let dep = graph.change(failed_dep);
                let blocked = graph.change(skipped);
                errors.insert(
                    skipped,
                    ReconcileError::new(
                        ErrorCode::SkippedDependency,
                        format!(
                            "{} {} skipped: depends on failed {} {}",
                            blocked.kind, blocked.name, dep.kind, dep.name
                        ),
                    ),
                );
            }
        }
    }
}
