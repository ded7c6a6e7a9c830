// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-graph
//!
//! Turns a change set into a DAG of operation nodes and tracks their
//! lifecycle: `pending → ready → in-flight → done | failed | skipped`.
//!
//! Edge rules ("must complete before"):
//! - a create waits for creates/updates of every entity it references;
//! - an update waits for creates of newly introduced referents;
//! - a delete waits for deletes of every entity that references it
//!   (children go first, which is what orders SNI deletes before their
//!   certificate's).
//!
//! The graph is a plain synchronous state machine; the executor serializes
//! access behind its own lock.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gwr_diff::{ChangeOp, ChangeRecord};
use gwr_error::{ErrorCode, ReconcileError};
use gwr_model::EntityKind;
use gwr_registry::Registry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Index of a node within its graph.
pub type NodeId = usize;

/// Lifecycle state of an operation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Waiting on predecessors.
    Pending,
    /// All predecessors done; claimable by a worker.
    Ready,
    /// Claimed by a worker.
    InFlight,
    /// Completed successfully.
    Done,
    /// Completed with an error.
    Failed,
    /// Never issued because a predecessor failed or the run was cancelled.
    Skipped,
}

impl NodeState {
    /// Returns `true` for states no transition leaves.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Skipped)
    }
}

struct Node {
    change: ChangeRecord,
    state: NodeState,
    predecessors: Vec<NodeId>,
    successors: Vec<NodeId>,
    /// Predecessors not yet done.
    outstanding: usize,
}

/// Effects of completing one node: work that became claimable, and nodes
/// that will never run (paired with the failed predecessor that doomed them).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CompletionEffects {
    /// Nodes that transitioned to [`NodeState::Ready`].
    pub newly_ready: Vec<NodeId>,
    /// `(skipped, failed_predecessor)` pairs.
    pub newly_skipped: Vec<(NodeId, NodeId)>,
}

/// A DAG of operation nodes over a change set.
pub struct ChangeGraph {
    nodes: Vec<Node>,
}

impl ChangeGraph {
    /// Build the graph for a change set.
    ///
    /// # Errors
    ///
    /// Returns `cycle-detected` naming the participating entities when the
    /// dependency edges are cyclic.
    pub fn build(changes: Vec<ChangeRecord>, registry: &Registry) -> Result<Self, ReconcileError> {
        // Locate each change by (kind, entity id) per operation family.
        let mut upserts: HashMap<(EntityKind, String), NodeId> = HashMap::new();
        let mut deletes: HashMap<(EntityKind, String), NodeId> = HashMap::new();
        for (idx, change) in changes.iter().enumerate() {
            let Some(id) = change.entity.id().map(ToString::to_string) else {
                continue;
            };
            match change.op {
                ChangeOp::Create | ChangeOp::Update => {
                    upserts.insert((change.kind.clone(), id), idx);
                }
                ChangeOp::Delete => {
                    deletes.insert((change.kind.clone(), id), idx);
                }
            }
        }

        let mut predecessors: Vec<Vec<NodeId>> = vec![Vec::new(); changes.len()];
        for (idx, change) in changes.iter().enumerate() {
            let Some(descriptor) = registry.get(&change.kind) else {
                continue;
            };
            for fk in &descriptor.foreign_keys {
                let Some(reference) = change.entity.fk(fk.field) else {
                    continue;
                };
                let key = (fk.kind.clone(), reference.to_string());
                match change.op {
                    // Creates wait for the referent's create/update; updates
                    // only for newly introduced referents.
                    ChangeOp::Create => {
                        if let Some(&dep) = upserts.get(&key) {
                            predecessors[idx].push(dep);
                        }
                    }
                    ChangeOp::Update => {
                        if let Some(&dep) = upserts.get(&key) {
                            if changes[dep].op == ChangeOp::Create {
                                predecessors[idx].push(dep);
                            }
                        }
                    }
                    // The referent's delete waits for this delete.
                    ChangeOp::Delete => {
                        if let Some(&parent) = deletes.get(&key) {
                            predecessors[parent].push(idx);
                        }
                    }
                }
            }
        }
        for preds in &mut predecessors {
            preds.sort_unstable();
            preds.dedup();
        }

        if let Some(cycle) = find_cycle(&predecessors) {
            let names: Vec<String> = cycle
                .iter()
                .map(|&idx| format!("{} {}", changes[idx].kind, changes[idx].name))
                .collect();
            return Err(ReconcileError::new(
                ErrorCode::CycleDetected,
                format!("operation dependencies form a cycle: {}", names.join(" -> ")),
            ));
        }

        let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); changes.len()];
        for (idx, preds) in predecessors.iter().enumerate() {
            for &pred in preds {
                successors[pred].push(idx);
            }
        }

        let nodes: Vec<Node> = changes
            .into_iter()
            .zip(predecessors.into_iter().zip(successors))
            .map(|(change, (preds, succs))| {
                let outstanding = preds.len();
                Node {
                    change,
                    state: if outstanding == 0 {
                        NodeState::Ready
                    } else {
                        NodeState::Pending
                    },
                    predecessors: preds,
                    successors: succs,
                    outstanding,
                }
            })
            .collect();

        debug!(target: "gwr.graph", nodes = nodes.len(), "built change graph");
        Ok(Self { nodes })
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` when the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The change record behind a node.
    #[must_use]
    pub fn change(&self, id: NodeId) -> &ChangeRecord {
        &self.nodes[id].change
    }

    /// A node's current state.
    #[must_use]
    pub fn state(&self, id: NodeId) -> NodeState {
        self.nodes[id].state
    }

    /// Claim the lowest-indexed ready node, transitioning it to in-flight.
    pub fn take_ready(&mut self) -> Option<NodeId> {
        let id = self
            .nodes
            .iter()
            .position(|n| n.state == NodeState::Ready)?;
        self.nodes[id].state = NodeState::InFlight;
        Some(id)
    }

    /// Record a node outcome and propagate readiness / skips.
    ///
    /// On success, successors with no other outstanding predecessors become
    /// ready. On failure, every transitive dependent is skipped.
    pub fn complete(&mut self, id: NodeId, success: bool) -> CompletionEffects {
        let mut effects = CompletionEffects::default();
        if self.nodes[id].state.is_terminal() {
            return effects;
        }
        if success {
            self.nodes[id].state = NodeState::Done;
            let successors = self.nodes[id].successors.clone();
            for succ in successors {
                let node = &mut self.nodes[succ];
                if node.state != NodeState::Pending {
                    continue;
                }
                node.outstanding = node.outstanding.saturating_sub(1);
                if node.outstanding == 0 {
                    node.state = NodeState::Ready;
                    effects.newly_ready.push(succ);
                }
            }
        } else {
            self.nodes[id].state = NodeState::Failed;
            // Skip every transitive dependent that has not already started.
            let mut stack = self.nodes[id].successors.clone();
            while let Some(succ) = stack.pop() {
                let node = &mut self.nodes[succ];
                if node.state != NodeState::Pending && node.state != NodeState::Ready {
                    continue;
                }
                node.state = NodeState::Skipped;
                effects.newly_skipped.push((succ, id));
                stack.extend(self.nodes[succ].successors.iter().copied());
            }
        }
        effects
    }

    /// Skip every node that has not started, recording the given state.
    ///
    /// Used on cancellation: in-flight nodes are left to finish, nothing
    /// new is issued.
    pub fn skip_unstarted(&mut self) -> Vec<NodeId> {
        let mut skipped = Vec::new();
        for (id, node) in self.nodes.iter_mut().enumerate() {
            if node.state == NodeState::Pending || node.state == NodeState::Ready {
                node.state = NodeState::Skipped;
                skipped.push(id);
            }
        }
        skipped
    }

    /// Returns `true` once every node is in a terminal state.
    #[must_use]
    pub fn all_terminal(&self) -> bool {
        self.nodes.iter().all(|n| n.state.is_terminal())
    }

    /// The direct predecessors of a node.
    #[must_use]
    pub fn predecessors(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].predecessors
    }

    /// Iterate (node id, state) pairs.
    pub fn states(&self) -> impl Iterator<Item = (NodeId, NodeState)> + '_ {
        self.nodes.iter().enumerate().map(|(id, n)| (id, n.state))
    }
}

/// Kahn's algorithm over predecessor lists; returns the node ids stuck on a
/// cycle (in index order) or `None` when the edges are acyclic.
fn find_cycle(predecessors: &[Vec<NodeId>]) -> Option<Vec<NodeId>> {
    let n = predecessors.len();
    let mut outstanding: Vec<usize> = predecessors.iter().map(Vec::len).collect();
    let mut successors: Vec<Vec<NodeId>> = vec![Vec::new(); n];
    for (idx, preds) in predecessors.iter().enumerate() {
        for &pred in preds {
            successors[pred].push(idx);
        }
    }

    let mut queue: Vec<NodeId> = (0..n).filter(|&i| outstanding[i] == 0).collect();
    let mut processed = 0;
    while let Some(id) = queue.pop() {
        processed += 1;
        for &succ in &successors[id] {
            outstanding[succ] -= 1;
            if outstanding[succ] == 0 {
                queue.push(succ);
            }
        }
    }

    if processed == n {
        None
    } else {
        Some((0..n).filter(|&i| outstanding[i] > 0).collect())
    }
}
