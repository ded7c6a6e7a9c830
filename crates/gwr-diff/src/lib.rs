// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-diff
//!
//! Joins the current and target snapshots kind by kind, classifies every
//! instance into create/update/delete/no-op, and produces typed change
//! records with rendered diff blobs.
//!
//! Join order: primary ID when present on both sides, otherwise the natural
//! key (which embeds referent names, so a target entity carrying a synthetic
//! ID still pairs with its live counterpart). After a natural-key join the
//! target entity's ID, and every foreign key that pointed at it, is
//! rewritten to the live ID so executor payloads carry real IDs.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Line-oriented JSON-patch rendering.
pub mod blob;

use gwr_mask::MaskSet;
use gwr_model::{ConfigValue, Entity, EntityKind};
use gwr_registry::{KindDescriptor, Registry};
use gwr_state::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// The operation class of a change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    /// Entity exists only in the target.
    Create,
    /// Entity exists on both sides with differing comparable fields.
    Update,
    /// Entity exists only in the current state.
    Delete,
}

impl ChangeOp {
    /// The present-participle verb used in reports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "creating",
            Self::Update => "updating",
            Self::Delete => "deleting",
        }
    }

    /// Sort weight: creates before updates before deletes.
    #[must_use]
    pub fn order(&self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Delete => 2,
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned operation on one entity.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    /// Operation class.
    pub op: ChangeOp,
    /// Entity kind.
    pub kind: EntityKind,
    /// Human-facing entity name (scoped kinds are decorated with referents).
    pub name: String,
    /// The entity the executor acts on: the translated target entity for
    /// creates and updates, the live entity for deletes.
    pub entity: Entity,
    /// Comparable projection of the live payload (absent for creates).
    pub old: Option<ConfigValue>,
    /// Comparable projection of the target payload (absent for deletes).
    pub new: Option<ConfigValue>,
    /// Rendered line-oriented diff blob (masked when masking is enabled).
    pub diff: String,
}

/// Counters over a change set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Number of planned creates.
    pub creating: u64,
    /// Number of planned updates.
    pub updating: u64,
    /// Number of planned deletes.
    pub deleting: u64,
}

impl DiffSummary {
    /// Total planned operations.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.creating + self.updating + self.deleting
    }

    /// Count one change.
    pub fn record(&mut self, op: ChangeOp) {
        match op {
            ChangeOp::Create => self.creating += 1,
            ChangeOp::Update => self.updating += 1,
            ChangeOp::Delete => self.deleting += 1,
        }
    }
}

/// Differ behavior switches (a subset of the caller-facing option set).
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Suppress delete operations entirely.
    pub no_deletes: bool,
    /// Exclude consumers, credentials, and memberships from both sides.
    pub skip_consumers: bool,
    /// Include license entities.
    pub include_licenses: bool,
}

/// The outcome of a diff: ordered change records plus bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    /// Change records in deterministic order (kind, op class, name).
    pub changes: Vec<ChangeRecord>,
    /// Aggregate counters.
    pub summary: DiffSummary,
    /// Non-fatal findings (e.g. deletes suppressed by `no_deletes`).
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Differ
// ---------------------------------------------------------------------------

/// Diff `current` against `target`, producing the minimal change set.
///
/// Both snapshots must have been built against the same `registry`.
/// Masking applies to rendered blobs only; `old`/`new` payloads and the
/// carried entities always hold real values.
#[must_use]
pub fn diff(
    current: &Snapshot,
    target: &Snapshot,
    registry: &Registry,
    options: &DiffOptions,
    mask: &MaskSet,
) -> DiffResult {
    let kinds: Vec<EntityKind> = registry
        .kinds()
        .filter(|kind| kind_included(kind, options))
        .cloned()
        .collect();

    // Pass 1: join target entities to live entities, collecting the
    // synthetic-ID → live-ID translation map across all kinds first so
    // foreign keys can be rewritten consistently in pass 2.
    let mut matches: HashMap<(EntityKind, String), String> = HashMap::new();
    let mut matched_current: HashMap<EntityKind, HashSet<String>> = HashMap::new();
    let mut translation: HashMap<(EntityKind, String), String> = HashMap::new();

    for kind in &kinds {
        for t in target.all(kind) {
            let Some(tid) = t.id().map(ToString::to_string) else {
                continue;
            };
            let live_id = if current.get_by_id(kind, &tid).is_some() {
                Some(tid.clone())
            } else {
                target
                    .natural_key(registry, t)
                    .and_then(|key| current.get_by_natural_key(kind, &key))
                    .and_then(|live| live.id().map(ToString::to_string))
            };
            if let Some(live_id) = live_id {
                matched_current
                    .entry(kind.clone())
                    .or_default()
                    .insert(live_id.clone());
                if live_id != tid {
                    translation.insert((kind.clone(), tid.clone()), live_id.clone());
                }
                matches.insert((kind.clone(), tid), live_id);
            }
        }
    }

    // Pass 2: classify.
    let mut result = DiffResult::default();
    for kind in &kinds {
        let Some(descriptor) = registry.get(kind) else {
            continue;
        };
        let mut kind_changes: Vec<ChangeRecord> = Vec::new();

        for t in target.all(kind) {
            let Some(tid) = t.id().map(ToString::to_string) else {
                continue;
            };
            let mut entity = t.clone();
            apply_translation(&mut entity, descriptor, &translation);
            let new_proj = comparable_projection(&entity, descriptor);

            match matches.get(&(kind.clone(), tid)) {
                Some(live_id) => {
                    let Some(live) = current.get_by_id(kind, live_id) else {
                        continue;
                    };
                    let old_proj = comparable_projection(live, descriptor);
                    if old_proj == new_proj {
                        continue;
                    }
                    let rendered = blob::render_patch(
                        &mask.mask_value(&old_proj),
                        &mask.mask_value(&new_proj),
                    );
                    kind_changes.push(ChangeRecord {
                        op: ChangeOp::Update,
                        kind: kind.clone(),
                        name: target.display_name(t),
                        entity,
                        old: Some(old_proj),
                        new: Some(new_proj),
                        diff: rendered,
                    });
                }
                None => {
                    let rendered = blob::render_added(&mask.mask_value(&new_proj));
                    kind_changes.push(ChangeRecord {
                        op: ChangeOp::Create,
                        kind: kind.clone(),
                        name: target.display_name(t),
                        entity,
                        old: None,
                        new: Some(new_proj),
                        diff: rendered,
                    });
                }
            }
        }

        for live in current.all(kind) {
            let Some(live_id) = live.id() else {
                continue;
            };
            let is_matched = matched_current
                .get(kind)
                .is_some_and(|ids| ids.contains(live_id));
            if is_matched {
                continue;
            }
            let name = current.display_name(live);
            if options.no_deletes {
                result
                    .warnings
                    .push(format!("delete of {kind} {name} suppressed (no-deletes mode)"));
                continue;
            }
            let old_proj = comparable_projection(live, descriptor);
            let rendered = blob::render_removed(&mask.mask_value(&old_proj));
            kind_changes.push(ChangeRecord {
                op: ChangeOp::Delete,
                kind: kind.clone(),
                name,
                entity: live.clone(),
                old: Some(old_proj),
                new: None,
                diff: rendered,
            });
        }

        // Deterministic order: op class, then rendered name.
        kind_changes.sort_by(|a, b| {
            a.op.order()
                .cmp(&b.op.order())
                .then_with(|| a.name.cmp(&b.name))
        });
        debug!(
            target: "gwr.diff",
            kind = %kind,
            changes = kind_changes.len(),
            "classified kind"
        );
        for change in &kind_changes {
            result.summary.record(change.op);
        }
        result.changes.extend(kind_changes);
    }

    result
}

fn kind_included(kind: &EntityKind, options: &DiffOptions) -> bool {
    if options.skip_consumers && kind.is_consumer_scoped() {
        return false;
    }
    if *kind == EntityKind::License {
        return options.include_licenses;
    }
    true
}

/// Rewrite the entity's own ID and its foreign keys through the
/// synthetic-ID → live-ID translation map.
fn apply_translation(
    entity: &mut Entity,
    descriptor: &KindDescriptor,
    translation: &HashMap<(EntityKind, String), String>,
) {
    if let Some(id) = entity.id() {
        if let Some(live) = translation.get(&(entity.kind(), id.to_string())) {
            let live = live.clone();
            entity.set_id(live);
        }
    }
    for fk in &descriptor.foreign_keys {
        let Some(reference) = entity.fk(fk.field).map(ToString::to_string) else {
            continue;
        };
        if let Some(live) = translation.get(&(fk.kind.clone(), reference)) {
            let live = live.clone();
            entity.set_fk(fk.field, live);
        }
    }
}

/// Project an entity onto its comparable fields in canonical form:
/// `null` stripped, excluded fields removed, set-like lists sorted.
fn comparable_projection(entity: &Entity, descriptor: &KindDescriptor) -> ConfigValue {
    let mut value = entity.to_value().without_nulls();
    if let Some(map) = value.as_object_mut() {
        map.retain(|field, _| descriptor.is_comparable(field));
        for field in descriptor.set_like_fields {
            if let Some(ConfigValue::Array(items)) = map.get_mut(*field) {
                items.sort_by_key(|item| item.to_json().to_string());
            }
        }
    }
    value
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
