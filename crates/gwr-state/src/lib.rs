// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-state
//!
//! In-memory indexed entity collections. A [`Snapshot`] is an immutable,
//! reference-closed view of one side of a reconciliation (current or
//! target); the [`mirror::LiveMirror`] is the executor-mutable shadow of
//! current state.
//!
//! Lookups return `Option` (not-found is a signal, not an error); inserting
//! a duplicate by any unique key fails with a conflict.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Executor-mutable shadow of the current snapshot.
pub mod mirror;

use gwr_error::{ErrorCode, ReconcileError};
use gwr_model::{Entity, EntityKind, EntityRef};
use gwr_registry::Registry;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Errors from snapshot construction and mutation.
#[derive(Debug, Error)]
pub enum StateError {
    /// An entity was inserted without an ID.
    #[error("{kind} entity has no id")]
    MissingId {
        /// Kind of the offending entity.
        kind: EntityKind,
    },

    /// Two entities of one kind share an ID.
    #[error("duplicate {kind} id {id:?}")]
    DuplicateId {
        /// Kind of the offending entities.
        kind: EntityKind,
        /// The shared ID.
        id: String,
    },

    /// Two entities of one kind share a unique natural key.
    #[error("duplicate {kind} key {key:?}")]
    DuplicateKey {
        /// Kind of the offending entities.
        kind: EntityKind,
        /// The shared natural key.
        key: String,
    },

    /// A foreign key does not resolve within the snapshot.
    #[error("{referrer_kind} {referrer} references unknown {target_kind} {reference:?}")]
    UnresolvedReference {
        /// Kind of the referring entity.
        referrer_kind: EntityKind,
        /// Display name of the referring entity.
        referrer: String,
        /// Kind the dangling reference points at.
        target_kind: EntityKind,
        /// The dangling ID.
        reference: String,
    },
}

impl StateError {
    /// Map onto the unified error taxonomy.
    #[must_use]
    pub fn to_reconcile_error(&self) -> ReconcileError {
        let code = match self {
            Self::MissingId { .. } | Self::DuplicateId { .. } | Self::DuplicateKey { .. } => {
                ErrorCode::DuplicateKey
            }
            Self::UnresolvedReference { .. } => ErrorCode::UnresolvedReference,
        };
        ReconcileError::new(code, self.to_string())
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// An immutable, reference-closed collection of entities of mixed kinds.
///
/// Indexes are built once at construction; the snapshot itself never
/// changes afterwards.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Entities per kind, keyed by ID (sorted for deterministic iteration).
    entities: BTreeMap<EntityKind, BTreeMap<String, Entity>>,
    /// (kind, local name) → ID. Consumers index both username and custom_id.
    by_name: HashMap<(EntityKind, String), String>,
    /// (kind, natural key) → ID.
    by_natural_key: HashMap<(EntityKind, String), String>,
    /// (parent kind, parent ID) → referring entities.
    children: HashMap<(EntityKind, String), Vec<EntityRef>>,
}

impl Snapshot {
    /// Start building a snapshot.
    #[must_use]
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    /// Look up an entity by kind and ID.
    #[must_use]
    pub fn get_by_id(&self, kind: &EntityKind, id: &str) -> Option<&Entity> {
        self.entities.get(kind)?.get(id)
    }

    /// Look up an entity by its kind-local name.
    ///
    /// For consumers both `username` and `custom_id` resolve.
    #[must_use]
    pub fn get_by_name(&self, kind: &EntityKind, name: &str) -> Option<&Entity> {
        let id = self.by_name.get(&(kind.clone(), name.to_string()))?;
        self.get_by_id(kind, id)
    }

    /// Look up an entity by its natural key (see [`Snapshot::natural_key`]).
    #[must_use]
    pub fn get_by_natural_key(&self, kind: &EntityKind, key: &str) -> Option<&Entity> {
        let id = self.by_natural_key.get(&(kind.clone(), key.to_string()))?;
        self.get_by_id(kind, id)
    }

    /// All entities of a kind, in ID order.
    pub fn all(&self, kind: &EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities.get(kind).into_iter().flat_map(|m| m.values())
    }

    /// Number of entities of a kind.
    #[must_use]
    pub fn count(&self, kind: &EntityKind) -> usize {
        self.entities.get(kind).map_or(0, BTreeMap::len)
    }

    /// Total number of entities across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` when the snapshot holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every kind present in the snapshot, in canonical order.
    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.entities.keys()
    }

    /// Entities referencing (kind, id) through any foreign key.
    #[must_use]
    pub fn children_of(&self, kind: &EntityKind, id: &str) -> &[EntityRef] {
        self.children
            .get(&(kind.clone(), id.to_string()))
            .map_or(&[], Vec::as_slice)
    }

    /// The natural name of (kind, id), falling back to the raw ID.
    ///
    /// Natural names are stable across snapshots (the server never renames
    /// on write), which is what makes cross-snapshot joins by natural key
    /// sound even though IDs differ.
    #[must_use]
    pub fn referent_name(&self, kind: &EntityKind, id: &str) -> String {
        self.get_by_id(kind, id)
            .and_then(|e| e.local_name().map(ToString::to_string))
            .unwrap_or_else(|| id.to_string())
    }

    /// The entity's natural key within this snapshot, if its kind has one.
    ///
    /// Derivation is owned by the registry descriptor; this snapshot only
    /// supplies the referent-name lookup, so keys embed names (never IDs)
    /// and the same logical entity produces the same key in both the
    /// current and the target snapshot.
    #[must_use]
    pub fn natural_key(&self, registry: &Registry, entity: &Entity) -> Option<String> {
        let descriptor = registry.get(&entity.kind())?;
        let lookup = |kind: &EntityKind, id: &str| {
            self.get_by_id(kind, id)
                .and_then(|e| e.local_name().map(ToString::to_string))
        };
        descriptor.natural_key_of(entity, &lookup)
    }

    /// Human-facing name for an entity, used in change records and reports.
    ///
    /// Scoped kinds are decorated with their referents' names; entities
    /// without any natural name fall back to their ID.
    #[must_use]
    pub fn display_name(&self, entity: &Entity) -> String {
        match entity {
            Entity::Plugin(p) => {
                let name = p.name.as_deref().unwrap_or("(unnamed)");
                if p.is_global() {
                    return format!("{name} (global)");
                }
                let scopes: Vec<String> = p
                    .scopes()
                    .iter()
                    .map(|(field, id)| {
                        let kind = scope_kind(field);
                        format!("{field} {}", self.referent_name(&kind, id))
                    })
                    .collect();
                format!("{name} for {}", scopes.join(" and "))
            }
            Entity::Target(t) => {
                let target = t.target.as_deref().unwrap_or("(unnamed)");
                match t.upstream.as_deref() {
                    Some(upstream_id) => {
                        let upstream = self.referent_name(&EntityKind::Upstream, upstream_id);
                        format!("{target} on {upstream}")
                    }
                    None => target.to_string(),
                }
            }
            Entity::ConsumerGroupMembership(m) => {
                let consumer = m
                    .consumer
                    .as_deref()
                    .map(|id| self.referent_name(&EntityKind::Consumer, id))
                    .unwrap_or_else(|| "(unknown)".into());
                let group = m
                    .consumer_group
                    .as_deref()
                    .map(|id| self.referent_name(&EntityKind::ConsumerGroup, id))
                    .unwrap_or_else(|| "(unknown)".into());
                format!("{consumer} in {group}")
            }
            other => other
                .local_name()
                .map(ToString::to_string)
                .or_else(|| other.id().map(ToString::to_string))
                .unwrap_or_else(|| "(unnamed)".into()),
        }
    }
}

fn scope_kind(field: &str) -> EntityKind {
    match field {
        "service" => EntityKind::Service,
        "route" => EntityKind::Route,
        "consumer" => EntityKind::Consumer,
        _ => EntityKind::ConsumerGroup,
    }
}

// ---------------------------------------------------------------------------
// SnapshotBuilder
// ---------------------------------------------------------------------------

/// Accumulates entities, then validates and indexes them into a [`Snapshot`].
///
/// ID uniqueness is enforced at [`add`](SnapshotBuilder::add) time; natural
/// key uniqueness and reference closure are checked at
/// [`build`](SnapshotBuilder::build) time, once every entity is present.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    entities: BTreeMap<EntityKind, BTreeMap<String, Entity>>,
}

impl SnapshotBuilder {
    /// Add an entity. The entity must already carry an ID.
    ///
    /// # Errors
    ///
    /// [`StateError::MissingId`] when the entity has no ID;
    /// [`StateError::DuplicateId`] when the (kind, ID) pair is taken.
    pub fn add(&mut self, entity: Entity) -> Result<(), StateError> {
        let kind = entity.kind();
        let id = entity
            .id()
            .ok_or_else(|| StateError::MissingId { kind: kind.clone() })?
            .to_string();
        let slot = self.entities.entry(kind.clone()).or_default();
        if slot.contains_key(&id) {
            return Err(StateError::DuplicateId { kind, id });
        }
        slot.insert(id, entity);
        Ok(())
    }

    /// Look up an already-added entity by kind and local name.
    ///
    /// The loader uses this to resolve references while the snapshot is
    /// still under construction.
    #[must_use]
    pub fn find_by_name(&self, kind: &EntityKind, name: &str) -> Option<&Entity> {
        self.entities
            .get(kind)?
            .values()
            .find(|e| match e {
                Entity::Consumer(c) => {
                    c.username.as_deref() == Some(name) || c.custom_id.as_deref() == Some(name)
                }
                other => other.local_name() == Some(name),
            })
    }

    /// Look up an already-added entity by kind and ID.
    #[must_use]
    pub fn find_by_id(&self, kind: &EntityKind, id: &str) -> Option<&Entity> {
        self.entities.get(kind)?.get(id)
    }

    /// Validate closure and uniqueness, build all indexes, and freeze.
    ///
    /// # Errors
    ///
    /// [`StateError::UnresolvedReference`] when a foreign key points
    /// outside the snapshot; [`StateError::DuplicateKey`] when a unique
    /// name or natural key occurs twice.
    pub fn build(self, registry: &Registry) -> Result<Snapshot, StateError> {
        let mut snapshot = Snapshot {
            entities: self.entities,
            ..Snapshot::default()
        };

        // Reference closure plus the reverse-FK (children) index.
        let mut children: HashMap<(EntityKind, String), Vec<EntityRef>> = HashMap::new();
        for (kind, entities) in &snapshot.entities {
            let Some(descriptor) = registry.get(kind) else {
                continue;
            };
            for entity in entities.values() {
                for fk in &descriptor.foreign_keys {
                    let Some(reference) = entity.fk(fk.field) else {
                        continue;
                    };
                    if snapshot.get_by_id(&fk.kind, reference).is_none() {
                        return Err(StateError::UnresolvedReference {
                            referrer_kind: kind.clone(),
                            referrer: snapshot.display_name(entity),
                            target_kind: fk.kind.clone(),
                            reference: reference.to_string(),
                        });
                    }
                    children
                        .entry((fk.kind.clone(), reference.to_string()))
                        .or_default()
                        .push(EntityRef::new(
                            kind.clone(),
                            entity.id().unwrap_or_default(),
                        ));
                }
            }
        }

        // Name and natural-key indexes, with uniqueness enforcement.
        let mut by_name = HashMap::new();
        let mut by_natural_key = HashMap::new();
        for (kind, entities) in &snapshot.entities {
            for (id, entity) in entities {
                for name in name_index_keys(entity) {
                    if by_name
                        .insert((kind.clone(), name.clone()), id.clone())
                        .is_some()
                    {
                        return Err(StateError::DuplicateKey {
                            kind: kind.clone(),
                            key: name,
                        });
                    }
                }
                if let Some(key) = snapshot.natural_key(registry, entity) {
                    if by_natural_key
                        .insert((kind.clone(), key.clone()), id.clone())
                        .is_some()
                    {
                        return Err(StateError::DuplicateKey {
                            kind: kind.clone(),
                            key,
                        });
                    }
                }
            }
        }

        snapshot.by_name = by_name;
        snapshot.by_natural_key = by_natural_key;
        snapshot.children = children;
        Ok(snapshot)
    }
}

/// The names an entity is findable under. Consumers are findable by both
/// username and custom_id, in one shared namespace.
fn name_index_keys(entity: &Entity) -> Vec<String> {
    match entity {
        Entity::Consumer(c) => {
            let mut keys = Vec::new();
            if let Some(u) = &c.username {
                keys.push(u.clone());
            }
            if let Some(cid) = &c.custom_id {
                keys.push(cid.clone());
            }
            keys
        }
        other => other
            .local_name()
            .map(|n| vec![n.to_string()])
            .unwrap_or_default(),
    }
}
