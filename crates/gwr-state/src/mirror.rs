// SPDX-License-Identifier: MIT OR Apache-2.0
//! Executor-mutable shadow of the current snapshot.
//!
//! The reconciler's only shared mutable resource. Workers commit successful
//! operation outcomes here under a single writer lock; reads take the read
//! half. HTTP calls never happen while the lock is held.

use crate::Snapshot;
use gwr_model::{Entity, EntityKind};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// The live-state mirror: the current snapshot plus committed mutations.
#[derive(Debug)]
pub struct LiveMirror {
    inner: RwLock<BTreeMap<EntityKind, BTreeMap<String, Entity>>>,
}

impl LiveMirror {
    /// Seed the mirror from a current snapshot.
    #[must_use]
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut inner: BTreeMap<EntityKind, BTreeMap<String, Entity>> = BTreeMap::new();
        for kind in snapshot.kinds() {
            let slot = inner.entry(kind.clone()).or_default();
            for entity in snapshot.all(kind) {
                if let Some(id) = entity.id() {
                    slot.insert(id.to_string(), entity.clone());
                }
            }
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Insert or replace an entity after a successful create/update.
    pub async fn upsert(&self, entity: Entity) {
        let Some(id) = entity.id().map(ToString::to_string) else {
            return;
        };
        let mut guard = self.inner.write().await;
        guard.entry(entity.kind()).or_default().insert(id, entity);
    }

    /// Remove an entity after a successful delete.
    ///
    /// Returns the removed entity, if it was present.
    pub async fn remove(&self, kind: &EntityKind, id: &str) -> Option<Entity> {
        let mut guard = self.inner.write().await;
        guard.get_mut(kind)?.remove(id)
    }

    /// Read a committed entity.
    pub async fn get(&self, kind: &EntityKind, id: &str) -> Option<Entity> {
        let guard = self.inner.read().await;
        guard.get(kind)?.get(id).cloned()
    }

    /// Number of entities of a kind currently in the mirror.
    pub async fn count(&self, kind: &EntityKind) -> usize {
        let guard = self.inner.read().await;
        guard.get(kind).map_or(0, BTreeMap::len)
    }

    /// Total entities in the mirror.
    pub async fn len(&self) -> usize {
        let guard = self.inner.read().await;
        guard.values().map(BTreeMap::len).sum()
    }

    /// Returns `true` when the mirror holds no entities.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
