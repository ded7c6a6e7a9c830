// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory [`ConfigurationClient`] for tests and offline runs.
//!
//! Stores entities in a plain map, records every mutating call in order,
//! and supports targeted failure injection so executor error paths can be
//! exercised deterministically.

use crate::{ClientError, ConfigurationClient};
use async_trait::async_trait;
use gwr_model::{Entity, EntityKind, GatewayVersion};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

/// One recorded client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    /// `create`, `update`, or `delete`.
    pub op: &'static str,
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity ID.
    pub id: String,
}

/// In-memory control plane.
#[derive(Debug)]
pub struct InMemoryClient {
    version: GatewayVersion,
    state: Mutex<BTreeMap<(EntityKind, String), Entity>>,
    calls: Mutex<Vec<CallRecord>>,
    fail_on: Mutex<HashSet<(&'static str, String)>>,
}

impl InMemoryClient {
    /// An empty control plane at the given version.
    #[must_use]
    pub fn new(version: GatewayVersion) -> Self {
        Self {
            version,
            state: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            fail_on: Mutex::new(HashSet::new()),
        }
    }

    /// Seed an entity into the stored state without recording a call.
    pub fn seed(&self, entity: Entity) {
        let Some(id) = entity.id().map(ToString::to_string) else {
            return;
        };
        self.state
            .lock()
            .expect("state lock poisoned")
            .insert((entity.kind(), id), entity);
    }

    /// Make the next matching (op, entity id) call fail with a 500.
    pub fn fail_on(&self, op: &'static str, id: impl Into<String>) {
        self.fail_on
            .lock()
            .expect("fail_on lock poisoned")
            .insert((op, id.into()));
    }

    /// All mutating calls, in issue order.
    #[must_use]
    pub fn calls(&self) -> Vec<CallRecord> {
        self.calls.lock().expect("calls lock poisoned").clone()
    }

    /// Number of stored entities.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.state.lock().expect("state lock poisoned").len()
    }

    /// Fetch a stored entity by kind and ID.
    #[must_use]
    pub fn stored_entity(&self, kind: &EntityKind, id: &str) -> Option<Entity> {
        self.state
            .lock()
            .expect("state lock poisoned")
            .get(&(kind.clone(), id.to_string()))
            .cloned()
    }

    fn record(&self, op: &'static str, entity: &Entity) -> Result<String, ClientError> {
        let id = entity
            .id()
            .map(ToString::to_string)
            .ok_or_else(|| ClientError::BadRequest("entity has no id".into()))?;
        self.calls
            .lock()
            .expect("calls lock poisoned")
            .push(CallRecord {
                op,
                kind: entity.kind(),
                id: id.clone(),
            });
        let injected = self
            .fail_on
            .lock()
            .expect("fail_on lock poisoned")
            .remove(&(op, id.clone()));
        if injected {
            return Err(ClientError::Server {
                status: 500,
                message: format!("injected failure for {op} {id}"),
            });
        }
        Ok(id)
    }
}

#[async_trait]
impl ConfigurationClient for InMemoryClient {
    async fn version(&self) -> Result<GatewayVersion, ClientError> {
        Ok(self.version)
    }

    async fn list(&self, kind: &EntityKind, tags: &[String]) -> Result<Vec<Entity>, ClientError> {
        let state = self.state.lock().expect("state lock poisoned");
        Ok(state
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, entity)| entity.clone())
            .filter(|entity| tags.is_empty() || has_all_tags(entity, tags))
            .collect())
    }

    async fn create(&self, entity: &Entity) -> Result<Entity, ClientError> {
        let id = self.record("create", entity)?;
        let mut state = self.state.lock().expect("state lock poisoned");
        let key = (entity.kind(), id);
        if state.contains_key(&key) {
            return Err(ClientError::Conflict(format!(
                "{} {} already exists",
                key.0, key.1
            )));
        }
        state.insert(key, entity.clone());
        Ok(entity.clone())
    }

    async fn update(&self, entity: &Entity) -> Result<Entity, ClientError> {
        let id = self.record("update", entity)?;
        let mut state = self.state.lock().expect("state lock poisoned");
        let key = (entity.kind(), id);
        if !state.contains_key(&key) {
            return Err(ClientError::NotFound);
        }
        state.insert(key, entity.clone());
        Ok(entity.clone())
    }

    async fn delete(&self, entity: &Entity) -> Result<(), ClientError> {
        let id = self.record("delete", entity)?;
        let mut state = self.state.lock().expect("state lock poisoned");
        match state.remove(&(entity.kind(), id)) {
            Some(_) => Ok(()),
            None => Err(ClientError::NotFound),
        }
    }

    async fn get(&self, entity: &Entity) -> Result<Entity, ClientError> {
        let id = entity
            .id()
            .ok_or_else(|| ClientError::BadRequest("entity has no id".into()))?;
        self.stored_entity(&entity.kind(), id)
            .ok_or(ClientError::NotFound)
    }
}

fn has_all_tags(entity: &Entity, tags: &[String]) -> bool {
    let value = entity.to_value();
    let Some(entity_tags) = value.get("tags").and_then(|t| t.as_array()) else {
        return false;
    };
    tags.iter().all(|wanted| {
        entity_tags
            .iter()
            .any(|t| t.as_str() == Some(wanted.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwr_model::Service;

    fn service(id: &str, name: &str, tags: &[&str]) -> Entity {
        Entity::Service(Service {
            id: Some(id.into()),
            name: Some(name.into()),
            tags: if tags.is_empty() {
                None
            } else {
                Some(tags.iter().map(ToString::to_string).collect())
            },
            ..Service::default()
        })
    }

    #[tokio::test]
    async fn create_update_delete_roundtrip() {
        let client = InMemoryClient::new(GatewayVersion::default());
        let entity = service("s1", "svc1", &[]);
        client.create(&entity).await.unwrap();
        assert_eq!(client.stored(), 1);

        let updated = service("s1", "svc1-renamed", &[]);
        client.update(&updated).await.unwrap();
        assert_eq!(
            client
                .stored_entity(&EntityKind::Service, "s1")
                .unwrap()
                .local_name(),
            Some("svc1-renamed")
        );

        client.delete(&updated).await.unwrap();
        assert_eq!(client.stored(), 0);

        let ops: Vec<&str> = client.calls().iter().map(|c| c.op).collect();
        assert_eq!(ops, ["create", "update", "delete"]);
    }

    #[tokio::test]
    async fn create_conflicts_on_existing_id() {
        let client = InMemoryClient::new(GatewayVersion::default());
        client.seed(service("s1", "svc1", &[]));
        let err = client.create(&service("s1", "other", &[])).await.unwrap_err();
        assert!(matches!(err, ClientError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_and_delete_missing_are_not_found() {
        let client = InMemoryClient::new(GatewayVersion::default());
        let entity = service("absent", "x", &[]);
        assert!(matches!(
            client.update(&entity).await.unwrap_err(),
            ClientError::NotFound
        ));
        assert!(matches!(
            client.delete(&entity).await.unwrap_err(),
            ClientError::NotFound
        ));
    }

    #[tokio::test]
    async fn list_filters_by_tags() {
        let client = InMemoryClient::new(GatewayVersion::default());
        client.seed(service("s1", "a", &["prod", "team-a"]));
        client.seed(service("s2", "b", &["prod"]));
        client.seed(service("s3", "c", &[]));

        let all = client.list(&EntityKind::Service, &[]).await.unwrap();
        assert_eq!(all.len(), 3);

        let prod = client
            .list(&EntityKind::Service, &["prod".to_string()])
            .await
            .unwrap();
        assert_eq!(prod.len(), 2);

        let team = client
            .list(
                &EntityKind::Service,
                &["prod".to_string(), "team-a".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(team.len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let client = InMemoryClient::new(GatewayVersion::default());
        client.fail_on("create", "s1");
        let entity = service("s1", "svc1", &[]);
        assert!(matches!(
            client.create(&entity).await.unwrap_err(),
            ClientError::Server { status: 500, .. }
        ));
        // Second attempt succeeds; the injection is consumed.
        client.create(&entity).await.unwrap();
    }

    #[tokio::test]
    async fn version_reports_configured_value() {
        let client = InMemoryClient::new(GatewayVersion::enterprise(3, 5, 1));
        let version = client.version().await.unwrap();
        assert!(version.enterprise);
        assert_eq!((version.major, version.minor), (3, 5));
    }
}
