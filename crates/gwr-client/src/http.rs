// SPDX-License-Identifier: MIT OR Apache-2.0
//! reqwest-backed Admin API client.
//!
//! Flat kinds live under top-level collections; targets, credentials,
//! memberships, and RBAC endpoint permissions live under their parent's
//! collection, so their paths are derived from the entity's foreign keys.
//! List calls follow the Admin API's `next` pagination cursor.

use crate::{ClientError, ConfigurationClient};
use async_trait::async_trait;
use gwr_model::{
    ConsumerGroupMembership, CredentialKind, Entity, EntityKind, GatewayVersion,
};
use tracing::debug;

/// Page size requested from list endpoints.
const PAGE_SIZE: usize = 1000;

/// Client for a control plane's Admin API.
#[derive(Debug, Clone)]
pub struct AdminApiClient {
    base: String,
    http: reqwest::Client,
    auth_header: Option<(String, String)>,
    hosted: bool,
}

impl AdminApiClient {
    /// Create a client for the Admin API at `base` (e.g.
    /// `http://localhost:8001`).
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            http: reqwest::Client::new(),
            auth_header: None,
            hosted: false,
        }
    }

    /// Send `name: value` with every request (admin tokens, PATs).
    #[must_use]
    pub fn with_auth_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header = Some((name.into(), value.into()));
        self
    }

    /// Mark the control plane as hosted (affects version capability flags).
    #[must_use]
    pub fn hosted(mut self, hosted: bool) -> Self {
        self.hosted = hosted;
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.url(path));
        if let Some((name, value)) = &self.auth_header {
            builder = builder.header(name, value);
        }
        builder
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            if status == reqwest::StatusCode::NO_CONTENT {
                return Ok(serde_json::Value::Null);
            }
            return response
                .json()
                .await
                .map_err(|e| ClientError::Transport(format!("decoding response: {e}")));
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => ClientError::Unauthorized,
            404 => ClientError::NotFound,
            409 => ClientError::Conflict(message),
            code if (400..500).contains(&code) => ClientError::BadRequest(message),
            code => ClientError::Server {
                status: code,
                message,
            },
        })
    }

    /// Fetch every page of a collection. A missing collection (older or
    /// community control planes) yields an empty list.
    async fn list_collection(
        &self,
        path: &str,
        tags: &[String],
    ) -> Result<Vec<serde_json::Value>, ClientError> {
        let mut query = format!("{path}?size={PAGE_SIZE}");
        if !tags.is_empty() {
            query.push_str(&format!("&tags={}", tags.join(",")));
        }

        let mut items = Vec::new();
        let mut next = Some(query);
        while let Some(page_path) = next {
            let body = match self.send(self.request(reqwest::Method::GET, &page_path)).await {
                Ok(body) => body,
                Err(ClientError::NotFound) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };
            if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
                items.extend(data.iter().cloned());
            }
            next = body
                .get("next")
                .and_then(|n| n.as_str())
                .map(ToString::to_string);
        }
        debug!(target: "gwr.client", path, count = items.len(), "listed collection");
        Ok(items)
    }

    fn parse_entity(
        kind: &EntityKind,
        value: serde_json::Value,
    ) -> Result<Entity, ClientError> {
        Entity::from_json(kind, value)
            .map_err(|e| ClientError::Transport(format!("unexpected {kind} shape: {e}")))
    }

    async fn list_targets(&self, tags: &[String]) -> Result<Vec<Entity>, ClientError> {
        let mut out = Vec::new();
        for upstream in self.list(&EntityKind::Upstream, &[]).await? {
            let Some(upstream_id) = upstream.id() else {
                continue;
            };
            let path = format!("upstreams/{upstream_id}/targets");
            for item in self.list_collection(&path, tags).await? {
                out.push(Self::parse_entity(&EntityKind::Target, item)?);
            }
        }
        Ok(out)
    }

    async fn list_credentials(&self, tags: &[String]) -> Result<Vec<Entity>, ClientError> {
        let mut out = Vec::new();
        for consumer in self.list(&EntityKind::Consumer, &[]).await? {
            let Some(consumer_id) = consumer.id() else {
                continue;
            };
            for family in CredentialKind::ALL {
                let path = format!("consumers/{consumer_id}/{}", family.collection());
                for item in self.list_collection(&path, tags).await? {
                    let mut entity = Self::parse_entity(&EntityKind::Credential, item)?;
                    if let Entity::Credential(cred) = &mut entity {
                        cred.kind = *family;
                    }
                    out.push(entity);
                }
            }
        }
        Ok(out)
    }

    async fn list_memberships(&self) -> Result<Vec<Entity>, ClientError> {
        let mut out = Vec::new();
        for group in self.list(&EntityKind::ConsumerGroup, &[]).await? {
            let Some(group_id) = group.id().map(ToString::to_string) else {
                continue;
            };
            let path = format!("consumer_groups/{group_id}/consumers");
            for item in self.list_collection(&path, &[]).await? {
                let Some(consumer_id) = item.get("id").and_then(|v| v.as_str()) else {
                    continue;
                };
                out.push(Entity::ConsumerGroupMembership(ConsumerGroupMembership {
                    id: Some(format!("{group_id}:{consumer_id}")),
                    consumer_group: Some(group_id.clone()),
                    consumer: Some(consumer_id.to_string()),
                    ..ConsumerGroupMembership::default()
                }));
            }
        }
        Ok(out)
    }

    async fn list_endpoint_permissions(&self) -> Result<Vec<Entity>, ClientError> {
        let mut out = Vec::new();
        for role in self.list(&EntityKind::RbacRole, &[]).await? {
            let Some(role_id) = role.id().map(ToString::to_string) else {
                continue;
            };
            let path = format!("rbac/roles/{role_id}/endpoints");
            for mut item in self.list_collection(&path, &[]).await? {
                if let Some(map) = item.as_object_mut() {
                    map.entry("role".to_string())
                        .or_insert(serde_json::Value::String(role_id.clone()));
                }
                let mut entity =
                    Self::parse_entity(&EntityKind::RbacEndpointPermission, item)?;
                if entity.id().is_none() {
                    if let Entity::RbacEndpointPermission(p) = &mut entity {
                        let workspace = p.workspace.clone().unwrap_or_else(|| "*".into());
                        let endpoint = p.endpoint.clone().unwrap_or_default();
                        p.id = Some(format!("{role_id}:{workspace}:{endpoint}"));
                    }
                }
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// The collection path for flat kinds; `None` for nested kinds.
    fn collection(kind: &EntityKind) -> Option<String> {
        let path = match kind {
            EntityKind::Service => "services",
            EntityKind::Route => "routes",
            EntityKind::Plugin => "plugins",
            EntityKind::Consumer => "consumers",
            EntityKind::ConsumerGroup => "consumer_groups",
            EntityKind::Upstream => "upstreams",
            EntityKind::Certificate => "certificates",
            EntityKind::Sni => "snis",
            EntityKind::CaCertificate => "ca_certificates",
            EntityKind::Vault => "vaults",
            EntityKind::RbacRole => "rbac/roles",
            EntityKind::License => "licenses",
            EntityKind::Partial => "partials",
            EntityKind::Custom(name) => return Some(name.clone()),
            EntityKind::Target
            | EntityKind::Credential
            | EntityKind::ConsumerGroupMembership
            | EntityKind::RbacEndpointPermission => return None,
        };
        Some(path.to_string())
    }

    /// The path addressing one concrete entity.
    fn entity_path(entity: &Entity) -> Result<String, ClientError> {
        let need = |field: &str, value: Option<&str>| {
            value.map(ToString::to_string).ok_or_else(|| {
                ClientError::BadRequest(format!("{} is missing {field}", entity.kind()))
            })
        };
        match entity {
            Entity::Target(t) => {
                let upstream = need("upstream", t.upstream.as_deref())?;
                let id = need("id", t.id.as_deref())?;
                Ok(format!("upstreams/{upstream}/targets/{id}"))
            }
            Entity::Credential(c) => {
                let consumer = need("consumer", c.consumer.as_deref())?;
                let id = need("id", c.id.as_deref())?;
                Ok(format!(
                    "consumers/{consumer}/{}/{id}",
                    c.kind.collection()
                ))
            }
            Entity::ConsumerGroupMembership(m) => {
                let group = need("consumer_group", m.consumer_group.as_deref())?;
                let consumer = need("consumer", m.consumer.as_deref())?;
                Ok(format!("consumer_groups/{group}/consumers/{consumer}"))
            }
            Entity::RbacEndpointPermission(p) => {
                let role = need("role", p.role.as_deref())?;
                let workspace = p.workspace.clone().unwrap_or_else(|| "*".into());
                let endpoint = need("endpoint", p.endpoint.as_deref())?;
                Ok(format!(
                    "rbac/roles/{role}/endpoints/{workspace}{endpoint}"
                ))
            }
            other => {
                let collection = Self::collection(&other.kind()).ok_or_else(|| {
                    ClientError::BadRequest(format!("{} has no collection", other.kind()))
                })?;
                let id = need("id", other.id())?;
                Ok(format!("{collection}/{id}"))
            }
        }
    }

    fn write_body(entity: &Entity) -> serde_json::Value {
        entity.to_value().to_json()
    }
}

#[async_trait]
impl ConfigurationClient for AdminApiClient {
    async fn version(&self) -> Result<GatewayVersion, ClientError> {
        let body = self.send(self.request(reqwest::Method::GET, "/")).await?;
        let raw = body
            .get("version")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::Transport("version missing from root".into()))?;
        let mut version: GatewayVersion = raw
            .parse()
            .map_err(|e| ClientError::Transport(format!("{e}")))?;
        version.hosted = self.hosted;
        Ok(version)
    }

    async fn list(&self, kind: &EntityKind, tags: &[String]) -> Result<Vec<Entity>, ClientError> {
        match kind {
            EntityKind::Target => self.list_targets(tags).await,
            EntityKind::Credential => self.list_credentials(tags).await,
            EntityKind::ConsumerGroupMembership => self.list_memberships().await,
            EntityKind::RbacEndpointPermission => self.list_endpoint_permissions().await,
            flat => {
                let Some(collection) = Self::collection(flat) else {
                    return Ok(Vec::new());
                };
                let mut out = Vec::new();
                for item in self.list_collection(&collection, tags).await? {
                    out.push(Self::parse_entity(flat, item)?);
                }
                Ok(out)
            }
        }
    }

    async fn create(&self, entity: &Entity) -> Result<Entity, ClientError> {
        match entity {
            Entity::ConsumerGroupMembership(m) => {
                let group = m.consumer_group.as_deref().ok_or_else(|| {
                    ClientError::BadRequest("membership is missing consumer_group".into())
                })?;
                let consumer = m.consumer.as_deref().ok_or_else(|| {
                    ClientError::BadRequest("membership is missing consumer".into())
                })?;
                let path = format!("consumer_groups/{group}/consumers");
                self.send(
                    self.request(reqwest::Method::POST, &path)
                        .json(&serde_json::json!({ "consumer": consumer })),
                )
                .await?;
                Ok(entity.clone())
            }
            Entity::RbacEndpointPermission(p) => {
                let role = p
                    .role
                    .as_deref()
                    .ok_or_else(|| ClientError::BadRequest("permission is missing role".into()))?;
                let path = format!("rbac/roles/{role}/endpoints");
                self.send(
                    self.request(reqwest::Method::POST, &path)
                        .json(&Self::write_body(entity)),
                )
                .await?;
                Ok(entity.clone())
            }
            other => {
                let path = Self::entity_path(other)?;
                let body = self
                    .send(
                        self.request(reqwest::Method::PUT, &path)
                            .json(&Self::write_body(other)),
                    )
                    .await?;
                Self::parse_entity(&other.kind(), body)
            }
        }
    }

    async fn update(&self, entity: &Entity) -> Result<Entity, ClientError> {
        match entity {
            // Memberships have no mutable fields.
            Entity::ConsumerGroupMembership(_) => Ok(entity.clone()),
            Entity::RbacEndpointPermission(_) => {
                let path = Self::entity_path(entity)?;
                self.send(
                    self.request(reqwest::Method::PATCH, &path)
                        .json(&Self::write_body(entity)),
                )
                .await?;
                Ok(entity.clone())
            }
            other => {
                let path = Self::entity_path(other)?;
                let body = self
                    .send(
                        self.request(reqwest::Method::PUT, &path)
                            .json(&Self::write_body(other)),
                    )
                    .await?;
                Self::parse_entity(&other.kind(), body)
            }
        }
    }

    async fn delete(&self, entity: &Entity) -> Result<(), ClientError> {
        let path = Self::entity_path(entity)?;
        self.send(self.request(reqwest::Method::DELETE, &path))
            .await?;
        Ok(())
    }

    async fn get(&self, entity: &Entity) -> Result<Entity, ClientError> {
        let path = Self::entity_path(entity)?;
        let body = self.send(self.request(reqwest::Method::GET, &path)).await?;
        Self::parse_entity(&entity.kind(), body)
    }
}
