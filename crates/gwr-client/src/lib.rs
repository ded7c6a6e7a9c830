// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-client
//!
//! The control-plane client seam. The core consumes the object-safe
//! [`ConfigurationClient`] trait; this crate also ships the two standard
//! implementations (the reqwest-backed [`AdminApiClient`] and the in-memory
//! [`InMemoryClient`] used by tests and dry-run tooling) plus
//! [`dump`](dump::dump), which assembles a current-state snapshot from list
//! calls.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Current-state snapshot assembly.
pub mod dump;
/// reqwest-backed Admin API client.
pub mod http;
/// In-memory client for tests and offline runs.
pub mod mock;

pub use http::AdminApiClient;
pub use mock::InMemoryClient;

use async_trait::async_trait;
use gwr_error::{ErrorCode, ReconcileError};
use gwr_model::{Entity, EntityKind, GatewayVersion};
use thiserror::Error;

/// Kind-agnostic client failure.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The entity does not exist on the control plane.
    #[error("not found")]
    NotFound,

    /// The control plane rejected the write as conflicting.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Authentication or authorization failure.
    #[error("unauthorized")]
    Unauthorized,

    /// The control plane rejected the request body (4xx).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// HTTP-level failure before any server verdict.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The control plane failed internally (5xx).
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        message: String,
    },
}

impl ClientError {
    /// Map onto the unified error taxonomy.
    #[must_use]
    pub fn to_reconcile_error(&self) -> ReconcileError {
        let code = match self {
            Self::NotFound | Self::Conflict(_) | Self::Unauthorized | Self::BadRequest(_) => {
                ErrorCode::ServerValidation
            }
            Self::Transport(_) => ErrorCode::Transport,
            Self::Server { .. } => ErrorCode::ServerInternal,
        };
        ReconcileError::new(code, self.to_string())
    }
}

/// Per-kind CRUD against a control plane.
///
/// Create, update, and delete take the full entity because several kinds
/// live under nested collections (targets under their upstream, credentials
/// under their consumer) and the path is derived from the entity's foreign
/// keys.
#[async_trait]
pub trait ConfigurationClient: Send + Sync {
    /// The control plane's version and capability flags.
    async fn version(&self) -> Result<GatewayVersion, ClientError>;

    /// List every entity of a kind, optionally filtered by tags
    /// (server-side, AND semantics). Kinds the control plane does not
    /// expose yield an empty list.
    async fn list(&self, kind: &EntityKind, tags: &[String]) -> Result<Vec<Entity>, ClientError>;

    /// Create an entity. The entity carries its ID; the server persists it.
    async fn create(&self, entity: &Entity) -> Result<Entity, ClientError>;

    /// Update an existing entity in place.
    async fn update(&self, entity: &Entity) -> Result<Entity, ClientError>;

    /// Delete an entity.
    async fn delete(&self, entity: &Entity) -> Result<(), ClientError>;

    /// Fetch the server's current copy of an entity.
    async fn get(&self, entity: &Entity) -> Result<Entity, ClientError>;
}
