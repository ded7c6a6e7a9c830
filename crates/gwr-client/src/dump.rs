// SPDX-License-Identifier: MIT OR Apache-2.0
//! Current-state snapshot assembly.
//!
//! Lists every managed kind through the client and freezes the result into
//! an indexed [`Snapshot`]. Fetched entities pass through the same
//! normalization as loaded targets so both sides of a diff speak the
//! canonical form.

use crate::ConfigurationClient;
use gwr_error::ReconcileError;
use gwr_model::{Entity, EntityKind, GatewayVersion};
use gwr_registry::Registry;
use gwr_state::Snapshot;
use tracing::debug;

/// Filters applied while dumping.
#[derive(Debug, Clone, Default)]
pub struct DumpOptions {
    /// Server-side tag filter (AND semantics) for taggable kinds.
    pub select_tags: Vec<String>,
    /// Skip consumers, credentials, and memberships.
    pub skip_consumers: bool,
    /// Include license entities.
    pub include_licenses: bool,
}

/// Fetch the control plane's current configuration as a snapshot.
///
/// # Errors
///
/// Client failures map onto the transport/server taxonomy codes; an
/// inconsistent dump (dangling references, duplicate keys) surfaces as the
/// corresponding validation error.
pub async fn dump(
    client: &dyn ConfigurationClient,
    registry: &Registry,
    version: &GatewayVersion,
    options: &DumpOptions,
) -> Result<Snapshot, ReconcileError> {
    let mut builder = Snapshot::builder();
    for kind in registry.kinds() {
        if options.skip_consumers && kind.is_consumer_scoped() {
            continue;
        }
        if *kind == EntityKind::License && !options.include_licenses {
            continue;
        }
        // RBAC collections only exist on enterprise planes.
        let rbac = matches!(
            kind,
            EntityKind::RbacRole | EntityKind::RbacEndpointPermission
        );
        if rbac && !version.enterprise {
            continue;
        }

        let entities = client
            .list(kind, &options.select_tags)
            .await
            .map_err(|e| e.to_reconcile_error().with_context("kind", kind.as_str()))?;
        debug!(target: "gwr.client", kind = %kind, count = entities.len(), "dumped kind");
        for mut entity in entities {
            // A consumer-scoped plugin would dangle once consumers are
            // filtered out; drop it with them.
            if options.skip_consumers {
                if let Entity::Plugin(plugin) = &entity {
                    if plugin.consumer.is_some() {
                        continue;
                    }
                }
            }
            gwr_registry::normalize(&mut entity, version);
            builder.add(entity).map_err(|e| e.to_reconcile_error())?;
        }
    }
    builder.build(registry).map_err(|e| e.to_reconcile_error())
}
