// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-model
//!
//! The entity model for the gateway reconciler: typed records for every
//! entity kind, the recursive [`ConfigValue`] used for schema-free
//! configuration bags, and the [`GatewayVersion`] descriptor that drives
//! version-dispatched behavior elsewhere.
//!
//! If you only take one dependency, take this one.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Typed entity records and the [`Entity`] sum type.
pub mod entities;
/// Recursive tagged value with canonical equality.
pub mod value;
/// Control-plane version descriptor.
pub mod version;

pub use entities::{
    CaCertificate, Certificate, Consumer, ConsumerGroup, ConsumerGroupMembership, Credential,
    CredentialKind, CustomEntity, Entity, EntityKind, EntityRef, License, Partial, Plugin,
    RbacEndpointPermission, RbacRole, Route, Service, Sni, Target, Upstream, Vault,
};
pub use value::{ConfigValue, Number};
pub use version::{GatewayVersion, VersionParseError};
