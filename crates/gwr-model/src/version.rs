// SPDX-License-Identifier: MIT OR Apache-2.0
//! Control-plane version descriptor.
//!
//! Defaulting and validation tables are version-dispatched: the loader and
//! registry consult a [`GatewayVersion`] instead of spreading version checks
//! across components.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A control plane's semantic version plus capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GatewayVersion {
    /// Major version.
    pub major: u64,
    /// Minor version.
    pub minor: u64,
    /// Patch version.
    pub patch: u64,
    /// Enterprise edition (RBAC, vaults, licenses, consumer groups).
    pub enterprise: bool,
    /// Hosted (SaaS) control plane rather than self-managed.
    pub hosted: bool,
}

impl GatewayVersion {
    /// Construct a community self-managed version.
    #[must_use]
    pub fn community(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            enterprise: false,
            hosted: false,
        }
    }

    /// Construct an enterprise self-managed version.
    #[must_use]
    pub fn enterprise(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            enterprise: true,
            ..Self::community(major, minor, patch)
        }
    }

    /// Mark this version as a hosted control plane.
    #[must_use]
    pub fn hosted(mut self) -> Self {
        self.hosted = true;
        self
    }

    /// Returns `true` when this version is at least `major.minor`.
    #[must_use]
    pub fn at_least(&self, major: u64, minor: u64) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl Default for GatewayVersion {
    /// A recent community release; callers normally obtain the real version
    /// from the client's `version()`.
    fn default() -> Self {
        Self::community(3, 9, 0)
    }
}

impl fmt::Display for GatewayVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.enterprise {
            f.write_str("-enterprise-edition")?;
        }
        Ok(())
    }
}

/// Error parsing a version string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid gateway version {input:?}: {reason}")]
pub struct VersionParseError {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: String,
}

impl FromStr for GatewayVersion {
    type Err = VersionParseError;

    /// Parse strings like `3.4.1`, `3.4.0.2-enterprise-edition`, or
    /// `2.8.4.9`. Extra numeric segments (enterprise builds add a fourth)
    /// are tolerated; an `enterprise` marker anywhere in the suffix sets
    /// the enterprise flag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let err = |reason: &str| VersionParseError {
            input: s.to_string(),
            reason: reason.to_string(),
        };
        if trimmed.is_empty() {
            return Err(err("empty string"));
        }

        let (numeric, suffix) = match trimmed.find('-') {
            Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
            None => (trimmed, ""),
        };

        let mut parts = numeric.split('.');
        let mut next_num = |what: &str| -> Result<u64, VersionParseError> {
            parts
                .next()
                .ok_or_else(|| err(&format!("missing {what} segment")))?
                .parse::<u64>()
                .map_err(|_| err(&format!("non-numeric {what} segment")))
        };

        let major = next_num("major")?;
        let minor = next_num("minor")?;
        // Patch is optional ("3.4" is accepted); extra segments are ignored.
        let patch = parts
            .next()
            .map(|p| {
                p.parse::<u64>()
                    .map_err(|_| err("non-numeric patch segment"))
            })
            .transpose()?
            .unwrap_or(0);

        Ok(Self {
            major,
            minor,
            patch,
            enterprise: suffix.contains("enterprise"),
            hosted: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_semver() {
        let v: GatewayVersion = "3.4.1".parse().unwrap();
        assert_eq!(v, GatewayVersion::community(3, 4, 1));
    }

    #[test]
    fn parses_enterprise_suffix_and_fourth_segment() {
        let v: GatewayVersion = "3.4.0.2-enterprise-edition".parse().unwrap();
        assert_eq!(v.major, 3);
        assert_eq!(v.minor, 4);
        assert_eq!(v.patch, 0);
        assert!(v.enterprise);
    }

    #[test]
    fn parses_two_segment_version() {
        let v: GatewayVersion = "2.8".parse().unwrap();
        assert_eq!(v, GatewayVersion::community(2, 8, 0));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<GatewayVersion>().is_err());
        assert!("abc".parse::<GatewayVersion>().is_err());
        assert!("3.x.1".parse::<GatewayVersion>().is_err());
        assert!("3".parse::<GatewayVersion>().is_err());
    }

    #[test]
    fn at_least_compares_major_minor() {
        let v = GatewayVersion::community(3, 4, 1);
        assert!(v.at_least(3, 4));
        assert!(v.at_least(2, 9));
        assert!(v.at_least(3, 1));
        assert!(!v.at_least(3, 5));
        assert!(!v.at_least(4, 0));
    }

    #[test]
    fn display_roundtrips_enterprise_marker() {
        let v = GatewayVersion::enterprise(3, 6, 1);
        let shown = v.to_string();
        assert_eq!(shown, "3.6.1-enterprise-edition");
        let back: GatewayVersion = shown.parse().unwrap();
        assert!(back.enterprise);
    }

    #[test]
    fn hosted_flag_is_orthogonal_to_parsing() {
        let v = GatewayVersion::community(3, 8, 0).hosted();
        assert!(v.hosted);
        assert!(!v.enterprise);
    }
}
