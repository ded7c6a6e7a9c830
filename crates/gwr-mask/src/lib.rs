// SPDX-License-Identifier: MIT OR Apache-2.0
//! gwr-mask
//!
//! Render-time masking. Values of configured environment variables are
//! replaced with the literal `[masked]` wherever they appear in rendered
//! output. Masking never participates in equality: the differ and executor
//! always see the real values.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use gwr_model::ConfigValue;

/// The literal substituted for masked values.
pub const MASK: &str = "[masked]";

/// Minimum masked-value length when none is configured. Values shorter than
/// this are too likely to collide with ordinary configuration text.
pub const DEFAULT_MIN_VALUE_LEN: usize = 4;

// ---------------------------------------------------------------------------
// Environment seam
// ---------------------------------------------------------------------------

/// Read-only view of environment variables.
///
/// The process environment is injected behind this trait so masking is
/// deterministic under test.
pub trait Environment {
    /// All (name, value) pairs this environment exposes.
    fn vars(&self) -> Vec<(String, String)>;
}

/// The real process environment, filtered to names with a given prefix.
#[derive(Debug, Clone)]
pub struct ProcessEnvironment {
    prefix: String,
}

impl ProcessEnvironment {
    /// Expose process variables whose names start with `prefix`.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Environment for ProcessEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        std::env::vars()
            .filter(|(name, _)| name.starts_with(&self.prefix))
            .collect()
    }
}

/// A fixed in-memory environment, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment {
    vars: Vec<(String, String)>,
}

impl StaticEnvironment {
    /// Build from (name, value) pairs.
    #[must_use]
    pub fn new(vars: Vec<(String, String)>) -> Self {
        Self { vars }
    }

    /// Add a variable (builder style).
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.push((name.into(), value.into()));
        self
    }
}

impl Environment for StaticEnvironment {
    fn vars(&self) -> Vec<(String, String)> {
        self.vars.clone()
    }
}

// ---------------------------------------------------------------------------
// MaskSet
// ---------------------------------------------------------------------------

/// The set of values to mask, gathered from an [`Environment`].
#[derive(Debug, Clone, Default)]
pub struct MaskSet {
    /// Values to replace, longest first so overlapping values mask fully.
    values: Vec<String>,
}

impl MaskSet {
    /// Gather maskable values: every environment value at least
    /// [`DEFAULT_MIN_VALUE_LEN`] characters long.
    #[must_use]
    pub fn from_environment(env: &dyn Environment) -> Self {
        Self::from_environment_with_min_len(env, DEFAULT_MIN_VALUE_LEN)
    }

    /// Gather maskable values with an explicit minimum length.
    #[must_use]
    pub fn from_environment_with_min_len(env: &dyn Environment, min_len: usize) -> Self {
        let mut values: Vec<String> = env
            .vars()
            .into_iter()
            .map(|(_, value)| value)
            .filter(|value| value.len() >= min_len.max(1))
            .collect();
        values.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        values.dedup();
        Self { values }
    }

    /// A mask set that masks nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns `true` when no values would be masked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Replace every occurrence of a masked value in `text` with `[masked]`.
    #[must_use]
    pub fn mask_str(&self, text: &str) -> String {
        let mut out = text.to_string();
        for value in &self.values {
            if out.contains(value.as_str()) {
                out = out.replace(value.as_str(), MASK);
            }
        }
        out
    }

    /// Mask every string leaf of a value tree. Keys are left untouched.
    #[must_use]
    pub fn mask_value(&self, value: &ConfigValue) -> ConfigValue {
        if self.is_empty() {
            return value.clone();
        }
        match value {
            ConfigValue::String(s) => ConfigValue::String(self.mask_str(s)),
            ConfigValue::Array(items) => {
                ConfigValue::Array(items.iter().map(|v| self.mask_value(v)).collect())
            }
            ConfigValue::Object(map) => ConfigValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.mask_value(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}
