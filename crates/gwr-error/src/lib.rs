// SPDX-License-Identifier: MIT OR Apache-2.0
//! Unified error taxonomy with stable error codes for the gateway reconciler.
//!
//! Every reconciler error carries an [`ErrorCode`] (a machine-readable, stable
//! string tag), a human-readable message, an optional cause chain, and
//! arbitrary key-value context. Use the builder returned by
//! [`ReconcileError::new`] to construct errors fluently.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

/// Broad family that an [`ErrorCode`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Problems with the desired-state document or its internal consistency.
    /// These abort a run before any operation is issued.
    Validation,
    /// Dependency-graph construction errors.
    Graph,
    /// HTTP-level failures talking to the control plane.
    Transport,
    /// Errors the control plane itself reported.
    Server,
    /// Errors raised while executing planned operations.
    Execution,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Graph => "graph",
            Self::Transport => "transport",
            Self::Server => "server",
            Self::Execution => "execution",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable, stable error code.
///
/// Each variant serialises to a `SCREAMING_SNAKE_CASE` string that is
/// guaranteed not to change across patch releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // -- Validation --
    /// The input document is malformed (wrong shape, bad types).
    Parse,
    /// A named reference has no target entity in the snapshot.
    UnresolvedReference,
    /// A plugin's scope set violates the single-scope rule.
    InvalidScope,
    /// A unique key (ID, name, natural key) occurs more than once.
    DuplicateKey,

    // -- Graph --
    /// The operation dependency graph contains a cycle.
    CycleDetected,

    // -- Transport --
    /// HTTP-level failure (connect, TLS, timeout) from the client.
    Transport,

    // -- Server --
    /// The control plane rejected an operation (4xx with a structured body).
    ServerValidation,
    /// The control plane failed internally (5xx).
    ServerInternal,

    // -- Execution --
    /// A predecessor operation failed, so this one was never issued.
    SkippedDependency,
    /// The caller cancelled the run.
    Cancelled,
}

impl ErrorCode {
    /// Returns the broad [`ErrorCategory`] this code belongs to.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Parse | Self::UnresolvedReference | Self::InvalidScope | Self::DuplicateKey => {
                ErrorCategory::Validation
            }
            Self::CycleDetected => ErrorCategory::Graph,
            Self::Transport => ErrorCategory::Transport,
            Self::ServerValidation | Self::ServerInternal => ErrorCategory::Server,
            Self::SkippedDependency | Self::Cancelled => ErrorCategory::Execution,
        }
    }

    /// Stable `&'static str` representation of the code (e.g.
    /// `"UNRESOLVED_REFERENCE"`).
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parse => "PARSE",
            Self::UnresolvedReference => "UNRESOLVED_REFERENCE",
            Self::InvalidScope => "INVALID_SCOPE",
            Self::DuplicateKey => "DUPLICATE_KEY",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::Transport => "TRANSPORT",
            Self::ServerValidation => "SERVER_VALIDATION",
            Self::ServerInternal => "SERVER_INTERNAL",
            Self::SkippedDependency => "SKIPPED_DEPENDENCY",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ReconcileError
// ---------------------------------------------------------------------------

/// Unified reconciler error.
///
/// Carries a stable [`ErrorCode`], a human-readable message, an optional
/// source error for cause-chaining, and arbitrary structured context.
///
/// # Builder usage
///
/// ```
/// use gwr_error::{ErrorCode, ReconcileError};
///
/// let err = ReconcileError::new(ErrorCode::UnresolvedReference, "no such service")
///     .with_context("kind", "route")
///     .with_context("reference", "svc-missing");
/// ```
pub struct ReconcileError {
    /// Machine-readable error code.
    pub code: ErrorCode,
    /// Human-readable description.
    pub message: String,
    /// Optional underlying cause.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Arbitrary structured context for diagnostics.
    pub context: BTreeMap<String, serde_json::Value>,
}

impl ReconcileError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
            context: BTreeMap::new(),
        }
    }

    /// Attach a key-value pair to the diagnostic context.
    ///
    /// The value is converted via [`serde_json::to_value`]; if serialisation
    /// fails, the entry is silently skipped.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Attach the entity (kind + display name) the error refers to.
    #[must_use]
    pub fn with_entity(self, kind: impl Into<String>, name: impl Into<String>) -> Self {
        self.with_context("entity_kind", kind.into())
            .with_context("entity_name", name.into())
    }

    /// Attach an underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Shorthand for `self.code.category()`.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Returns `true` when this error aborts a run before any operation is
    /// issued (validation and graph errors).
    #[must_use]
    pub fn is_pre_execution(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Validation | ErrorCategory::Graph
        )
    }
}

impl fmt::Debug for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("ReconcileError");
        d.field("code", &self.code);
        d.field("message", &self.message);
        if let Some(ref src) = self.source {
            d.field("source", &src.to_string());
        }
        if !self.context.is_empty() {
            d.field("context", &self.context);
        }
        d.finish()
    }
}

impl fmt::Display for ReconcileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)?;
        if !self.context.is_empty() {
            // Deterministic output thanks to BTreeMap.
            if let Ok(ctx) = serde_json::to_string(&self.context) {
                write!(f, " {ctx}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl Clone for ReconcileError {
    fn clone(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            // The boxed source is opaque; keep its text in the clone.
            source: self.source.as_ref().map(|s| {
                Box::new(SourceMessage(s.to_string())) as Box<dyn std::error::Error + Send + Sync>
            }),
            context: self.context.clone(),
        }
    }
}

/// Opaque stand-in for a cloned source error.
#[derive(Debug)]
struct SourceMessage(String);

impl fmt::Display for SourceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SourceMessage {}

// ---------------------------------------------------------------------------
// Serialization support
// ---------------------------------------------------------------------------

/// Serialisable snapshot of a [`ReconcileError`] (without the opaque source).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconcileErrorDto {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Structured context.
    pub context: BTreeMap<String, serde_json::Value>,
    /// String representation of the source error, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_message: Option<String>,
}

impl From<&ReconcileError> for ReconcileErrorDto {
    fn from(err: &ReconcileError) -> Self {
        Self {
            code: err.code,
            message: err.message.clone(),
            context: err.context.clone(),
            source_message: err.source.as_ref().map(|s| s.to_string()),
        }
    }
}

impl From<ReconcileErrorDto> for ReconcileError {
    fn from(dto: ReconcileErrorDto) -> Self {
        Self {
            code: dto.code,
            message: dto.message,
            source: None,
            context: dto.context,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
