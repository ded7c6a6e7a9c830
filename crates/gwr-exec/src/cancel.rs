// SPDX-License-Identifier: MIT OR Apache-2.0
//! Cancellation primitives for reconciliation runs.
//!
//! Cancellation is best-effort: the executor stops issuing new operations,
//! in-flight operations run to completion, and nothing is rolled back.
//! The token records *why* the run was cancelled (first reason wins) and
//! maps that reason onto the `cancelled` code of the error taxonomy, so
//! the final report can say more than "stopped".

use gwr_error::{ErrorCode, ReconcileError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::Notify;

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The caller asked for the run to stop.
    UserRequested,
    /// An interrupt signal (Ctrl-C) reached the process.
    Interrupt,
    /// The host is shutting down.
    Shutdown,
}

impl CancelReason {
    /// Human-readable description, used in report errors.
    #[must_use]
    pub fn describe(&self) -> &'static str {
        match self {
            Self::UserRequested => "run cancelled by caller",
            Self::Interrupt => "run interrupted by signal",
            Self::Shutdown => "run stopped for shutdown",
        }
    }
}

/// A cloneable, cheaply-shareable token used to signal cancellation.
///
/// All clones share the same underlying state; cancelling one immediately
/// makes every clone observe `is_cancelled() == true`. Only the first
/// recorded [`CancelReason`] sticks; later cancellations still wake
/// waiters but do not overwrite it.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

struct TokenInner {
    /// Set exactly once, by whichever caller cancels first.
    reason: OnceLock<CancelReason>,
    notify: Notify,
}

impl CancellationToken {
    /// Create a new token that is **not** cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                reason: OnceLock::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancel at the caller's request. Idempotent.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::UserRequested);
    }

    /// Cancel with an explicit reason. The first reason recorded wins;
    /// repeated calls only re-notify waiters.
    pub fn cancel_with(&self, reason: CancelReason) {
        let _ = self.inner.reason.set(reason);
        self.inner.notify.notify_waiters();
    }

    /// Returns `true` once any cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// The recorded reason, if the token has been cancelled.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// The cancellation as a report error, if the token has been
    /// cancelled. Carries the reason in the error context.
    #[must_use]
    pub fn to_error(&self) -> Option<ReconcileError> {
        let reason = self.reason()?;
        Some(
            ReconcileError::new(
                ErrorCode::Cancelled,
                format!(
                    "{}; already-applied operations were kept",
                    reason.describe()
                ),
            )
            .with_context("reason", reason),
        )
    }

    /// Returns a future that completes when the token is cancelled.
    ///
    /// Resolves immediately if the token is already cancelled. The wakeup
    /// registration happens before the state check, so a cancellation
    /// racing with this call is never missed.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("reason", &self.reason())
            .finish()
    }
}
