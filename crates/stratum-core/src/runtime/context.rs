// crates/stratum-core/src/runtime/context.rs
// ============================================================================
// Module: Operation Context
// Description: Cancellation flag and deadline for blocking lifecycle calls.
// Purpose: Let callers abort bootstrap and teardown between network steps.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Bootstrap and destroy block on backend I/O. They poll an
//! [`OperationContext`] between steps; a cancelled or expired context stops
//! the operation before the next step starts. Clones share the cancellation
//! flag, so a caller can hand one clone to the operation and cancel through
//! another.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Reasons an operation context stops work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The deadline passed.
    #[error("operation deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline carrier for blocking operations.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    /// Shared cancellation flag.
    cancelled: Arc<AtomicBool>,
    /// Optional absolute deadline.
    deadline: Option<Instant>,
}

impl OperationContext {
    /// Creates a context with no deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns a copy that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let deadline = Instant::now() + timeout;
        self.with_deadline(deadline)
    }

    /// Cancels this context and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Checks whether work may continue.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] once cancelled or past the deadline.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ContextError::DeadlineExceeded);
        }
        Ok(())
    }
}
