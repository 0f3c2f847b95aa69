//! Error Types
//!
//! Only recoverable or reportable failures are modeled here. Engine-internal
//! consistency violations (dereferencing a reclaimed heap slot, restoring
//! mementos out of order, unknown thread ids) panic at the violation site
//! instead, because they indicate a defect in the checker rather than in
//! the modeled program.
//!
//! Conditions of the modeled program itself (out-of-memory, deadlock,
//! blocked-in-atomic) are not errors at all: they are encoded in the
//! kernel state and reported by the search.

use crate::domain::heap::{ClassInitStatus, ObjRef};
use crate::domain::threads::{ThreadId, ThreadState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Configuration Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Construction-time configuration failures, surfaced once at startup
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// `scheduler.policy` names no known policy
    #[error("Unknown scheduling policy '{0}' (expected default, round_robin, priority or randomized)")]
    UnknownPolicy(String),

    /// `search.state_table` names no known table
    #[error("Unknown state table '{0}' (expected hashed or exact)")]
    UnknownStateTable(String),

    /// A boxed-value cache range is empty or inverted
    #[error("Invalid box cache bounds for {kind}: low {low} > high {high}")]
    InvalidBoxBounds {
        kind: &'static str,
        low: i64,
        high: i64,
    },

    /// Malformed JSON
    #[error("Failed to parse checker configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Kernel Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failures of kernel-state operations requested by the driver
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// A second incremental change tracker was requested
    #[error("An incremental change tracker is already registered for this kernel state")]
    IncrementalTrackerConflict,

    /// The class has no registry entry or no static slot on this path
    #[error("Class not loaded: {0}")]
    ClassNotLoaded(String),

    /// The class declares no such field
    #[error("Unknown field '{field}' in class {class}")]
    UnknownField { class: String, field: String },

    /// Class init status would move backwards
    #[error("Class {class} cannot go from {from} back to {to}")]
    InitStatusRegression {
        class: String,
        from: ClassInitStatus,
        to: ClassInitStatus,
    },

    /// Monitor operation by a thread that does not own the monitor
    #[error("{thread} does not own the monitor of {object}")]
    IllegalMonitorState { thread: ThreadId, object: ObjRef },

    /// Operation requires a started, non-terminated thread
    #[error("{0} is not alive")]
    ThreadNotAlive(ThreadId),

    /// Thread is in the wrong lifecycle state for the operation
    #[error("{thread} cannot be started from state {state}")]
    IllegalThreadState { thread: ThreadId, state: ThreadState },

    /// Atomic section ended by a thread that did not begin it
    #[error("{0} is not inside an atomic section")]
    NotInAtomicSection(ThreadId),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Search Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failures that stop an exploration
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Kernel operation failed
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The program under test could not execute a transition
    #[error("Program failed in {thread}: {message}")]
    Program { thread: ThreadId, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = KernelError::IllegalMonitorState {
            thread: ThreadId(2),
            object: ObjRef::new(7),
        };
        assert_eq!(err.to_string(), "Thread(2) does not own the monitor of @7");

        let err = ConfigError::UnknownPolicy("fifo".into());
        assert!(err.to_string().contains("'fifo'"));
    }

    #[test]
    fn test_search_error_from_kernel() {
        let err: SearchError = KernelError::IncrementalTrackerConflict.into();
        assert!(matches!(err, SearchError::Kernel(KernelError::IncrementalTrackerConflict)));
    }
}
