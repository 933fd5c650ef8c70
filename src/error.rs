//! Error Module - IGC Error Types
//!
//! Defines all error types used by the incremental GC core.

use std::sync::PoisonError;
use thiserror::Error;

/// Main error type for all IGC operations.
#[derive(Debug, Error)]
pub enum IgcError {
    #[error("MPM failure during {operation}: {reason}")]
    MpmFailure { operation: String, reason: String },

    #[error("out of memory: requested {requested} bytes, available {available} bytes")]
    OutOfMemory { requested: usize, available: usize },

    #[error("allocation commit failed after {attempts} attempts")]
    CommitFailed { attempts: u32 },

    #[error("root range [{start:#x}, {end:#x}) overlaps an existing root")]
    RootOverlap { start: usize, end: usize },

    #[error("root handle {0} not found in registry")]
    RootNotFound(usize),

    #[error("thread handle {0} not found in registry")]
    ThreadNotFound(usize),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("arena already initialized")]
    AlreadyInitialized,

    #[error("arena not initialized")]
    NotInitialized,

    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl IgcError {
    /// Whether this error is fatal per the taxonomy in `spec.md` §7.
    ///
    /// Fatal errors are not meaningfully recoverable by this core; the host
    /// is expected to abort or otherwise tear down the process. The core
    /// itself never calls `process::abort` so embedders keep control of
    /// their own shutdown path.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IgcError::MpmFailure { .. }
                | IgcError::RootOverlap { .. }
                | IgcError::Internal(_)
                | IgcError::AlreadyInitialized
        )
    }
}

impl<T> From<PoisonError<T>> for IgcError {
    fn from(err: PoisonError<T>) -> Self {
        IgcError::LockPoisoned(err.to_string())
    }
}

/// Result type alias for IGC operations.
pub type Result<T> = std::result::Result<T, IgcError>;
