use thiserror::Error;

use crate::domain::JobId;

/// Failure reported by a `JobStore`.
///
/// Stores classify their own errors: `Busy` means "could not serialize the
/// concurrent access right now, try again", everything else is `Fatal`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is busy: {0}")]
    Busy(String),

    #[error("store failure: {0}")]
    Fatal(String),
}

impl StoreError {
    pub fn is_busy(&self) -> bool {
        matches!(self, StoreError::Busy(_))
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    /// Malformed job definition or tunable. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("job not found: {0}")]
    NotFound(JobId),

    /// Duplicate id, wrong state for a transition, pool start/stop misuse.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A claim or an outcome write kept hitting `StoreError::Busy`.
    #[error("store stayed busy after {attempts} attempts")]
    ContentionExhausted { attempts: u32 },
}

impl QueueError {
    /// Transient store contention that a caller may retry.
    pub fn is_busy(&self) -> bool {
        matches!(self, QueueError::Store(e) if e.is_busy())
    }
}

pub type Result<T> = core::result::Result<T, QueueError>;
