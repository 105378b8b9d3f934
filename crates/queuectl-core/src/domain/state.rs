//! Job state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Job state.
///
/// State transitions:
/// - Pending -> Processing (claim)
/// - Failed -> Processing (claim, once `next_retry_at` has passed)
/// - Processing -> Completed (success)
/// - Processing -> Failed (failure, attempts <= max_retries)
/// - Processing -> Dead (failure, attempts > max_retries)
/// - Dead -> Pending (explicit requeue only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting to be claimed.
    Pending,

    /// Held by exactly one worker.
    Processing,

    /// Finished successfully.
    Completed,

    /// Failed, waiting for `next_retry_at` before it can be claimed again.
    Failed,

    /// Retries exhausted (dead letter queue).
    Dead,
}

impl JobState {
    pub const ALL: [JobState; 5] = [
        JobState::Pending,
        JobState::Processing,
        JobState::Completed,
        JobState::Failed,
        JobState::Dead,
    ];

    /// Is this a terminal state (no transitions except an explicit requeue)?
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead)
    }

    /// Can a job in this state ever be picked up by a claim?
    ///
    /// `Failed` additionally requires `next_retry_at <= now`.
    pub fn is_claimable(self) -> bool {
        matches!(self, JobState::Pending | JobState::Failed)
    }

    /// Storage / wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Dead => "dead",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown state name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job state '{0}' (expected one of: pending, processing, completed, failed, dead)")]
pub struct ParseJobStateError(pub String);

impl FromStr for JobState {
    type Err = ParseJobStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseJobStateError(s.to_string()))
    }
}
