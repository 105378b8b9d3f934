//! Status views.

use serde::{Deserialize, Serialize};

use crate::domain::JobState;

/// Number of jobs per state.
///
/// Observational only: under concurrent writers the numbers may be slightly
/// stale by the time they are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
}

impl QueueCounts {
    pub fn get(&self, state: JobState) -> usize {
        match state {
            JobState::Pending => self.pending,
            JobState::Processing => self.processing,
            JobState::Completed => self.completed,
            JobState::Failed => self.failed,
            JobState::Dead => self.dead,
        }
    }

    pub fn add(&mut self, state: JobState, n: usize) {
        let slot = match state {
            JobState::Pending => &mut self.pending,
            JobState::Processing => &mut self.processing,
            JobState::Completed => &mut self.completed,
            JobState::Failed => &mut self.failed,
            JobState::Dead => &mut self.dead,
        };
        *slot += n;
    }

    pub fn total(&self) -> usize {
        JobState::ALL.iter().map(|s| self.get(*s)).sum()
    }

    /// `(state, count)` pairs for every state, in state order.
    pub fn iter(&self) -> impl Iterator<Item = (JobState, usize)> + '_ {
        JobState::ALL.into_iter().map(|s| (s, self.get(s)))
    }
}

/// Pool status as reported to operators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub running: bool,
    pub worker_count: usize,
}
