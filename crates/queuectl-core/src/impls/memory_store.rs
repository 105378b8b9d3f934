//! In-memory job store.
//!
//! Not durable. Used by tests and for embedding the queue in a process that
//! does not need persistence. All conditional updates happen under one lock,
//! so they are trivially atomic.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{Job, JobId, JobState};
use crate::error::{QueueError, Result, StoreError};
use crate::observability::QueueCounts;
use crate::ports::JobStore;

/// Stored job plus its insertion sequence (tie-breaker for equal
/// `created_at`).
#[derive(Debug, Clone)]
struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Default)]
struct InMemoryStoreState {
    /// All jobs (single source of truth).
    jobs: HashMap<JobId, Entry>,

    /// Next insertion sequence number.
    next_seq: u64,
}

impl InMemoryStoreState {
    /// Jobs matching `filter`, oldest first.
    fn sorted<F>(&self, filter: F) -> Vec<&Entry>
    where
        F: Fn(&Job) -> bool,
    {
        let mut entries: Vec<&Entry> = self.jobs.values().filter(|e| filter(&e.job)).collect();
        entries.sort_by(|a, b| {
            a.job
                .created_at
                .cmp(&b.job.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        entries
    }

    fn get_mut(&mut self, id: &JobId) -> Result<&mut Job> {
        self.jobs
            .get_mut(id)
            .map(|e| &mut e.job)
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }
}

/// In-memory `JobStore`.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    state: Arc<Mutex<InMemoryStoreState>>,
    busy_failures: Arc<AtomicU32>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` store calls fail with `StoreError::Busy`.
    pub fn inject_busy(&self, n: u32) {
        self.busy_failures.store(n, Ordering::SeqCst);
    }

    /// Busy failures injected but not yet consumed.
    pub fn pending_busy(&self) -> u32 {
        self.busy_failures.load(Ordering::SeqCst)
    }

    fn check_busy(&self) -> Result<()> {
        let took = self
            .busy_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if took {
            return Err(StoreError::Busy("simulated contention".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        self.check_busy()?;
        let mut state = self.state.lock().await;
        if state.jobs.contains_key(&job.id) {
            return Err(QueueError::Conflict(format!("job '{}' already exists", job.id)));
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(
            job.id.clone(),
            Entry {
                seq,
                job: job.clone(),
            },
        );
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Job> {
        self.check_busy()?;
        let state = self.state.lock().await;
        state
            .jobs
            .get(id)
            .map(|e| e.job.clone())
            .ok_or_else(|| QueueError::NotFound(id.clone()))
    }

    async fn list_by_state(&self, job_state: JobState) -> Result<Vec<Job>> {
        self.check_busy()?;
        let state = self.state.lock().await;
        Ok(state
            .sorted(|j| j.state == job_state)
            .into_iter()
            .map(|e| e.job.clone())
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<Job>> {
        self.check_busy()?;
        let state = self.state.lock().await;
        Ok(state
            .sorted(|_| true)
            .into_iter()
            .map(|e| e.job.clone())
            .collect())
    }

    async fn count_by_state(&self) -> Result<QueueCounts> {
        self.check_busy()?;
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for entry in state.jobs.values() {
            counts.add(entry.job.state, 1);
        }
        Ok(counts)
    }

    async fn find_next_ready(&self, now: DateTime<Utc>) -> Result<Option<JobId>> {
        self.check_busy()?;
        let state = self.state.lock().await;
        Ok(state
            .sorted(|j| j.is_ready_at(now))
            .first()
            .map(|e| e.job.id.clone()))
    }

    async fn try_mark_processing(&self, id: &JobId, now: DateTime<Utc>) -> Result<bool> {
        self.check_busy()?;
        let mut state = self.state.lock().await;
        let Some(entry) = state.jobs.get_mut(id) else {
            return Ok(false);
        };
        if !entry.job.is_ready_at(now) {
            return Ok(false);
        }
        entry.job.state = JobState::Processing;
        entry.job.next_retry_at = None;
        entry.job.updated_at = now;
        Ok(true)
    }

    async fn apply_outcome(
        &self,
        id: &JobId,
        new_state: JobState,
        attempts: u32,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.check_busy()?;
        let mut state = self.state.lock().await;
        let job = state.get_mut(id)?;
        job.state = new_state;
        job.attempts = attempts;
        job.next_retry_at = next_retry_at;
        job.updated_at = now;
        Ok(())
    }

    async fn requeue_dead(&self, id: &JobId, now: DateTime<Utc>) -> Result<()> {
        self.check_busy()?;
        let mut state = self.state.lock().await;
        let job = state.get_mut(id)?;
        if job.state != JobState::Dead {
            return Err(QueueError::Conflict(format!(
                "job '{id}' is {}, only dead jobs can be requeued",
                job.state
            )));
        }
        job.state = JobState::Pending;
        job.attempts = 0;
        job.next_retry_at = None;
        job.updated_at = now;
        Ok(())
    }
}
