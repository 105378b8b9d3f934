//! JobStore port - ジョブ表の正本（source of truth）
//!
//! The claim protocol and the worker pool are written only against this
//! trait. A store must give two guarantees:
//! - conditional updates (`try_mark_processing`, `requeue_dead`) that only
//!   change a row still in the expected state;
//! - a `StoreError::Busy` signal, distinct from `StoreError::Fatal`, when it
//!   could not serialize concurrent access.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Job, JobId, JobState};
use crate::error::Result;
use crate::observability::QueueCounts;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job. `Conflict` if the id already exists.
    async fn insert(&self, job: &Job) -> Result<()>;

    /// `NotFound` if the id does not exist.
    async fn get(&self, id: &JobId) -> Result<Job>;

    /// Jobs in `state`, oldest `created_at` first.
    async fn list_by_state(&self, state: JobState) -> Result<Vec<Job>>;

    /// Every job, oldest `created_at` first.
    async fn list_all(&self) -> Result<Vec<Job>>;

    async fn count_by_state(&self) -> Result<QueueCounts>;

    /// Id of the oldest job that is `Pending`, or `Failed` with
    /// `next_retry_at <= now`.
    async fn find_next_ready(&self, now: DateTime<Utc>) -> Result<Option<JobId>>;

    /// Move `id` to `Processing` (clearing `next_retry_at`) only if it is still
    /// `Pending`, or still `Failed` and due at `now`.
    ///
    /// Returns `false` when the guard did not match, i.e. another worker
    /// claimed the job first.
    async fn try_mark_processing(&self, id: &JobId, now: DateTime<Utc>) -> Result<bool>;

    /// Overwrite state, attempts, `next_retry_at` and `updated_at` of `id`.
    ///
    /// No state check: the caller holds the job in `Processing`.
    async fn apply_outcome(
        &self,
        id: &JobId,
        state: JobState,
        attempts: u32,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()>;

    /// `Dead` -> `Pending` with `attempts = 0` and no `next_retry_at`.
    ///
    /// `NotFound` if the id does not exist, `Conflict` if it is not `Dead`.
    async fn requeue_dead(&self, id: &JobId, now: DateTime<Utc>) -> Result<()>;
}
