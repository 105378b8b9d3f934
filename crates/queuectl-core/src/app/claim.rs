//! Claim - 次に実行可能なジョブを1件だけ確保する
//!
//! # フロー
//! 1. JobStore::find_next_ready() で候補 id を取得
//! 2. JobStore::try_mark_processing() で条件付き更新（CAS）
//! 3. 1行更新できたら JobStore::get() で確保したジョブを返す
//!
//! どのステップでも `StoreError::Busy` が返ったら、少し待ってから
//! 1 からやり直す。結果の書き込みも同じ `retry_on_busy` で再試行する。

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::domain::Job;
use crate::error::{QueueError, Result};
use crate::ports::{Clock, JobStore};

/// Retry schedule for a claim that keeps hitting a busy store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentionBackoff {
    /// Wait before the second attempt. Doubles after every busy attempt.
    pub initial_delay: Duration,

    /// Attempts in total, including the first one.
    pub max_attempts: u32,
}

impl Default for ContentionBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_attempts: 5,
        }
    }
}

impl ContentionBackoff {
    pub fn new(initial_delay: Duration, max_attempts: u32) -> Self {
        Self {
            initial_delay,
            max_attempts,
        }
    }

    /// Wait after busy attempt number `attempt` (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }
}

/// Result of one claim round.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The job now belongs to the caller, already in `Processing`.
    Claimed(Job),

    /// Nothing ready, or another worker won the race for the candidate.
    Empty,
}

impl ClaimOutcome {
    pub fn into_job(self) -> Option<Job> {
        match self {
            ClaimOutcome::Claimed(job) => Some(job),
            ClaimOutcome::Empty => None,
        }
    }
}

/// Run `op` until it returns something other than a busy store error.
///
/// Waits `backoff.delay_after(n)` between attempts and gives up with
/// `ContentionExhausted` after `backoff.max_attempts`.
pub async fn retry_on_busy<T, F, Fut>(backoff: &ContentionBackoff, what: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = backoff.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match op().await {
            Err(e) if e.is_busy() => {
                if attempt == max_attempts {
                    break;
                }
                let delay = backoff.delay_after(attempt);
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "Store busy during {what}, backing off");
                tokio::time::sleep(delay).await;
            }
            other => return other,
        }
    }

    warn!(attempts = max_attempts, "Giving up {what}, store stayed busy");
    Err(QueueError::ContentionExhausted {
        attempts: max_attempts,
    })
}

/// Claim the oldest ready job, retrying the whole sequence on contention.
pub async fn claim_next_ready(
    store: &dyn JobStore,
    clock: &dyn Clock,
    backoff: &ContentionBackoff,
) -> Result<ClaimOutcome> {
    retry_on_busy(backoff, "claim", || try_claim(store, clock.now())).await
}

async fn try_claim(store: &dyn JobStore, now: DateTime<Utc>) -> Result<ClaimOutcome> {
    let Some(id) = store.find_next_ready(now).await? else {
        return Ok(ClaimOutcome::Empty);
    };

    if !store.try_mark_processing(&id, now).await? {
        debug!(job_id = %id, "Lost claim race");
        return Ok(ClaimOutcome::Empty);
    }

    let job = store.get(&id).await?;
    Ok(ClaimOutcome::Claimed(job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobId, JobState};
    use crate::impls::InMemoryJobStore;
    use crate::ports::FixedClock;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use rstest::rstest;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn fast_backoff() -> ContentionBackoff {
        ContentionBackoff::new(Duration::from_millis(1), 5)
    }

    async fn store_with(ids: &[&str]) -> InMemoryJobStore {
        let store = InMemoryJobStore::new();
        for (i, id) in ids.iter().enumerate() {
            let created_at = t0() + ChronoDuration::milliseconds(i as i64);
            store
                .insert(&Job::new(JobId::new(*id), "true", 3, created_at))
                .await
                .unwrap();
        }
        store
    }

    #[rstest]
    #[case(1, 10)]
    #[case(2, 20)]
    #[case(3, 40)]
    #[case(4, 80)]
    fn default_backoff_doubles_from_ten_millis(#[case] attempt: u32, #[case] millis: u64) {
        let backoff = ContentionBackoff::default();
        assert_eq!(backoff.max_attempts, 5);
        assert_eq!(backoff.delay_after(attempt), Duration::from_millis(millis));
    }

    #[tokio::test]
    async fn retry_on_busy_passes_other_errors_through() {
        let mut calls = 0;
        let err = retry_on_busy(&fast_backoff(), "test", || {
            calls += 1;
            async { Err::<(), _>(QueueError::Conflict("nope".into())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, QueueError::Conflict(_)));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn empty_store_claims_nothing() {
        let store = InMemoryJobStore::new();
        let clock = FixedClock::new(t0());

        let outcome = claim_next_ready(&store, &clock, &fast_backoff()).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Empty);
    }

    #[tokio::test]
    async fn claims_oldest_job_and_marks_it_processing() {
        let store = store_with(&["first", "second"]).await;
        let clock = FixedClock::new(t0() + ChronoDuration::seconds(1));

        let job = claim_next_ready(&store, &clock, &fast_backoff())
            .await
            .unwrap()
            .into_job()
            .unwrap();
        assert_eq!(job.id, JobId::new("first"));
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.updated_at, clock.now());

        let job = claim_next_ready(&store, &clock, &fast_backoff())
            .await
            .unwrap()
            .into_job()
            .unwrap();
        assert_eq!(job.id, JobId::new("second"));

        let outcome = claim_next_ready(&store, &clock, &fast_backoff()).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Empty);
    }

    #[tokio::test]
    async fn terminal_jobs_are_never_claimed() {
        let store = store_with(&["done", "dead"]).await;
        store
            .apply_outcome(&JobId::new("done"), JobState::Completed, 0, None, t0())
            .await
            .unwrap();
        store
            .apply_outcome(&JobId::new("dead"), JobState::Dead, 4, None, t0())
            .await
            .unwrap();
        let clock = FixedClock::new(t0() + ChronoDuration::days(365));

        let outcome = claim_next_ready(&store, &clock, &fast_backoff()).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Empty);
    }

    #[tokio::test]
    async fn failed_job_waits_for_its_retry_time() {
        let store = store_with(&["retry"]).await;
        let id = JobId::new("retry");
        let due = t0() + ChronoDuration::seconds(2);
        store
            .apply_outcome(&id, JobState::Failed, 1, Some(due), t0())
            .await
            .unwrap();
        let clock = FixedClock::new(t0() + ChronoDuration::seconds(1));

        let outcome = claim_next_ready(&store, &clock, &fast_backoff()).await.unwrap();
        assert_eq!(outcome, ClaimOutcome::Empty);

        clock.set(due);
        let job = claim_next_ready(&store, &clock, &fast_backoff())
            .await
            .unwrap()
            .into_job()
            .unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_retry_at, None);
    }

    #[tokio::test]
    async fn busy_failures_within_budget_are_absorbed() {
        let store = store_with(&["a"]).await;
        let clock = FixedClock::new(t0());
        store.inject_busy(4);

        let outcome = claim_next_ready(&store, &clock, &fast_backoff()).await.unwrap();
        assert!(matches!(outcome, ClaimOutcome::Claimed(_)));
        assert_eq!(store.pending_busy(), 0);
    }

    #[tokio::test]
    async fn busy_failures_past_budget_surface_contention_exhausted() {
        let store = store_with(&["a"]).await;
        let clock = FixedClock::new(t0());
        store.inject_busy(5);

        let err = claim_next_ready(&store, &clock, &fast_backoff())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::ContentionExhausted { attempts: 5 }));

        // The job was never touched.
        let job = store.get(&JobId::new("a")).await.unwrap();
        assert_eq!(job.state, JobState::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_claims_are_exclusive() {
        let store = Arc::new(store_with(&["only"]).await);
        let clock = Arc::new(FixedClock::new(t0()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let clock = Arc::clone(&clock);
            handles.push(tokio::spawn(async move {
                claim_next_ready(store.as_ref(), clock.as_ref(), &fast_backoff()).await
            }));
        }

        let mut claimed = 0;
        for handle in handles {
            if let ClaimOutcome::Claimed(job) = handle.await.unwrap().unwrap() {
                assert_eq!(job.id, JobId::new("only"));
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
    }
}
