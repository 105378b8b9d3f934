//! Decision model: what happens to a job after one execution.
//!
//! This module defines the Decision type (the job's next state) and the
//! OutcomePolicy trait (how to determine it from the job and the outcome).

use chrono::{DateTime, Duration, Utc};

use super::job::Job;
use super::outcome::ExecutionOutcome;
use super::state::JobState;

/// The next state for a job that has just been executed.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Command succeeded. Attempts are left as they were.
    Complete { attempts: u32 },

    /// Command failed, try again once `next_retry_at` has passed.
    Retry {
        attempts: u32,
        delay: Duration,
        next_retry_at: DateTime<Utc>,
    },

    /// Command failed and the retry budget is spent.
    MarkDead { attempts: u32 },
}

impl Decision {
    pub fn state(&self) -> JobState {
        match self {
            Decision::Complete { .. } => JobState::Completed,
            Decision::Retry { .. } => JobState::Failed,
            Decision::MarkDead { .. } => JobState::Dead,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Decision::Complete { attempts }
            | Decision::Retry { attempts, .. }
            | Decision::MarkDead { attempts } => *attempts,
        }
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Decision::Retry { next_retry_at, .. } => Some(*next_retry_at),
            _ => None,
        }
    }
}

/// Decides the next state of a job from its current record and the outcome
/// of the execution that just finished.
///
/// Implementations are pure: no I/O, no mutation. Persisting the decision is
/// the caller's job (`JobStore::apply_outcome`).
pub trait OutcomePolicy: Send + Sync {
    fn decide(&self, job: &Job, outcome: &ExecutionOutcome, now: DateTime<Utc>) -> Decision;
}

/// Default policy: exponential backoff, then the dead letter queue.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Multiplicative factor of the retry delay (`base^attempts` seconds).
    pub backoff_base: f64,
}

impl RetryPolicy {
    pub fn new(backoff_base: f64) -> Self {
        Self { backoff_base }
    }

    /// Delay before retry number `attempts` (1-indexed).
    ///
    /// Example with base=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        backoff_delay(attempts, self.backoff_base)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl OutcomePolicy for RetryPolicy {
    fn decide(&self, job: &Job, outcome: &ExecutionOutcome, now: DateTime<Utc>) -> Decision {
        if outcome.is_success() {
            return Decision::Complete {
                attempts: job.attempts,
            };
        }

        let attempts = job.attempts.saturating_add(1);
        if attempts > job.max_retries {
            return Decision::MarkDead { attempts };
        }

        let delay = self.next_delay(attempts);
        let next_retry_at = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Decision::Retry {
            attempts,
            delay,
            next_retry_at,
        }
    }
}

/// `round(base^n)` whole seconds. No jitter, no cap; saturates rather than
/// overflowing for absurd exponents.
pub fn backoff_delay(n: u32, base: f64) -> Duration {
    let exponent = i32::try_from(n).unwrap_or(i32::MAX);
    let secs = base.powi(exponent).round().max(0.0);
    // `as` saturates for out-of-range floats (and maps NaN to 0).
    let secs = secs as i64;
    Duration::try_seconds(secs).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::JobId;
    use chrono::TimeZone;
    use rstest::rstest;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn processing_job(attempts: u32, max_retries: u32) -> Job {
        let mut job = Job::new(JobId::new("j1"), "false", max_retries, t0());
        job.state = JobState::Processing;
        job.attempts = attempts;
        job
    }

    #[rstest]
    #[case(1, 2)]
    #[case(2, 4)]
    #[case(3, 8)]
    #[case(4, 16)]
    fn backoff_grows_exponentially(#[case] n: u32, #[case] secs: i64) {
        assert_eq!(backoff_delay(n, 2.0), Duration::seconds(secs));
    }

    #[test]
    fn backoff_rounds_to_whole_seconds() {
        // 1.5^3 = 3.375
        assert_eq!(backoff_delay(3, 1.5), Duration::seconds(3));
        // 2.5^2 = 6.25
        assert_eq!(backoff_delay(2, 2.5), Duration::seconds(6));
        assert_eq!(backoff_delay(0, 3.0), Duration::seconds(1));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay(u32::MAX, 10.0), Duration::MAX);
    }

    #[test]
    fn success_completes_without_touching_attempts() {
        let job = processing_job(2, 3);
        let d = RetryPolicy::default().decide(&job, &ExecutionOutcome::success(), t0());

        assert_eq!(d, Decision::Complete { attempts: 2 });
        assert_eq!(d.state(), JobState::Completed);
        assert_eq!(d.next_retry_at(), None);
    }

    #[test]
    fn failure_schedules_retry_with_backoff() {
        let policy = RetryPolicy::new(2.0);
        let fail = ExecutionOutcome::failure("exit status 1");

        let d1 = policy.decide(&processing_job(0, 3), &fail, t0());
        assert_eq!(d1.state(), JobState::Failed);
        assert_eq!(d1.attempts(), 1);
        assert_eq!(d1.next_retry_at(), Some(t0() + Duration::seconds(2)));

        let d2 = policy.decide(&processing_job(1, 3), &fail, t0());
        assert_eq!(d2.next_retry_at(), Some(t0() + Duration::seconds(4)));

        let d3 = policy.decide(&processing_job(2, 3), &fail, t0());
        assert_eq!(d3.next_retry_at(), Some(t0() + Duration::seconds(8)));
    }

    #[test]
    fn failure_past_max_retries_marks_dead() {
        let policy = RetryPolicy::default();
        let fail = ExecutionOutcome::failure("exit status 1");

        // 4th failure with max_retries = 3
        let d = policy.decide(&processing_job(3, 3), &fail, t0());
        assert_eq!(d, Decision::MarkDead { attempts: 4 });
        assert_eq!(d.state(), JobState::Dead);
        assert_eq!(d.next_retry_at(), None);
    }

    #[test]
    fn zero_max_retries_goes_straight_to_dead() {
        let d = RetryPolicy::default().decide(
            &processing_job(0, 0),
            &ExecutionOutcome::failure("nope"),
            t0(),
        );
        assert_eq!(d, Decision::MarkDead { attempts: 1 });
    }
}
