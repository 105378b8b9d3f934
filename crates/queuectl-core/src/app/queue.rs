//! JobQueue - ジョブキューの操作面
//!
//! enqueue / 参照 / DLQ の再投入 / claim / 結果の反映 をまとめる。
//! 状態遷移そのものは JobStore の条件付き更新と OutcomePolicy に任せる。

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::builder::QueueBuilder;
use crate::app::claim::{self, ClaimOutcome, ContentionBackoff};
use crate::config::QueueConfig;
use crate::domain::{Decision, ExecutionOutcome, Job, JobDefinition, JobId, JobState, OutcomePolicy};
use crate::error::Result;
use crate::observability::QueueCounts;
use crate::ports::{Clock, JobStore};

/// Cheap to clone; every clone shares the same store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    clock: Arc<dyn Clock>,
    policy: Arc<dyn OutcomePolicy>,
    config: QueueConfig,
    contention: ContentionBackoff,
}

impl JobQueue {
    /// Queue with the default clock and retry policy for `config`.
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Result<Self> {
        QueueBuilder::new(store).config(config).build()
    }

    pub fn builder(store: Arc<dyn JobStore>) -> QueueBuilder {
        QueueBuilder::new(store)
    }

    pub(crate) fn from_parts(
        store: Arc<dyn JobStore>,
        clock: Arc<dyn Clock>,
        policy: Arc<dyn OutcomePolicy>,
        config: QueueConfig,
        contention: ContentionBackoff,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            config,
            contention,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Validate `definition` and store it as a new `Pending` job.
    pub async fn enqueue(&self, definition: JobDefinition) -> Result<JobId> {
        let job = definition.into_job(self.config.max_retries, self.clock.now())?;
        self.store.insert(&job).await?;
        info!(job_id = %job.id, max_retries = job.max_retries, "Job enqueued");
        Ok(job.id)
    }

    pub async fn get_job(&self, id: &JobId) -> Result<Job> {
        self.store.get(id).await
    }

    /// Jobs oldest first, optionally restricted to one state.
    pub async fn list_jobs(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        match state {
            Some(state) => self.store.list_by_state(state).await,
            None => self.store.list_all().await,
        }
    }

    /// Jobs in the dead letter queue.
    pub async fn list_dead(&self) -> Result<Vec<Job>> {
        self.store.list_by_state(JobState::Dead).await
    }

    pub async fn stats(&self) -> Result<QueueCounts> {
        self.store.count_by_state().await
    }

    /// Move a `Dead` job back to `Pending` with a fresh retry budget.
    pub async fn requeue_dead(&self, id: &JobId) -> Result<()> {
        self.store.requeue_dead(id, self.clock.now()).await?;
        info!(job_id = %id, "Dead job requeued");
        Ok(())
    }

    pub async fn claim_next_ready(&self) -> Result<ClaimOutcome> {
        claim::claim_next_ready(self.store.as_ref(), self.clock.as_ref(), &self.contention).await
    }

    /// Decide what happens to `job` after `outcome` and persist it.
    ///
    /// `job` must be the record returned by the claim, still in `Processing`.
    /// A busy store is retried on the same schedule as the claim.
    pub async fn apply_outcome(&self, job: &Job, outcome: &ExecutionOutcome) -> Result<Decision> {
        let now = self.clock.now();
        let decision = self.policy.decide(job, outcome, now);
        let store = self.store.as_ref();
        claim::retry_on_busy(&self.contention, "apply outcome", || {
            store.apply_outcome(
                &job.id,
                decision.state(),
                decision.attempts(),
                decision.next_retry_at(),
                now,
            )
        })
        .await?;
        debug!(job_id = %job.id, state = %decision.state(), attempts = decision.attempts(), "Outcome applied");
        Ok(decision)
    }
}
