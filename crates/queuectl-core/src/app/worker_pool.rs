//! WorkerPool - ワーカーの起動・停止
//!
//! # フロー（1ワーカー）
//! 1. shutdown が来ていたら抜ける
//! 2. JobQueue::claim_next_ready() で1件確保
//! 3. なければ idle（shutdown で中断される）
//! 4. CommandExecutor::execute() で実行（中断しない）
//! 5. JobQueue::apply_outcome() で結果を反映

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::claim::ClaimOutcome;
use crate::app::queue::JobQueue;
use crate::domain::{Decision, Job};
use crate::error::{QueueError, Result};
use crate::observability::PoolStatus;
use crate::ports::CommandExecutor;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Sleep between claims when nothing is ready.
    pub idle_interval: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_secs(1),
        }
    }
}

/// Running worker group handle.
/// - `shutdown_tx` に true を送るとワーカー全体が止まる
/// - `joins` で全ワーカーの終了を待てる
struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    async fn shutdown_and_join(self) {
        // ignore send error: every worker may already have exited
        let _ = self.shutdown_tx.send(true);
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }
}

enum PoolState {
    Idle,
    Running(WorkerGroup),
    Stopping { worker_count: usize },
}

/// A pool of workers draining one `JobQueue`.
///
/// At most one group of workers runs per pool. Dropping a running pool
/// closes the shutdown channel, which the workers also treat as a stop
/// request.
pub struct WorkerPool {
    queue: JobQueue,
    executor: Arc<dyn CommandExecutor>,
    options: PoolOptions,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, executor: Arc<dyn CommandExecutor>) -> Self {
        Self::with_options(queue, executor, PoolOptions::default())
    }

    pub fn with_options(
        queue: JobQueue,
        executor: Arc<dyn CommandExecutor>,
        options: PoolOptions,
    ) -> Self {
        Self {
            queue,
            executor,
            options,
            state: Mutex::new(PoolState::Idle),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn `n` workers and return immediately.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn start(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Err(QueueError::Validation(
                "worker count must be at least 1".into(),
            ));
        }

        let mut state = self.lock_state();
        if !matches!(*state, PoolState::Idle) {
            return Err(QueueError::Conflict("worker pool is already running".into()));
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let worker = Worker {
                id: worker_id,
                queue: self.queue.clone(),
                executor: Arc::clone(&self.executor),
                idle_interval: self.options.idle_interval,
                shutdown_rx: shutdown_rx.clone(),
            };
            joins.push(tokio::spawn(worker.run()));
        }

        *state = PoolState::Running(WorkerGroup { shutdown_tx, joins });
        info!(worker_count = n, "Worker pool started");
        Ok(())
    }

    /// Signal every worker to stop and wait for all of them.
    ///
    /// A job that is executing finishes and has its outcome recorded first,
    /// so this can take as long as the slowest running command.
    pub async fn stop(&self) -> Result<()> {
        let group = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, PoolState::Idle) {
                PoolState::Running(group) => {
                    *state = PoolState::Stopping {
                        worker_count: group.joins.len(),
                    };
                    group
                }
                stopping @ PoolState::Stopping { .. } => {
                    *state = stopping;
                    return Err(QueueError::Conflict("worker pool is already stopping".into()));
                }
                PoolState::Idle => {
                    return Err(QueueError::Conflict("worker pool is not running".into()));
                }
            }
        };

        let _reset = ResetOnDrop(&self.state);
        info!("Stopping worker pool");
        group.shutdown_and_join().await;
        info!("Worker pool stopped");
        Ok(())
    }

    pub fn status(&self) -> PoolStatus {
        match &*self.lock_state() {
            PoolState::Idle => PoolStatus::default(),
            PoolState::Running(group) => PoolStatus {
                running: true,
                worker_count: group.joins.len(),
            },
            PoolState::Stopping { worker_count } => PoolStatus {
                running: true,
                worker_count: *worker_count,
            },
        }
    }
}

/// Puts the pool back to `Idle` once `stop()` is done, or if it is dropped
/// halfway through the join.
struct ResetOnDrop<'a>(&'a Mutex<PoolState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = PoolState::Idle;
    }
}

struct Worker {
    id: usize,
    queue: JobQueue,
    executor: Arc<dyn CommandExecutor>,
    idle_interval: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        info!(worker_id = self.id, "Worker started");
        loop {
            if self.shutdown_requested() {
                break;
            }

            match self.queue.claim_next_ready().await {
                Ok(ClaimOutcome::Claimed(job)) => self.process(job).await,
                Ok(ClaimOutcome::Empty) => {
                    if self.idle().await {
                        break;
                    }
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Failed to claim job");
                    if self.idle().await {
                        break;
                    }
                }
            }
        }
        info!(worker_id = self.id, "Worker stopped");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown_rx.borrow() || self.shutdown_rx.has_changed().is_err()
    }

    /// Sleep for the idle interval. Returns `true` if shutdown cut it short.
    async fn idle(&mut self) -> bool {
        tokio::select! {
            // 変更でも sender の drop でも停止扱い
            _ = self.shutdown_rx.changed() => true,
            _ = tokio::time::sleep(self.idle_interval) => false,
        }
    }

    async fn process(&self, job: Job) {
        info!(
            worker_id = self.id,
            job_id = %job.id,
            attempts = job.attempts,
            command = %job.command,
            "Processing job"
        );

        // ここは shutdown と競合させない（実行中のコマンドは最後まで待つ）
        let outcome = self.executor.execute(&job.command).await;

        match self.queue.apply_outcome(&job, &outcome).await {
            Ok(Decision::Complete { .. }) => {
                info!(worker_id = self.id, job_id = %job.id, "Job completed");
            }
            Ok(Decision::Retry {
                attempts,
                delay,
                next_retry_at,
            }) => {
                warn!(
                    worker_id = self.id,
                    job_id = %job.id,
                    attempts,
                    max_retries = job.max_retries,
                    delay_secs = delay.num_seconds(),
                    %next_retry_at,
                    reason = outcome.reason.as_deref().unwrap_or_default(),
                    "Job failed, retry scheduled"
                );
            }
            Ok(Decision::MarkDead { attempts }) => {
                error!(
                    worker_id = self.id,
                    job_id = %job.id,
                    attempts,
                    reason = outcome.reason.as_deref().unwrap_or_default(),
                    "Job moved to dead letter queue"
                );
            }
            Err(e) => {
                error!(worker_id = self.id, job_id = %job.id, error = %e, "Failed to record job outcome");
            }
        }
    }
}
