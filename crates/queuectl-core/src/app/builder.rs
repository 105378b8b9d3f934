//! QueueBuilder - JobQueue の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）

use std::sync::Arc;

use crate::app::claim::ContentionBackoff;
use crate::app::queue::JobQueue;
use crate::config::QueueConfig;
use crate::domain::{OutcomePolicy, RetryPolicy};
use crate::error::Result;
use crate::ports::{Clock, JobStore, SystemClock};

/// QueueBuilder は JobQueue を構築
///
/// # 使用例
/// ```ignore
/// let queue = QueueBuilder::new(Arc::new(store))
///     .config(config)
///     .clock(Arc::new(FixedClock::new(t0)))
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - build() 時に QueueConfig::validate() を実行
/// - policy を指定しなければ config.backoff_base から RetryPolicy を作る
pub struct QueueBuilder {
    store: Arc<dyn JobStore>,
    clock: Option<Arc<dyn Clock>>,
    policy: Option<Arc<dyn OutcomePolicy>>,
    config: QueueConfig,
    contention: ContentionBackoff,
}

impl QueueBuilder {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            clock: None,
            policy: None,
            config: QueueConfig::default(),
            contention: ContentionBackoff::default(),
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default `RetryPolicy`.
    pub fn policy(mut self, policy: Arc<dyn OutcomePolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn contention_backoff(mut self, contention: ContentionBackoff) -> Self {
        self.contention = contention;
        self
    }

    /// Validate the configuration and build the queue.
    pub fn build(self) -> Result<JobQueue> {
        self.config.validate()?;

        let policy: Arc<dyn OutcomePolicy> = match self.policy {
            Some(policy) => policy,
            None => Arc::new(RetryPolicy::new(self.config.backoff_base)),
        };
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };

        Ok(JobQueue::from_parts(
            self.store,
            clock,
            policy,
            self.config,
            self.contention,
        ))
    }
}
