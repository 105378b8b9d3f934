//! queuectl-core
//!
//! Core building blocks for the queuectl job queue.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, job, outcome, decision）
//! - **ports**: 抽象化レイヤー（JobStore, CommandExecutor, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, queue, claim, worker_pool）
//! - **impls**: 実装（SqliteJobStore, InMemoryJobStore, ShellExecutor）
//! - **config / error / observability**: 設定値・エラー型・ステータス表示

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::{ClaimOutcome, ContentionBackoff, JobQueue, PoolOptions, QueueBuilder, WorkerPool};
pub use config::QueueConfig;
pub use domain::{
    Decision, ExecutionOutcome, Job, JobDefinition, JobId, JobState, OutcomePolicy, RetryPolicy,
};
pub use error::{QueueError, Result, StoreError};
pub use observability::{PoolStatus, QueueCounts};
