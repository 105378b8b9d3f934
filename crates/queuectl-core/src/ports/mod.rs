//! Ports - 抽象化レイヤー
//!
//! 外部との境界（永続化ストア、コマンド実行、時刻、ID 生成）を trait として
//! 定義する。実装は `impls` にある。

pub mod clock;
pub mod executor;
pub mod id_generator;
pub mod job_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::executor::CommandExecutor;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::JobStore;
