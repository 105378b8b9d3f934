//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **QueueBuilder**: JobQueue の構築とワイヤリング
//! - **JobQueue**: enqueue / 参照 / DLQ / claim / 結果反映
//! - **claim**: find → 条件付き更新 → get（Busy 時は指数バックオフで再試行）
//! - **WorkerPool**: ワーカーループの起動・停止

pub mod builder;
pub mod claim;
pub mod queue;
pub mod worker_pool;

// 主要な型を再エクスポート
pub use self::builder::QueueBuilder;
pub use self::claim::{ClaimOutcome, ContentionBackoff};
pub use self::queue::JobQueue;
pub use self::worker_pool::{PoolOptions, WorkerPool};
