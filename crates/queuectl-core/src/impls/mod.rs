//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **SqliteJobStore**: 本番用の正本（WAL モードの SQLite ファイル）
//! - **InMemoryJobStore**: テスト用の正本（Busy の注入が可能）
//! - **ShellExecutor**: `sh -c` / `cmd /C` でコマンドを実行

pub mod memory_store;
pub mod shell_executor;
pub mod sqlite;

// 主要な型を再エクスポート
pub use self::memory_store::InMemoryJobStore;
pub use self::shell_executor::ShellExecutor;
pub use self::sqlite::{SqliteJobStore, SqliteStoreOptions};
