//! CommandExecutor port.

use async_trait::async_trait;

use crate::domain::ExecutionOutcome;

/// Runs a job's command and reports how it went.
///
/// Executors know nothing about queue state. A command that fails, or that
/// cannot even be launched, is reported as a failed `ExecutionOutcome`, never
/// as an error. There is no timeout: a hung command holds its worker.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> ExecutionOutcome;
}
