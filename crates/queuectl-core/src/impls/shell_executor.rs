//! Shell command executor.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::ExecutionOutcome;
use crate::ports::CommandExecutor;

/// Characters of stderr kept in a failure reason.
const STDERR_TAIL_CHARS: usize = 512;

/// Runs each command through the platform shell (`sh -c`, or `cmd /C` on
/// Windows) and waits for it to exit.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn command(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(command);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        }
    }
}

/// Last `max_chars` characters of `s`, trimmed.
fn tail(s: &str, max_chars: usize) -> &str {
    let s = s.trim();
    if max_chars == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max_chars - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> ExecutionOutcome {
        let output = Self::command(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let output = match output {
            Ok(output) => output,
            Err(e) => return ExecutionOutcome::failure(format!("failed to launch command: {e}")),
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            exit_code = ?output.status.code(),
            stdout_bytes = output.stdout.len(),
            stderr_bytes = output.stderr.len(),
            "Command exited"
        );

        if output.status.success() {
            ExecutionOutcome::success()
        } else {
            let stderr_tail = tail(&stderr, STDERR_TAIL_CHARS);
            let reason = if stderr_tail.is_empty() {
                format!("command failed: {}", output.status)
            } else {
                format!("command failed: {}: {stderr_tail}", output.status)
            };
            ExecutionOutcome::failure(reason).with_exit_code(output.status.code())
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn zero_exit_is_success() {
        let outcome = ShellExecutor::new().execute("true").await;
        assert!(outcome.is_success());
        assert_eq!(outcome.exit_code, Some(0));
    }

    #[rstest]
    #[case("exit 1", 1)]
    #[case("exit 7", 7)]
    #[case("false", 1)]
    #[tokio::test]
    async fn non_zero_exit_is_failure(#[case] command: &str, #[case] code: i32) {
        let outcome = ShellExecutor::new().execute(command).await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code, Some(code));
        assert!(outcome.reason.is_some());
    }

    #[tokio::test]
    async fn unknown_command_is_failure_with_stderr_in_reason() {
        let outcome = ShellExecutor::new()
            .execute("definitely-not-a-real-command-queuectl")
            .await;
        assert!(!outcome.is_success());
        assert_eq!(outcome.exit_code, Some(127));
        let reason = outcome.reason.unwrap();
        assert!(reason.contains("not found"), "reason was {reason}");
    }

    #[tokio::test]
    async fn stdout_is_not_part_of_the_failure_reason() {
        let outcome = ShellExecutor::new()
            .execute("echo noise; echo boom >&2; exit 3")
            .await;
        assert_eq!(outcome.exit_code, Some(3));
        let reason = outcome.reason.unwrap();
        assert!(reason.ends_with("boom"), "reason was {reason}");
        assert!(!reason.contains("noise"), "reason was {reason}");
    }

    #[rstest]
    #[case("  hello  ", 3, "llo")]
    #[case("hi", 10, "hi")]
    #[case("héllo", 4, "éllo")]
    #[case("abc", 0, "")]
    fn tail_keeps_the_last_chars(#[case] s: &str, #[case] n: usize, #[case] want: &str) {
        assert_eq!(tail(s, n), want);
    }
}
