//! Host process execution shared by the Docker engine and git checkout.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CiError, Result};

/// Result of a command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// Step name.
    pub step: String,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ExecOutput {
    /// Whether the command exited with code 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into [`CiError::ExecFailed`].
    ///
    /// The error carries the tail of stdout followed by the tail of stderr;
    /// `go test` and golangci-lint report failures on stdout.
    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            return Ok(self);
        }

        let output = [tail(&self.stdout, 40), tail(&self.stderr, 40)]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Err(CiError::ExecFailed {
            step: self.step,
            exit_code: self.exit_code,
            output,
        })
    }
}

/// Runs host commands with an optional timeout and cooperative cancellation.
pub struct CommandRunner;

impl CommandRunner {
    /// Execute `argv` and capture its output.
    ///
    /// A non-zero exit is reported through [`ExecOutput::exit_code`], not as
    /// an error. Timeouts and cancellation kill the child process.
    pub async fn execute(
        step: &str,
        argv: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<ExecOutput> {
        let start = Instant::now();

        let (exe, args) = argv
            .split_first()
            .ok_or_else(|| CiError::Engine(format!("step {step} has empty command")))?;

        debug!(step, command = %argv.join(" "), "spawning command");

        let mut command = Command::new(exe);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        let child = command.spawn()?;

        let wait = child.wait_with_output();
        let output = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(CiError::Cancelled { step: step.to_string() });
            }
            output = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                        CiError::Timeout {
                            step: step.to_string(),
                            timeout_secs: limit.as_secs(),
                        }
                    }),
                    None => Ok(wait.await),
                }
            } => output??,
        };

        Ok(ExecOutput {
            step: step.to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Last `max_lines` lines of `text`.
fn tail(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exec_output_passed() {
        let output = ExecOutput {
            step: "build".to_string(),
            exit_code: 0,
            stdout: "".to_string(),
            stderr: "".to_string(),
            duration_ms: 100,
        };
        assert!(output.passed());
        assert!(output.into_result().is_ok());
    }

    #[test]
    fn test_exec_output_failed_into_error() {
        let output = ExecOutput {
            step: "test".to_string(),
            exit_code: 2,
            stdout: "".to_string(),
            stderr: "FAIL\tgithub.com/demo\n".to_string(),
            duration_ms: 100,
        };
        match output.into_result() {
            Err(CiError::ExecFailed {
                step,
                exit_code,
                output,
            }) => {
                assert_eq!(step, "test");
                assert_eq!(exit_code, 2);
                assert!(output.contains("FAIL"));
            }
            other => panic!("expected ExecFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_output_keeps_stdout_then_stderr() {
        let output = ExecOutput {
            step: "lint".to_string(),
            exit_code: 1,
            stdout: "main.go:3:2: unused variable\n".to_string(),
            stderr: "level=error msg=\"issues found\"\n".to_string(),
            duration_ms: 10,
        };
        match output.into_result() {
            Err(CiError::ExecFailed { output, .. }) => assert_eq!(
                output,
                "main.go:3:2: unused variable\nlevel=error msg=\"issues found\""
            ),
            other => panic!("expected ExecFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failure_reported_on_stdout_is_kept() {
        let cancel = CancellationToken::new();
        let err = CommandRunner::execute(
            "test",
            &argv(&["sh", "-c", "echo '--- FAIL: TestHello (0.00s)'; exit 1"]),
            None,
            None,
            &cancel,
        )
        .await
        .unwrap()
        .into_result()
        .unwrap_err();

        assert!(err.to_string().contains("--- FAIL: TestHello (0.00s)"));
        assert_eq!(err.step(), Some("test"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc\n", 2), "b\nc");
        assert_eq!(tail("a", 5), "a");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let cancel = CancellationToken::new();
        let output = CommandRunner::execute("echo", &argv(&["echo", "hello"]), None, None, &cancel)
            .await
            .expect("execute failed");
        assert!(output.passed());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_execute_failing_command() {
        let cancel = CancellationToken::new();
        let output = CommandRunner::execute("false", &argv(&["false"]), None, None, &cancel)
            .await
            .expect("execute failed");
        assert!(!output.passed());
    }

    #[tokio::test]
    async fn test_execute_empty_command() {
        let cancel = CancellationToken::new();
        let err = CommandRunner::execute("empty", &[], None, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CiError::Engine(_)));
    }

    #[tokio::test]
    async fn test_execute_times_out() {
        let cancel = CancellationToken::new();
        let err = CommandRunner::execute(
            "sleep",
            &argv(&["sleep", "5"]),
            None,
            Some(Duration::from_millis(100)),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CiError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_execute_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = CommandRunner::execute("sleep", &argv(&["sleep", "5"]), None, None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, CiError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_execute_in_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let cancel = CancellationToken::new();
        let output = CommandRunner::execute("ls", &argv(&["ls"]), Some(dir.path()), None, &cancel)
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }
}
