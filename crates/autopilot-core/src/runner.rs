//! Command execution at the external process boundary.
//!
//! Every process Autopilot spawns (test suite, dependency audit, fixer,
//! version-control checkout, reinstall) goes through a [`CommandRunner`].
//! A non-zero exit is a normal [`CommandResult`]; only environment-level
//! failures surface as [`RunnerError`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::domain::RunnerError;

/// Exit status `sh` uses when the requested program does not exist.
const SHELL_NOT_FOUND: i32 = 127;

/// Per-invocation options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory; the runner's default root when `None`.
    pub cwd: Option<PathBuf>,

    /// Timeout in seconds; the runner's default when `None`, disabled when 0.
    pub timeout_secs: Option<u64>,
}

impl RunOptions {
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            timeout_secs: None,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

/// Result of one command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// The command line as invoked.
    pub command: String,

    /// True iff the process exited with status 0.
    pub exit_success: bool,

    /// Exit code, `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandResult {
    /// A successful result with the given stdout.
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            duration_ms: 0,
        }
    }

    /// A failed result (exit code 1) with the given stderr.
    pub fn failure(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            exit_success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
            duration_ms: 0,
        }
    }

    /// Set stdout, keeping the exit status.
    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    /// Stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, _) => self.stderr.clone(),
            (false, true) => self.stdout.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Executes command lines and reports their outcome.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion.
    async fn run(&self, command: &str, options: &RunOptions)
        -> Result<CommandResult, RunnerError>;
}

/// Runs command lines through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    root: PathBuf,
    default_timeout_secs: u64,
}

impl ShellRunner {
    /// Create a runner rooted at `root`. A `default_timeout_secs` of 0
    /// disables the timeout.
    pub fn new(root: impl Into<PathBuf>, default_timeout_secs: u64) -> Self {
        Self {
            root: root.into(),
            default_timeout_secs,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<CommandResult, RunnerError> {
        let start = Instant::now();

        if command.trim().is_empty() {
            return Err(RunnerError::EmptyCommand);
        }

        let cwd = options.cwd.as_deref().unwrap_or(&self.root);
        let timeout_secs = options.timeout_secs.unwrap_or(self.default_timeout_secs);

        debug!(command = %command, cwd = %cwd.display(), "Running command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunnerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let output = if timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
                .await
                .map_err(|_| RunnerError::Timeout {
                    command: command.to_string(),
                    timeout_secs,
                })?
        } else {
            child.wait_with_output().await
        }
        .map_err(|source| RunnerError::Spawn {
            command: command.to_string(),
            source,
        })?;

        let exit_code = output.status.code();
        if exit_code == Some(SHELL_NOT_FOUND) {
            return Err(RunnerError::NotFound {
                command: command.to_string(),
            });
        }

        Ok(CommandResult {
            command: command.to_string(),
            exit_success: output.status.success(),
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(std::env::temp_dir(), 60)
    }

    #[test]
    fn test_combined_output() {
        let result = CommandResult::failure("npm test", "boom").with_stdout("ran 3 tests");
        assert_eq!(result.combined_output(), "ran 3 tests\nboom");
        assert_eq!(CommandResult::success("x", "").combined_output(), "");
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let result = runner()
            .run("echo hello", &RunOptions::default())
            .await
            .expect("execute failed");
        assert!(result.exit_success);
        assert_eq!(result.exit_code, Some(0));
        assert!(result.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_a_result_not_an_error() {
        let result = runner()
            .run("echo partial; echo broken >&2; exit 3", &RunOptions::default())
            .await
            .expect("execute failed");
        assert!(!result.exit_success);
        assert_eq!(result.exit_code, Some(3));
        assert!(result.stdout.contains("partial"));
        assert!(result.stderr.contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let err = runner()
            .run("definitely-not-a-real-binary-xyz", &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = runner()
            .run("sleep 5", &RunOptions::default().with_timeout(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { timeout_secs: 1, .. }));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let err = runner()
            .run("   ", &RunOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::EmptyCommand));
    }

    #[tokio::test]
    async fn test_runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let result = runner()
            .run("cat marker.txt", &RunOptions::in_dir(dir.path()))
            .await
            .expect("execute failed");
        assert_eq!(result.stdout.trim(), "here");
    }
}
