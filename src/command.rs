//! Shell command execution
//!
//! Every external effect in the harness is a single shell command line:
//! `kubectl`, `gcloud` and `curl` are opaque tools driven through `sh -c`.
//! Callers are responsible for shell-escaping. Retry belongs to
//! [`crate::poll`], never to this layer.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::{Error, Result};

/// Captured result of one external command.
///
/// Carries an explicit success flag instead of a positional tuple so callers
/// that require success have to say so (see [`CommandOutput::require_success`]).
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Stdout split on newlines, with empty lines removed. Callers must not
    /// rely on blank-line-delimited structure in command output.
    pub lines: Vec<String>,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Trimmed stderr, kept for failure diagnostics.
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into an error carrying the command and stderr.
    pub fn require_success(self, command: &str) -> Result<CommandOutput> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::command_failed(command, self.stderr.clone()))
        }
    }

    /// First captured output line, if any.
    pub fn first_line(&self) -> Option<&str> {
        self.lines.first().map(String::as_str)
    }
}

/// Run a command line through the shell and capture its output.
///
/// Never judges success; the caller checks the flag (or uses
/// [`run_checked`]). An `Err` here means the shell itself could not be
/// spawned, not that the command exited non-zero.
pub async fn run(command: &str) -> Result<CommandOutput> {
    debug!(command, "executing");

    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if !output.status.success() {
        debug!(command, stderr = %stderr, "command exited non-zero");
    }

    let lines = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    Ok(CommandOutput {
        lines,
        success: output.status.success(),
        stderr,
    })
}

/// Like [`run`], with a progress marker logged before the command starts.
pub async fn run_labeled(command: &str, label: &str) -> Result<CommandOutput> {
    info!("{}", label);
    run(command).await
}

/// Run a command that must succeed; a non-zero exit is an error.
pub async fn run_checked(command: &str) -> Result<CommandOutput> {
    run(command).await?.require_success(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_output_lines() {
        let out = run("echo one && echo two").await.expect("spawn");
        assert!(out.success);
        assert_eq!(out.lines, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_drops_empty_lines() {
        let out = run("printf 'a\\n\\n\\nb\\n'").await.expect("spawn");
        assert_eq!(out.lines, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_reports_non_zero_exit() {
        let out = run("exit 3").await.expect("spawn");
        assert!(!out.success);
        assert!(out.lines.is_empty());
    }

    #[tokio::test]
    async fn test_captures_stderr_for_diagnostics() {
        let out = run("echo oops >&2; exit 1").await.expect("spawn");
        assert!(!out.success);
        assert_eq!(out.stderr, "oops");
    }

    #[tokio::test]
    async fn test_require_success_passes_through_output() {
        let out = run_checked("echo fine").await.expect("should succeed");
        assert_eq!(out.first_line(), Some("fine"));
    }

    #[tokio::test]
    async fn test_require_success_surfaces_failure() {
        let err = run_checked("echo broken >&2; exit 1")
            .await
            .expect_err("should fail");
        match err {
            Error::CommandFailed { command, detail } => {
                assert!(command.contains("exit 1"));
                assert_eq!(detail, "broken");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }
}
