//! Running external commands with a timeout
//!
//! Every command result is captured as a [`CommandOutput`]. Spawn failures
//! and timeouts are reported in the output rather than as errors, so callers
//! always have something to show the user.

use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    /// Exit status; `None` when the command did not exit on its own
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
    /// Why the command could not be started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spawn_error: Option<String>,
}

impl CommandOutput {
    /// Output of a command that exited with `code`
    pub fn exited(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Output of a command that could not be started
    pub fn spawn_failed(error: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Output of a command killed after `timeout`
    pub fn timed_out(timeout: Duration) -> Self {
        Self {
            timed_out: true,
            stderr: format!("command timed out after {}s", timeout.as_secs()),
            ..Default::default()
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && self.spawn_error.is_none()
    }

    /// Stdout and stderr joined, with spawn failures appended
    pub fn combined(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for part in [self.stdout.trim_end(), self.stderr.trim_end()] {
            if !part.is_empty() {
                parts.push(part);
            }
        }
        let mut text = parts.join("\n");

        if let Some(err) = &self.spawn_error {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(err);
        }
        if text.is_empty() {
            if let Some(code) = self.exit_code {
                text = format!("exited with status {}", code);
            }
        }
        text
    }
}

/// Runs external programs
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> CommandOutput;
}

/// Runs programs on the host with tokio, killing them on timeout
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[String], timeout: Duration) -> CommandOutput {
        tracing::debug!("Running {} {:?}", program, args);

        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to start {}: {}", program, e);
                return CommandOutput::spawn_failed(format!("failed to start {}: {}", program, e));
            }
        };

        // Dropping the future on timeout drops the child, which kills it
        match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                timed_out: false,
                spawn_error: None,
            },
            Ok(Err(e)) => CommandOutput::spawn_failed(format!("failed to wait for {}: {}", program, e)),
            Err(_) => {
                tracing::warn!("{} timed out after {:?}", program, timeout);
                CommandOutput::timed_out(timeout)
            }
        }
    }
}
