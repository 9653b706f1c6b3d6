//! Driving the nginx binary: config tests, reloads and process presence

use crate::command::{CommandOutput, CommandRunner};
use crate::config::NginxSettings;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

/// Placeholder in `test_args` replaced by the file under test
pub const PATH_ARG: &str = "{path}";

/// Outcome of a check that either passes or carries a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestResult {
    pub success: bool,
    pub message: String,
}

impl TestResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Runs nginx commands as configured
#[derive(Clone)]
pub struct NginxControl {
    runner: Arc<dyn CommandRunner>,
    settings: NginxSettings,
}

impl NginxControl {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: NginxSettings) -> Self {
        Self { runner, settings }
    }

    pub fn settings(&self) -> &NginxSettings {
        &self.settings
    }

    /// Test the configuration at `path`
    ///
    /// Passes only when the command exits zero and its output contains both
    /// the syntax and test markers.
    pub async fn test_config(&self, path: &Path) -> TestResult {
        let path = path.to_string_lossy();
        let args: Vec<String> = self
            .settings
            .test_args
            .iter()
            .map(|arg| arg.replace(PATH_ARG, &path))
            .collect();

        let output = self.run(&self.settings.binary, &args).await;
        let combined = output.combined();

        if output.success()
            && combined.contains(&self.settings.syntax_ok_marker)
            && combined.contains(&self.settings.test_successful_marker)
        {
            TestResult::ok(combined)
        } else {
            tracing::debug!("Config test failed for {}: {}", path, combined);
            TestResult::failed(combined)
        }
    }

    /// Ask the running server to reload its configuration
    pub async fn reload(&self) -> CommandOutput {
        self.run(&self.settings.binary, &self.settings.reload_args).await
    }

    /// Whether a process named `process_name` is running. Query failures count as not running.
    pub async fn is_running(&self) -> bool {
        let args = vec!["-x".to_string(), self.settings.process_name.clone()];
        self.run(&self.settings.process_query, &args).await.success()
    }

    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        self.runner
            .run(program, args, self.settings.command_timeout())
            .await
    }
}

impl std::fmt::Debug for NginxControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NginxControl")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
