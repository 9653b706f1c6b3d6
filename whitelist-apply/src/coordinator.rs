//! Validate, back up, write and reload
//!
//! An apply moves through the phases of [`ApplyPhase`] strictly in order:
//! the candidate is tested out of place, the live file is backed up and
//! overwritten, then nginx is reloaded. A rejected candidate never touches
//! the live file, and a failed reload leaves the new file saved but not live.

use crate::backup::{self, RetentionPolicy};
use crate::nginx::{NginxControl, TestResult};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use tracing::{info, warn};

/// Steps of an apply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Validating,
    BackingUp,
    Writing,
    Reloading,
}

impl std::fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ApplyPhase::Validating => "validating",
            ApplyPhase::BackingUp => "backing up",
            ApplyPhase::Writing => "writing",
            ApplyPhase::Reloading => "reloading",
        };
        f.write_str(name)
    }
}

/// How far an apply or save got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ApplyOutcome {
    /// The config test failed; nothing was touched
    Rejected,
    /// Backup or write failed after validation
    WriteFailed,
    /// Written without a reload being requested
    Saved,
    /// Written, but the reload failed
    SavedNotLive,
    /// Written and reloaded
    Applied,
}

/// Result of [`ReloadCoordinator::apply`] and [`ReloadCoordinator::save`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    /// The new configuration was written
    pub success: bool,
    /// The server is running the new configuration
    pub reloaded: bool,
    pub message: String,
    pub outcome: ApplyOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_error: Option<String>,
    /// The file was written but the group store could not be updated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_error: Option<String>,
}

impl ApplyResult {
    fn rejected(message: String) -> Self {
        Self {
            success: false,
            reloaded: false,
            message,
            outcome: ApplyOutcome::Rejected,
            backup_path: None,
            reload_error: None,
            store_error: None,
        }
    }

    fn write_failed(message: String, backup_path: Option<PathBuf>) -> Self {
        Self {
            success: false,
            reloaded: false,
            message,
            outcome: ApplyOutcome::WriteFailed,
            backup_path,
            reload_error: None,
            store_error: None,
        }
    }

    /// Error text for callers that only report failures
    pub fn error(&self) -> Option<&str> {
        if !self.success {
            Some(&self.message)
        } else {
            self.reload_error.as_deref().or(self.store_error.as_deref())
        }
    }
}

/// Serializes changes to each configuration file
///
/// Applies to the same path run one at a time; different paths do not
/// block each other.
#[derive(Debug)]
pub struct ReloadCoordinator {
    nginx: NginxControl,
    retention: RetentionPolicy,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ReloadCoordinator {
    pub fn new(nginx: NginxControl, retention: RetentionPolicy) -> Self {
        Self {
            nginx,
            retention,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn nginx(&self) -> &NginxControl {
        &self.nginx
    }

    fn lock_for(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(key).or_default().clone()
    }

    /// Test `text` as a configuration without touching any live file
    pub async fn validate(&self, text: &str) -> TestResult {
        let mut builder = tempfile::Builder::new();
        builder.prefix("nginx-whitelist-").suffix(".conf");
        let candidate = match &self.nginx.settings().validation_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let candidate = match candidate {
            Ok(file) => file,
            Err(e) => return TestResult::failed(format!("failed to create candidate file: {}", e)),
        };

        if let Err(e) = fs::write(candidate.path(), text).await {
            return TestResult::failed(format!(
                "failed to write candidate file {}: {}",
                candidate.path().display(),
                e
            ));
        }

        self.nginx.test_config(candidate.path()).await
    }

    /// Validate, back up and write `text` to `target` without reloading
    pub async fn save(&self, text: &str, target: &Path) -> ApplyResult {
        let lock = self.lock_for(target);
        let _guard = lock.lock().await;
        self.save_locked(text, target).await
    }

    /// Reload the server with whatever configuration is on disk
    pub async fn reload(&self) -> TestResult {
        info!("Phase: {}", ApplyPhase::Reloading);
        let output = self.nginx.reload().await;
        if output.success() {
            TestResult::ok("reloaded")
        } else {
            let error = output.combined();
            warn!("Reload failed: {}", error);
            TestResult::failed(error)
        }
    }

    /// Validate, back up, write and reload
    pub async fn apply(&self, text: &str, target: &Path) -> ApplyResult {
        let lock = self.lock_for(target);
        let _guard = lock.lock().await;

        let mut result = self.save_locked(text, target).await;
        if !result.success {
            return result;
        }

        let reload = self.reload().await;
        if reload.success {
            info!("Applied configuration to {:?}", target);
            result.reloaded = true;
            result.outcome = ApplyOutcome::Applied;
            result.message = "configuration applied and reloaded".to_string();
        } else {
            result.outcome = ApplyOutcome::SavedNotLive;
            result.message = "configuration saved but reload failed".to_string();
            result.reload_error = Some(reload.message);
        }
        result
    }

    async fn save_locked(&self, text: &str, target: &Path) -> ApplyResult {
        info!("Phase: {} ({:?})", ApplyPhase::Validating, target);
        let validation = self.validate(text).await;
        if !validation.success {
            warn!("Rejected configuration for {:?}", target);
            return ApplyResult::rejected(validation.message);
        }

        info!("Phase: {}", ApplyPhase::BackingUp);
        let now = Utc::now();
        let backup_path = match backup::create_backup(target, now).await {
            Ok(path) => path,
            Err(e) => {
                return ApplyResult::write_failed(
                    format!("failed to back up {}: {}", target.display(), e),
                    None,
                )
            }
        };
        match backup::prune_backups(target, self.retention, now).await {
            Ok(removed) if !removed.is_empty() => {
                tracing::debug!("Pruned {} old backups", removed.len())
            }
            Ok(_) => {}
            Err(e) => warn!("Failed to prune backups of {:?}: {}", target, e),
        }

        info!("Phase: {}", ApplyPhase::Writing);
        if let Err(e) = write_config(target, text).await {
            let mut message = format!("failed to write {}: {}", target.display(), e);
            if let Some(path) = &backup_path {
                message.push_str(&format!(" (previous configuration in {})", path.display()));
            }
            return ApplyResult::write_failed(message, backup_path);
        }

        ApplyResult {
            success: true,
            reloaded: false,
            message: "configuration saved".to_string(),
            outcome: ApplyOutcome::Saved,
            backup_path,
            reload_error: None,
            store_error: None,
        }
    }
}

async fn write_config(target: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(target, text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{test_failed, MockRunner};
    use crate::command::CommandOutput;
    use crate::config::NginxSettings;
    use tempfile::TempDir;

    fn coordinator(runner: MockRunner) -> (ReloadCoordinator, Arc<MockRunner>) {
        let runner = Arc::new(runner);
        let nginx = NginxControl::new(runner.clone(), NginxSettings::default());
        (
            ReloadCoordinator::new(nginx, RetentionPolicy::default()),
            runner,
        )
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".bak-"))
            .collect()
    }

    #[tokio::test]
    async fn test_apply_success() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nginx.conf");
        std::fs::write(&target, "old").unwrap();

        let (coordinator, runner) = coordinator(MockRunner::healthy());
        let result = coordinator.apply("new", &target).await;

        assert!(result.success);
        assert!(result.reloaded);
        assert_eq!(result.outcome, ApplyOutcome::Applied);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");

        let backup = result.backup_path.unwrap();
        assert_eq!(std::fs::read_to_string(backup).unwrap(), "old");
        assert_eq!(runner.call_count("-s"), 1);
    }

    #[tokio::test]
    async fn test_validation_is_out_of_place() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nginx.conf");

        let (coordinator, runner) = coordinator(MockRunner::healthy());
        coordinator.apply("candidate text", &target).await;

        let candidates = runner.candidates.lock().unwrap();
        assert_eq!(candidates.len(), 1);
        assert_ne!(candidates[0].0, target);
        assert_eq!(candidates[0].1, "candidate text");
        // The throwaway file is gone afterwards
        assert!(!candidates[0].0.exists());
    }

    #[tokio::test]
    async fn test_rejected_leaves_target_untouched() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nginx.conf");
        std::fs::write(&target, "old").unwrap();

        let (coordinator, runner) = coordinator(MockRunner::new(test_failed(), CommandOutput::default()));
        let result = coordinator.apply("bogus;", &target).await;

        assert!(!result.success);
        assert!(!result.reloaded);
        assert_eq!(result.outcome, ApplyOutcome::Rejected);
        assert!(result.message.contains("unknown directive"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "old");
        assert!(backups_in(dir.path()).is_empty());
        assert_eq!(runner.call_count("-s"), 0);
    }

    #[tokio::test]
    async fn test_reload_failure_is_saved_not_live() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nginx.conf");

        let (coordinator, _) = coordinator(MockRunner::new(
            crate::command::mock::test_ok(),
            CommandOutput::exited(1, "", "nginx: [error] invalid PID number"),
        ));
        let result = coordinator.apply("new", &target).await;

        assert!(result.success);
        assert!(!result.reloaded);
        assert_eq!(result.outcome, ApplyOutcome::SavedNotLive);
        assert!(result.reload_error.as_deref().unwrap().contains("invalid PID"));
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        // Nothing existed before, so nothing was backed up
        assert_eq!(result.backup_path, None);
    }

    #[tokio::test]
    async fn test_save_creates_parents_without_reload() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/nginx.conf");

        let (coordinator, runner) = coordinator(MockRunner::healthy());
        let result = coordinator.save("new", &target).await;

        assert!(result.success);
        assert!(!result.reloaded);
        assert_eq!(result.outcome, ApplyOutcome::Saved);
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(runner.call_count("-s"), 0);
    }

    #[tokio::test]
    async fn test_write_failure() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be overwritten with a file
        let target = dir.path().join("conf.d");
        std::fs::create_dir(&target).unwrap();

        let (coordinator, _) = coordinator(MockRunner::healthy());
        let result = coordinator.save("new", &target).await;
        assert!(!result.success);
        assert_eq!(result.outcome, ApplyOutcome::WriteFailed);
    }

    #[tokio::test]
    async fn test_concurrent_applies_same_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("nginx.conf");
        let (coordinator, _) = coordinator(MockRunner::healthy());

        let (a, b) = tokio::join!(
            coordinator.apply("first", &target),
            coordinator.apply("second", &target)
        );
        assert!(a.success && b.success);
        let contents = std::fs::read_to_string(&target).unwrap();
        assert!(contents == "first" || contents == "second");
        // The second apply backed up the first one's output
        assert_eq!(backups_in(dir.path()).len(), 1);
    }

    #[test]
    fn test_result_json() {
        let result = ApplyResult::rejected("bad".to_string());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["outcome"], "rejected");
        assert!(json.get("backupPath").is_none());
        assert_eq!(result.error(), Some("bad"));
    }
}
