//! The operations behind the dashboard and CLI
//!
//! [`WhitelistService`] ties the group store, generator, coordinator and
//! inspector to one live configuration file.

use crate::command::{CommandRunner, SystemCommandRunner};
use crate::config::{ConfigLoader, Settings};
use crate::coordinator::{ApplyResult, ReloadCoordinator};
use crate::error::Result;
use crate::nginx::{NginxControl, TestResult};
use crate::status::{ConfigStatus, StatusInspector};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use whitelist_core::{
    reconcile_ids, ConfigGenerator, ConfigParser, GroupStore, GroupValidator, RuleState,
    Template, TomlGroupStore, WhitelistGroup,
};

/// Configuration text for the editor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigView {
    pub config: String,
    /// The live file is missing and `config` is the template
    pub is_template: bool,
}

pub struct WhitelistService {
    config_path: PathBuf,
    template: Template,
    generator: ConfigGenerator,
    store: Arc<dyn GroupStore>,
    coordinator: ReloadCoordinator,
    inspector: StatusInspector,
}

impl WhitelistService {
    pub fn new(
        settings: &Settings,
        template: Template,
        store: Arc<dyn GroupStore>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        let nginx = NginxControl::new(runner, settings.nginx.clone());
        let generator = ConfigGenerator::new(settings.rules.scheme)
            .with_pair_warning_threshold(settings.rules.pair_warning_threshold);

        Self {
            config_path: settings.nginx.config_path.clone(),
            template,
            generator,
            store,
            coordinator: ReloadCoordinator::new(nginx.clone(), settings.backup.retention()),
            inspector: StatusInspector::new(nginx),
        }
    }

    /// Build a service that runs real commands and persists groups to
    /// `dashboard.groups_file`
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let template = ConfigLoader::load_template(settings)?;
        let store = TomlGroupStore::open(&settings.dashboard.groups_file)?;
        Ok(Self::new(
            settings,
            template,
            Arc::new(store),
            Arc::new(SystemCommandRunner),
        ))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn generator(&self) -> &ConfigGenerator {
        &self.generator
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn store(&self) -> &dyn GroupStore {
        self.store.as_ref()
    }

    pub async fn status(&self) -> ConfigStatus {
        self.inspector.status(&self.config_path).await
    }

    /// The live configuration, or the template when there is none yet
    pub async fn current_config(&self) -> Result<ConfigView> {
        match fs::read_to_string(&self.config_path).await {
            Ok(config) => Ok(ConfigView {
                config,
                is_template: false,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigView {
                config: self.template.as_str().to_string(),
                is_template: true,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn validate(&self, text: &str) -> TestResult {
        self.coordinator.validate(text).await
    }

    /// Validate and write `text` to `path`, or to the live file
    pub async fn save(&self, text: &str, path: Option<&Path>) -> ApplyResult {
        let target = path.unwrap_or(&self.config_path);
        self.coordinator.save(text, target).await
    }

    pub async fn reload(&self) -> TestResult {
        self.coordinator.reload().await
    }

    /// Validate, write and reload the live file
    pub async fn apply(&self, text: &str) -> ApplyResult {
        self.coordinator.apply(text, &self.config_path).await
    }

    /// Groups as the live file describes them
    ///
    /// Parsed groups get their ids and descriptions back from the store, and
    /// disabled groups, which generated text omits, are appended from it.
    /// Without generated rules on disk the store is returned as is.
    pub async fn groups(&self) -> Result<Vec<WhitelistGroup>> {
        let known = self.store.list();
        let text = match fs::read_to_string(&self.config_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(known),
            Err(e) => return Err(e.into()),
        };

        let parsed = ConfigParser::inspect(&text);
        match parsed.state {
            RuleState::Absent | RuleState::Unsubstituted => {
                tracing::debug!("No generated rules in {:?}, using stored groups", self.config_path);
                return Ok(known);
            }
            RuleState::Generated | RuleState::Empty => {}
        }
        if let Some(scheme) = parsed.scheme {
            if scheme != self.generator.scheme() {
                tracing::warn!(
                    "{:?} uses the {} scheme but {} is configured",
                    self.config_path,
                    scheme,
                    self.generator.scheme()
                );
            }
        }

        // Only enabled groups are rendered, so only they can match by name
        let enabled: Vec<WhitelistGroup> = known.iter().filter(|g| g.enabled).cloned().collect();
        let mut groups = parsed.groups;
        reconcile_ids(&mut groups, &enabled);
        for group in known {
            if !group.enabled && !groups.iter().any(|g| g.id == group.id) {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    /// Render `groups` into the template
    pub fn generate(&self, groups: &[WhitelistGroup]) -> Result<String> {
        Ok(self.generator.generate(groups, self.template.as_str())?)
    }

    /// Replace the whole group set: validate, generate, apply, then persist
    ///
    /// The store is only updated once the new file has been written. A store
    /// failure after that point is reported in `store_error`, since the file
    /// on disk has already changed.
    pub async fn set_groups(&self, groups: Vec<WhitelistGroup>) -> Result<ApplyResult> {
        GroupValidator::validate(&groups)?;
        let text = self.generate(&groups)?;
        let mut result = self.apply(&text).await;

        if result.success {
            if let Err(e) = self.store.replace_all(groups) {
                tracing::warn!("Configuration written but group store not updated: {}", e);
                result.store_error = Some(e.to_string());
            }
        }
        Ok(result)
    }
}

impl std::fmt::Debug for WhitelistService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhitelistService")
            .field("config_path", &self.config_path)
            .field("generator", &self.generator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mock::{test_failed, MockRunner};
    use crate::command::CommandOutput;
    use crate::coordinator::ApplyOutcome;
    use tempfile::TempDir;
    use whitelist_core::{MemoryGroupStore, WhitelistError};

    fn service(dir: &TempDir, runner: MockRunner) -> WhitelistService {
        let mut settings = Settings::default();
        settings.nginx.config_path = dir.path().join("nginx.conf");
        WhitelistService::new(
            &settings,
            Template::builtin(),
            Arc::new(MemoryGroupStore::new()),
            Arc::new(runner),
        )
    }

    fn office() -> WhitelistGroup {
        let mut group = WhitelistGroup::with_id("office", "Office");
        group.description = "Head office".to_string();
        group.add_client("10.0.0.0/24");
        group.add_destination("example.com");
        group
    }

    #[tokio::test]
    async fn test_current_config_falls_back_to_template() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::healthy());

        let view = service.current_config().await.unwrap();
        assert!(view.is_template);
        assert!(view.config.contains("{{WHITELIST_RULES}}"));

        std::fs::write(service.config_path(), "live").unwrap();
        let view = service.current_config().await.unwrap();
        assert!(!view.is_template);
        assert_eq!(view.config, "live");
    }

    #[tokio::test]
    async fn test_set_groups_round_trip() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::healthy());

        let mut lab = WhitelistGroup::with_id("lab", "Lab");
        lab.set_enabled(false);
        lab.add_client("10.1.0.1");
        lab.add_destination("lab.example.com");

        let result = service.set_groups(vec![office(), lab.clone()]).await.unwrap();
        assert_eq!(result.outcome, ApplyOutcome::Applied);

        let written = std::fs::read_to_string(service.config_path()).unwrap();
        assert!(written.contains("# Group: Office"));
        assert!(!written.contains("# Group: Lab"));

        let groups = service.groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "office");
        assert_eq!(groups[0].description, "Head office");
        assert_eq!(groups[1], lab);
    }

    #[tokio::test]
    async fn test_rejected_groups_not_persisted() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::new(test_failed(), CommandOutput::default()));

        let result = service.set_groups(vec![office()]).await.unwrap();
        assert!(!result.success);
        assert!(service.store().list().is_empty());
        assert!(!service.config_path().exists());
    }

    #[tokio::test]
    async fn test_invalid_groups_are_errors() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::healthy());

        let mut bad = office();
        bad.add_destination("http://example.com/");
        let err = service.set_groups(vec![bad]).await.unwrap_err();
        assert!(matches!(
            err,
            crate::ApplyError::Whitelist(WhitelistError::Validation(_))
        ));
    }

    struct ReadOnlyStore;

    impl GroupStore for ReadOnlyStore {
        fn list(&self) -> Vec<WhitelistGroup> {
            Vec::new()
        }

        fn get(&self, _id: &str) -> Option<WhitelistGroup> {
            None
        }

        fn upsert(&self, _group: WhitelistGroup) -> whitelist_core::Result<()> {
            Err(std::io::Error::other("read-only").into())
        }

        fn delete(&self, id: &str) -> whitelist_core::Result<WhitelistGroup> {
            Err(WhitelistError::GroupNotFound {
                group: id.to_string(),
            })
        }

        fn replace_all(&self, _groups: Vec<WhitelistGroup>) -> whitelist_core::Result<()> {
            Err(std::io::Error::other("read-only").into())
        }
    }

    #[tokio::test]
    async fn test_store_failure_after_apply_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.nginx.config_path = dir.path().join("nginx.conf");
        let service = WhitelistService::new(
            &settings,
            Template::builtin(),
            Arc::new(ReadOnlyStore),
            Arc::new(MockRunner::healthy()),
        );

        let result = service.set_groups(vec![office()]).await.unwrap();
        assert!(result.success);
        assert!(result.reloaded);
        assert_eq!(result.outcome, ApplyOutcome::Applied);
        assert!(result.store_error.as_deref().unwrap().contains("read-only"));
        assert_eq!(result.error(), result.store_error.as_deref());
        assert!(service.config_path().exists());
    }

    #[tokio::test]
    async fn test_disabled_group_sharing_a_name() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::healthy());

        let mut old = WhitelistGroup::with_id("old-office", "Office");
        old.set_enabled(false);
        old.add_client("10.9.9.9");
        old.add_destination("old.example.com");
        let mut current = office();
        current.id = "new-office".to_string();

        let result = service.set_groups(vec![old.clone(), current]).await.unwrap();
        assert_eq!(result.outcome, ApplyOutcome::Applied);

        let groups = service.groups().await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "new-office");
        assert!(groups[0].enabled);
        assert_eq!(groups[1], old);
    }

    #[tokio::test]
    async fn test_groups_from_hand_written_file() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, MockRunner::healthy());
        service.store().upsert(office()).unwrap();
        std::fs::write(service.config_path(), "events {}\nhttp {}\n").unwrap();

        let groups = service.groups().await.unwrap();
        assert_eq!(groups, vec![office()]);
    }
}
