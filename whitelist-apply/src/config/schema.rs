//! Settings schema types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use whitelist_core::RuleScheme;

use crate::backup::RetentionPolicy;

/// Complete settings file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub nginx: NginxSettings,
    #[serde(default)]
    pub rules: RuleSettings,
    #[serde(default)]
    pub backup: BackupSettings,
    #[serde(default)]
    pub dashboard: DashboardSettings,
}

/// How to find and drive nginx
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NginxSettings {
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Live configuration file
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,
    /// Template with placeholders; the built-in template when unset
    #[serde(default)]
    pub template_path: Option<PathBuf>,
    /// Arguments for the config test. `{path}` is replaced by the candidate file.
    #[serde(default = "default_test_args")]
    pub test_args: Vec<String>,
    #[serde(default = "default_reload_args")]
    pub reload_args: Vec<String>,
    /// Program used to check whether nginx is running
    #[serde(default = "default_process_query")]
    pub process_query: String,
    #[serde(default = "default_process_name")]
    pub process_name: String,
    #[serde(default = "default_syntax_ok_marker")]
    pub syntax_ok_marker: String,
    #[serde(default = "default_test_successful_marker")]
    pub test_successful_marker: String,
    /// Where candidate files are written for testing; system temp dir when unset
    #[serde(default)]
    pub validation_dir: Option<PathBuf>,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_binary() -> String {
    "nginx".to_string()
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/nginx.conf")
}

fn default_test_args() -> Vec<String> {
    vec!["-t".to_string(), "-c".to_string(), "{path}".to_string()]
}

fn default_reload_args() -> Vec<String> {
    vec!["-s".to_string(), "reload".to_string()]
}

fn default_process_query() -> String {
    "pgrep".to_string()
}

fn default_process_name() -> String {
    "nginx".to_string()
}

fn default_syntax_ok_marker() -> String {
    "syntax is ok".to_string()
}

fn default_test_successful_marker() -> String {
    "test is successful".to_string()
}

fn default_command_timeout_secs() -> u64 {
    30
}

impl NginxSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl Default for NginxSettings {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            config_path: default_config_path(),
            template_path: None,
            test_args: default_test_args(),
            reload_args: default_reload_args(),
            process_query: default_process_query(),
            process_name: default_process_name(),
            syntax_ok_marker: default_syntax_ok_marker(),
            test_successful_marker: default_test_successful_marker(),
            validation_dir: None,
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

/// Rule generation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSettings {
    #[serde(default)]
    pub scheme: RuleScheme,
    /// Warn when a group expands to more client/destination pairs than this
    #[serde(default = "default_pair_warning_threshold")]
    pub pair_warning_threshold: usize,
}

fn default_pair_warning_threshold() -> usize {
    whitelist_core::render::DEFAULT_PAIR_WARNING_THRESHOLD
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            scheme: RuleScheme::default(),
            pair_warning_threshold: default_pair_warning_threshold(),
        }
    }
}

/// Backup retention
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackupSettings {
    /// Newest backups to keep; 0 keeps all
    #[serde(default = "default_keep")]
    pub keep: usize,
    #[serde(default)]
    pub max_age_days: Option<u64>,
}

fn default_keep() -> usize {
    10
}

impl BackupSettings {
    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            keep: (self.keep > 0).then_some(self.keep),
            max_age: self
                .max_age_days
                .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60))),
        }
    }
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            keep: default_keep(),
            max_age_days: None,
        }
    }
}

/// HTTP dashboard settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Group store holding ids, descriptions and disabled groups
    #[serde(default = "default_groups_file")]
    pub groups_file: PathBuf,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_groups_file() -> PathBuf {
    PathBuf::from("~/.config/nginx-whitelist/groups.toml")
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            groups_file: default_groups_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.nginx.binary, "nginx");
        assert_eq!(settings.nginx.test_args, vec!["-t", "-c", "{path}"]);
        assert_eq!(settings.nginx.command_timeout(), Duration::from_secs(30));
        assert_eq!(settings.rules.scheme, RuleScheme::IfBlock);
        assert_eq!(settings.backup.keep, 10);
    }

    #[test]
    fn test_partial_file() {
        let settings: Settings = toml::from_str(
            r#"
            [nginx]
            config_path = "/srv/nginx/proxy.conf"
            command_timeout_secs = 5

            [rules]
            scheme = "geo-block"
            "#,
        )
        .unwrap();
        assert_eq!(settings.nginx.config_path, PathBuf::from("/srv/nginx/proxy.conf"));
        assert_eq!(settings.nginx.binary, "nginx");
        assert_eq!(settings.rules.scheme, RuleScheme::GeoBlock);
        assert_eq!(settings.dashboard.listen, "127.0.0.1:8080");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: std::result::Result<Settings, _> = toml::from_str("[nginx]\nbinnary = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_example_settings_parse() {
        let settings: Settings = toml::from_str(include_str!("../../settings.example.toml")).unwrap();
        assert_eq!(settings.rules.scheme, RuleScheme::IfBlock);
        assert_eq!(settings.backup.max_age_days, Some(30));
    }

    #[test]
    fn test_retention() {
        let keep_all = BackupSettings {
            keep: 0,
            max_age_days: Some(2),
        }
        .retention();
        assert_eq!(keep_all.keep, None);
        assert_eq!(keep_all.max_age, Some(Duration::from_secs(2 * 86400)));
    }
}
