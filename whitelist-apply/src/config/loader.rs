//! Settings file lookup and loading

use super::schema::Settings;
use crate::error::{ApplyError, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use whitelist_core::Template;

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV_VAR: &str = "NGINX_WHITELIST_CONFIG";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Find the settings file by checking environment and standard locations
    pub fn find_settings_file() -> Option<PathBuf> {
        // 1. $NGINX_WHITELIST_CONFIG
        if let Ok(path) = env::var(CONFIG_ENV_VAR) {
            let p = expand_home(Path::new(&path));
            if p.exists() {
                return Some(p);
            }
        }

        // 2. $XDG_CONFIG_HOME/nginx-whitelist/config.toml
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            let p = PathBuf::from(xdg).join("nginx-whitelist/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        // 3. ~/.config/nginx-whitelist/config.toml
        if let Ok(home) = env::var("HOME") {
            let p = PathBuf::from(home).join(".config/nginx-whitelist/config.toml");
            if p.exists() {
                return Some(p);
            }
        }

        None
    }

    /// Load settings from a file, expanding `~/` in paths
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ApplyError::SettingsLoad {
            path: path.to_path_buf(),
            source,
        })?;

        let mut settings: Settings = toml::from_str(&contents)?;
        Self::expand_paths(&mut settings);
        Ok(settings)
    }

    /// Load settings with full priority order
    /// Priority: explicit > environment > XDG > home > built-in defaults
    pub fn load_or_default(explicit: Option<PathBuf>) -> Result<Settings> {
        if let Some(path) = explicit {
            tracing::debug!("Loading explicit settings from {:?}", path);
            return Self::load_from_file(expand_home(&path));
        }

        match Self::find_settings_file() {
            Some(path) => {
                tracing::debug!("Loading settings from {:?}", path);
                Self::load_from_file(&path)
            }
            None => {
                tracing::debug!("No settings file found, using defaults");
                let mut settings = Settings::default();
                Self::expand_paths(&mut settings);
                Ok(settings)
            }
        }
    }

    /// Load the configured template, or the built-in one
    pub fn load_template(settings: &Settings) -> Result<Template> {
        match &settings.nginx.template_path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ApplyError::TemplateLoad {
                    path: path.clone(),
                    source,
                })?;
                tracing::debug!("Loaded template from {:?}", path);
                Ok(Template::new(text))
            }
            None => Ok(Template::builtin()),
        }
    }

    fn expand_paths(settings: &mut Settings) {
        settings.nginx.config_path = expand_home(&settings.nginx.config_path);
        settings.nginx.template_path = settings.nginx.template_path.as_deref().map(expand_home);
        settings.nginx.validation_dir = settings.nginx.validation_dir.as_deref().map(expand_home);
        settings.dashboard.groups_file = expand_home(&settings.dashboard.groups_file);
    }
}

/// Replace a leading `~/` with `$HOME`
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
