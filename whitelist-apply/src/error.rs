//! Error types for settings and service setup

use std::path::PathBuf;
use thiserror::Error;
use whitelist_core::WhitelistError;

pub type Result<T> = std::result::Result<T, ApplyError>;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Failed to load settings from {path}: {source}")]
    SettingsLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse settings: {0}")]
    SettingsParse(#[from] toml::de::Error),

    #[error("Failed to read template {path}: {source}")]
    TemplateLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Whitelist(#[from] WhitelistError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
