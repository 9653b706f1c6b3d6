//! Error types for whitelist operations

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WhitelistError>;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("Group validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Template is missing required placeholder {placeholder} for the {scheme} scheme")]
    TemplateContract {
        placeholder: String,
        scheme: String,
    },

    #[error("Groups {first} and {second} both sanitize to rule token '{token}'")]
    IdCollision {
        token: String,
        first: String,
        second: String,
    },

    #[error("Client {value} in group {group} cannot be expressed by the {scheme} scheme")]
    UnsupportedClient {
        group: String,
        value: String,
        scheme: String,
    },

    #[error("Group not found: {group}")]
    GroupNotFound { group: String },

    #[error("Failed to load group store from {path}: {source}")]
    StoreLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse group store: {0}")]
    StoreParse(#[from] toml::de::Error),

    #[error("Failed to serialize group store: {0}")]
    StoreSerialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Group {group} has an empty name")]
    EmptyName { group: String },

    #[error("Group {name:?} has an empty id")]
    EmptyId { name: String },

    #[error("Group name contains a line break: {name:?}")]
    MultilineName { name: String },

    #[error("Group name has leading or trailing whitespace: {name:?}")]
    PaddedName { name: String },

    #[error("Group name contains a template placeholder: {name:?}")]
    PlaceholderInName { name: String },

    #[error("Duplicate group id: {id}")]
    DuplicateId { id: String },

    #[error("Invalid client address or CIDR: {value}")]
    InvalidClient { value: String },

    #[error("Invalid destination host pattern: {value} ({reason})")]
    InvalidDestination { value: String, reason: &'static str },
}
