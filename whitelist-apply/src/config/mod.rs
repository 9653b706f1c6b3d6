//! Settings for the whitelist tools
//!
//! - Settings: nginx paths and commands, rule scheme, backup retention, dashboard
//! - ConfigLoader: locating and loading the settings file

pub mod loader;
pub mod schema;

pub use loader::{expand_home, ConfigLoader};
pub use schema::{BackupSettings, DashboardSettings, NginxSettings, RuleSettings, Settings};
