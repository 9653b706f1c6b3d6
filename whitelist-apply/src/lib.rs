//! Applying generated whitelist configuration to a running nginx
//!
//! Validates candidate configuration out of place, backs up and writes the
//! live file, reloads the server and reports its status. External commands
//! go through a [`CommandRunner`] so the pipeline can be exercised without
//! an nginx installation.

pub mod args;
pub mod backup;
pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod nginx;
pub mod service;
pub mod status;

pub use args::CommonArgs;
pub use backup::{Backup, RetentionPolicy};
pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use config::{ConfigLoader, Settings};
pub use coordinator::{ApplyOutcome, ApplyPhase, ApplyResult, ReloadCoordinator};
pub use error::{ApplyError, Result};
pub use nginx::{NginxControl, TestResult};
pub use service::{ConfigView, WhitelistService};
pub use status::{ConfigStatus, StatusInspector};
