//! Common CLI argument structure for the whitelist executables

use clap::Parser;
use std::path::PathBuf;

/// Common CLI arguments shared by wlctl and whitelist-dashboard
#[derive(Parser, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Settings file (TOML format)
    #[arg(long, short, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log debug detail to stderr
    #[arg(long, short)]
    pub verbose: bool,

    /// Nginx configuration file to manage (overrides settings)
    #[arg(long, value_name = "PATH")]
    pub nginx_config: Option<PathBuf>,
}
