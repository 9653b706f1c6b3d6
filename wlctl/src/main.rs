//! Command-line management of an nginx forward-proxy whitelist

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use whitelist_apply::{ApplyOutcome, CommonArgs, ConfigLoader, Settings, WhitelistService};
use whitelist_core::{
    AccessPolicy, ConfigGenerator, ConfigParser, GroupStore, RuleScheme, Template, TomlGroupStore,
    WhitelistGroup,
};

#[derive(Parser)]
#[command(
    name = "wlctl",
    about = "Manage whitelist groups for an nginx forward proxy",
    version
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Render groups into the template and print the configuration
    Generate {
        /// Group file (default: dashboard.groups_file)
        #[arg(long, value_name = "PATH")]
        groups: Option<PathBuf>,

        /// Rule scheme (default: rules.scheme)
        #[arg(long, value_parser = parse_scheme)]
        scheme: Option<RuleScheme>,

        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Extract groups from a generated configuration
    Parse {
        /// Configuration file (default: nginx.config_path)
        file: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = Format::Toml)]
        format: Format,
    },

    /// Test a configuration file without touching the live one
    Check {
        /// Configuration file (default: nginx.config_path)
        file: Option<PathBuf>,
    },

    /// Render groups, then validate, back up, write and reload
    Apply {
        /// Group file to apply (default: the stored groups)
        #[arg(long, value_name = "PATH")]
        groups: Option<PathBuf>,
    },

    /// Show server and configuration status
    Status,

    /// List groups as the live configuration describes them
    Groups {
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Reload nginx with the configuration on disk
    Reload,

    /// Decide whether the stored groups admit a client to a host
    Allow {
        client: IpAddr,
        host: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Toml,
    Json,
}

fn parse_scheme(s: &str) -> std::result::Result<RuleScheme, String> {
    s.parse()
}

#[derive(Serialize)]
struct GroupsDocument<'a> {
    groups: &'a [WhitelistGroup],
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.common.verbose { "debug" } else { "warn" };
    let filter = std::env::var("WHITELIST_LOG").unwrap_or_else(|_| default_level.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut settings =
        ConfigLoader::load_or_default(args.common.config.clone()).context("Failed to load settings")?;
    if let Some(path) = &args.common.nginx_config {
        settings.nginx.config_path = path.clone();
    }

    match args.command {
        Cmd::Generate {
            groups,
            scheme,
            output,
        } => {
            let path = groups.unwrap_or_else(|| settings.dashboard.groups_file.clone());
            let groups = load_groups(&path)?;
            let template = ConfigLoader::load_template(&settings)?;
            let text = generate(&settings, scheme, &template, &groups)?;
            match output {
                Some(path) => std::fs::write(&path, text)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => print!("{}", text),
            }
        }

        Cmd::Parse { file, format } => {
            let path = file.unwrap_or_else(|| settings.nginx.config_path.clone());
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed = ConfigParser::inspect(&text);
            tracing::debug!("{} is {:?}, scheme {:?}", path.display(), parsed.state, parsed.scheme);
            print!("{}", format_groups(&parsed.groups, format)?);
        }

        Cmd::Check { file } => {
            let service = WhitelistService::from_settings(&settings)?;
            let path = file.unwrap_or_else(|| settings.nginx.config_path.clone());
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let result = service.validate(&text).await;
            if !result.success {
                bail!("{} failed the config test:\n{}", path.display(), result.message);
            }
            println!("{}: ok", path.display());
        }

        Cmd::Apply { groups } => {
            let service = WhitelistService::from_settings(&settings)?;
            let groups = match groups {
                Some(path) => load_groups(&path)?,
                None => service.store().list(),
            };
            let result = service.set_groups(groups).await?;
            if let Some(e) = &result.store_error {
                eprintln!("warning: group store not updated: {}", e);
            }
            match result.outcome {
                ApplyOutcome::Applied => println!("{}", result.message),
                ApplyOutcome::SavedNotLive => {
                    eprintln!("{}", result.message);
                    bail!(
                        "reload failed: {}",
                        result.reload_error.as_deref().unwrap_or("unknown error")
                    );
                }
                _ => bail!("{}", result.message),
            }
        }

        Cmd::Status => {
            let service = WhitelistService::from_settings(&settings)?;
            let status = service.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Cmd::Groups { format } => {
            let service = WhitelistService::from_settings(&settings)?;
            let groups = service.groups().await?;
            print!("{}", format_groups(&groups, format)?);
        }

        Cmd::Reload => {
            let service = WhitelistService::from_settings(&settings)?;
            let result = service.reload().await;
            if !result.success {
                bail!("reload failed: {}", result.message);
            }
            println!("reloaded");
        }

        Cmd::Allow { client, host } => {
            let groups = load_groups(&settings.dashboard.groups_file)?;
            let policy = AccessPolicy::from_groups(&groups)?;
            match policy.matching_group(client, &host) {
                Some(name) => println!("allow ({})", name),
                None => {
                    println!("deny");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn load_groups(path: &Path) -> Result<Vec<WhitelistGroup>> {
    let store = TomlGroupStore::open(path)
        .with_context(|| format!("Failed to load groups from {}", path.display()))?;
    Ok(store.list())
}

fn generate(
    settings: &Settings,
    scheme: Option<RuleScheme>,
    template: &Template,
    groups: &[WhitelistGroup],
) -> Result<String> {
    let generator = ConfigGenerator::new(scheme.unwrap_or(settings.rules.scheme))
        .with_pair_warning_threshold(settings.rules.pair_warning_threshold);
    Ok(generator.generate(groups, template.as_str())?)
}

fn format_groups(groups: &[WhitelistGroup], format: Format) -> Result<String> {
    Ok(match format {
        Format::Toml => toml::to_string_pretty(&GroupsDocument { groups })?,
        Format::Json => serde_json::to_string_pretty(&GroupsDocument { groups })? + "\n",
        Format::Text => {
            let mut out = String::new();
            for group in groups {
                let state = if group.enabled { "enabled" } else { "disabled" };
                out.push_str(&format!("{} [{}] {}\n", group.name, group.id, state));
                if !group.description.is_empty() {
                    out.push_str(&format!("  {}\n", group.description));
                }
                out.push_str(&format!("  clients:      {}\n", group.client_values().join(", ")));
                out.push_str(&format!(
                    "  destinations: {}\n",
                    group.destination_values().join(", ")
                ));
            }
            out
        }
    })
}
