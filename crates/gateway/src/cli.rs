//! Command-line interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tm_domain::config::Config;

#[derive(Parser)]
#[command(name = "taskmesh", about = "Multi-agent task orchestration gateway")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, short, default_value = "taskmesh.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the gateway server (default).
    Serve,
    /// Config utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Parse and validate the config file, printing every issue.
    Validate,
}

/// Load the config file; a missing file yields the defaults.
pub fn load_config(path: &PathBuf) -> anyhow::Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
    Ok(config)
}
