//! LogVault Daemon - rotates and archives a service's logs

use anyhow::{Context, Result};
use clap::Parser;
use logvault_core::{constants, ConfigError, ConfigModel};
use std::path::PathBuf;

mod daemon;

use daemon::Daemon;

#[derive(Parser)]
#[command(name = "logvaultd")]
#[command(version, about = "Rotating log sink with scheduled, verified archival")]
struct Cli {
    /// Config file (YAML, TOML or JSON)
    #[arg(short, long, env = "LOGVAULT_CONFIG")]
    config: Option<PathBuf>,
}

/// Explicit path first, then the working directory, then the user config dir
fn load_config(cli: &Cli) -> Result<(ConfigModel, PathBuf)> {
    if let Some(path) = &cli.config {
        let config = ConfigModel::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        return Ok((config, path.clone()));
    }

    let cwd = std::env::current_dir()?;
    match ConfigModel::find_and_load(&cwd) {
        Err(ConfigError::NoConfigFile(_)) => {
            let dir = constants::user_config_dir()
                .ok_or(ConfigError::NoConfigFile(cwd))?;
            ConfigModel::find_and_load(&dir)
                .with_context(|| format!("failed to load config from {}", dir.display()))
        }
        found => found.context("failed to load config"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(&cli)?;

    let daemon = Daemon::new(config, config_path)?;
    daemon.run().await
}
