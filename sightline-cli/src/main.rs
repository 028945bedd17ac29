use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sightline::config::{default_config_path, Config};
use std::path::PathBuf;

mod commands;
mod logging;

#[derive(Parser, Debug)]
#[command(name = "sightline")]
#[command(about = "Sightline CLI - entry index installation and maintenance")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to ~/.sightline/config.toml)
    #[arg(short, long, global = true, env = "SIGHTLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the entry index and bind the alias to it
    Install {
        /// Drop every index behind the alias first
        #[arg(long)]
        force: bool,
    },

    /// Drop every index behind the alias
    Uninstall,

    /// Point the alias's write index at today's index
    Rotate,

    /// Delete entries created more than N hours ago
    Prune {
        #[arg(long, default_value = "24")]
        hours: i64,
    },

    /// Delete every entry, keeping the indices
    Clear,

    /// Show the alias and the indices behind it
    Status,

    /// Write a default config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.clone().unwrap_or_else(default_config_path);

    let config = match cli.command {
        Commands::Init => Config::load_or_create(&path),
        _ => Config::load_from(&path),
    }
    .with_context(|| format!("Failed to load config from {}", path.display()))?;
    logging::init(&config.logging)?;

    tracing::debug!(config = %path.display(), url = %config.elasticsearch.url, "Loaded config");

    if let Commands::Init = cli.command {
        println!("Config: {}", path.display());
        println!("  Elasticsearch: {}", config.elasticsearch.url);
        println!("  Alias: {}", config.index.alias);
        return Ok(());
    }

    let store = config
        .create_store()
        .context("Failed to create Elasticsearch client")?;

    match cli.command {
        Commands::Install { force } => {
            commands::run_install(&config.index_manager(store), force).await?;
        }
        Commands::Uninstall => {
            commands::run_uninstall(&config.index_manager(store)).await?;
        }
        Commands::Rotate => {
            commands::run_rotate(&config.index_manager(store)).await?;
        }
        Commands::Prune { hours } => {
            commands::run_prune(&config.repository(store), hours).await?;
        }
        Commands::Clear => {
            commands::run_clear(&config.repository(store)).await?;
        }
        Commands::Status => {
            commands::run_status(&config.index_manager(store)).await?;
        }
        Commands::Init => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_prune_defaults_to_a_day() {
        let cli = Cli::parse_from(["sightline", "prune"]);
        assert!(matches!(cli.command, Commands::Prune { hours: 24 }));

        let cli = Cli::parse_from(["sightline", "--config", "/tmp/s.toml", "prune", "--hours", "6"]);
        assert!(matches!(cli.command, Commands::Prune { hours: 6 }));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
    }

    #[test]
    fn test_install_force_flag() {
        let cli = Cli::parse_from(["sightline", "install", "--force"]);
        assert!(matches!(cli.command, Commands::Install { force: true }));
    }
}
