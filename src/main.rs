//! condaprov - cached conda environments for CI runners
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use condaprov::cli::{Cli, Commands};
use condaprov::config::{Config, ConfigManager};
use condaprov::error::{ProvisionError, ProvisionResult};
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ProvisionResult<()> {
    let cli = Cli::parse();

    // Completions need neither logging nor config
    if let Commands::Completions { shell } = cli.command {
        condaprov::cli::commands::completions(shell);
        return Ok(());
    }

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };

    let local_config_path = if cli.no_local {
        None
    } else {
        let cwd = std::env::current_dir()
            .map_err(|e| ProvisionError::io("getting current directory", e))?;
        ConfigManager::find_local_config(&cwd)
    };

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(cli.verbose, &config);
    condaprov::ui::init_theme();

    match &local_config_path {
        Some(path) => debug!("Merged local config: {}", path.display()),
        None if cli.no_local => debug!("Local config discovery disabled (--no-local)"),
        None => debug!("No local config found"),
    }

    match cli.command {
        Commands::Completions { .. } => unreachable!("Completions handled above"),
        Commands::Provision(args) => condaprov::cli::commands::provision(args, &config).await,
        Commands::Key(args) => condaprov::cli::commands::key(args, &config).await,
        Commands::Status(args) => condaprov::cli::commands::status(args, &config).await,
        Commands::Config(args) => {
            condaprov::cli::commands::config(args, &config, &config_manager).await
        }
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("condaprov=warn"),
        1 => EnvFilter::new("condaprov=info"),
        _ => EnvFilter::new("condaprov=debug"),
    };

    if config.general.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr)
            .init();
    }
}
