//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// condaprov - cached conda environments for CI runners
///
/// Restores a conda distribution and a pinned project environment from cache,
/// installs whatever is missing, and saves the result for the next run.
#[derive(Parser, Debug)]
#[command(name = "condaprov")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "CONDAPROV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip local .condaprov.toml discovery
    #[arg(long, global = true)]
    pub no_local: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Restore, install and cache the conda environment
    Provision(ProvisionArgs),

    /// Print the cache key for the current inputs
    Key(KeyArgs),

    /// Show provisioned paths and their state
    Status(KeyArgs),

    /// Show or initialize configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

/// Inputs that determine the cache key and layout
#[derive(Parser, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Version of the tool being provisioned (part of the cache key)
    #[arg(long, env = "CONDAPROV_TOOL_VERSION")]
    pub tool_version: Option<String>,

    /// Runner OS identifier (part of the cache key)
    #[arg(long, env = "RUNNER_OS")]
    pub os: Option<String>,

    /// Cache generation number; empty disables caching
    #[arg(long, env = "CONDAPROV_CACHE_NUMBER")]
    pub cache_number: Option<String>,

    /// Working directory the environment is created under
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,
}

/// Arguments for the provision command
#[derive(Parser, Debug, Clone)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// Installer downloaded when no distribution is present
    #[arg(long, env = "CONDAPROV_INSTALLER_URL")]
    pub installer_url: Option<String>,

    /// Bundle directory, selects the directory backend
    #[arg(long, conflicts_with = "cache_url")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL, selects the http backend
    #[arg(long)]
    pub cache_url: Option<String>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}
