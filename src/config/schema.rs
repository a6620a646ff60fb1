//! Configuration schema for condaprov
//!
//! Configuration is stored at `~/.config/condaprov/config.toml`, with an
//! optional project-local `.condaprov.toml` merged on top.

use crate::cache::DEFAULT_NAMESPACE;
use crate::provision::PackagePin;
use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Conda distribution and environment settings
    pub conda: CondaConfig,

    /// Filesystem layout of the provisioned state
    pub layout: LayoutConfig,

    /// Provisioning behavior
    pub provision: ProvisionConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append a JSON line per provisioning run to the run log
    pub run_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            run_log: true,
        }
    }
}

/// Where cache bundles live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Bundles stored as files under `cache.directory`
    Directory,
    /// Bundles stored behind `cache.url`
    Http,
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache generation number; empty disables caching.
    /// Bump it to invalidate every stored bundle.
    pub generation: String,

    /// Namespace tag prefixed to every cache key
    pub namespace: String,

    /// Storage backend
    pub backend: CacheBackend,

    /// Bundle directory for the directory backend
    pub directory: String,

    /// Base URL for the http backend
    pub url: Option<String>,

    /// Environment variable holding a bearer token for the http backend
    pub token_env: String,
}

impl CacheConfig {
    /// Whether restore and save should be attempted at all
    pub fn enabled(&self) -> bool {
        !self.generation.trim().is_empty()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let directory = dirs::cache_dir()
            .map(|d| d.join("condaprov").join("bundles").display().to_string())
            .unwrap_or_else(|| "~/.cache/condaprov/bundles".to_string());

        Self {
            generation: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            backend: CacheBackend::Directory,
            directory,
            url: None,
            token_env: "CONDAPROV_CACHE_TOKEN".to_string(),
        }
    }
}

/// Conda distribution and environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CondaConfig {
    /// Version of the tool whose environment is provisioned (part of the cache key)
    pub tool_version: Option<String>,

    /// Installer downloaded when no distribution is present
    pub installer_url: String,

    /// Channels passed to the package install, in priority order
    pub channels: Vec<String>,

    /// Exact-version packages installed into the environment
    pub packages: Vec<PackagePin>,

    /// Use mamba for the package install when it is on PATH
    pub prefer_mamba: bool,
}

impl Default for CondaConfig {
    fn default() -> Self {
        Self {
            tool_version: None,
            installer_url: default_installer_url(),
            channels: vec![
                "defaults".to_string(),
                "conda-forge".to_string(),
                "bioconda".to_string(),
            ],
            packages: PackagePin::defaults(),
            prefer_mamba: true,
        }
    }
}

/// Miniconda installer for the platform this binary was built for
pub fn default_installer_url() -> String {
    let platform = match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "MacOSX-arm64",
        ("macos", _) => "MacOSX-x86_64",
        ("linux", "aarch64") => "Linux-aarch64",
        _ => "Linux-x86_64",
    };
    format!(
        "https://repo.anaconda.com/miniconda/Miniconda3-latest-{}.sh",
        platform
    )
}

/// Filesystem layout; `~` expands to the home directory and relative
/// paths resolve against the working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Distribution install prefix
    pub distribution_root: String,

    /// Conda configuration file
    pub config_file: String,

    /// Package download staging directory
    pub pkgs_dir: String,

    /// Project environment prefix
    pub env_dir: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            distribution_root: "~/.conda".to_string(),
            config_file: "~/.condarc".to_string(),
            pkgs_dir: "~/conda_pkgs_dir".to_string(),
            env_dir: "envs".to_string(),
        }
    }
}

/// How installation steps decide they are already done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardPolicy {
    /// Require the completion marker written as a step's last action
    Markers,
    /// Trust directory existence alone
    Directories,
}

/// Provisioning behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Completion check used by the installation guards
    pub guards: GuardPolicy,

    /// Shell used to run commands
    pub shell: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            guards: GuardPolicy::Markers,
            shell: "bash".to_string(),
        }
    }
}
