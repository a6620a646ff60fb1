//! Resolved inputs for one provisioning run

use crate::config::{Config, GuardPolicy};
use crate::provision::packages::PackagePin;

/// Everything the provisioner needs besides the layout and collaborators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionSettings {
    pub tool_version: String,
    pub os_id: String,
    /// Cache generation number; empty disables restore and save
    pub generation: String,
    pub namespace: String,
    pub installer_url: String,
    pub channels: Vec<String>,
    pub packages: Vec<PackagePin>,
    pub prefer_mamba: bool,
    pub guards: GuardPolicy,
}

impl ProvisionSettings {
    /// Build settings from configuration
    ///
    /// The tool version falls back to this crate's version and the OS
    /// identifier is detected from the runner.
    pub fn from_config(config: &Config) -> Self {
        Self {
            tool_version: config
                .conda
                .tool_version
                .clone()
                .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
            os_id: detect_os_id(),
            generation: config.cache.generation.trim().to_string(),
            namespace: config.cache.namespace.clone(),
            installer_url: config.conda.installer_url.clone(),
            channels: config.conda.channels.clone(),
            packages: config.conda.packages.clone(),
            prefer_mamba: config.conda.prefer_mamba,
            guards: config.provision.guards,
        }
    }

    /// Whether restore and save are attempted
    pub fn cache_enabled(&self) -> bool {
        !self.generation.trim().is_empty()
    }
}

/// OS identifier in the runner's own spelling
///
/// Uses `RUNNER_OS` when the CI runner sets it (`Linux`, `macOS`, `Windows`),
/// otherwise maps the compile-time platform to the same names.
pub fn detect_os_id() -> String {
    if let Ok(os) = std::env::var("RUNNER_OS") {
        if !os.trim().is_empty() {
            return os.trim().to_string();
        }
    }

    match std::env::consts::OS {
        "linux" => "Linux".to_string(),
        "macos" => "macOS".to_string(),
        "windows" => "Windows".to_string(),
        other => other.to_string(),
    }
}
