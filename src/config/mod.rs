//! Configuration management for condaprov

pub mod schema;

pub use schema::{CacheBackend, Config, GuardPolicy};

use crate::error::{ProvisionError, ProvisionResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File name of the project-local configuration
pub const LOCAL_CONFIG_NAME: &str = ".condaprov.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("condaprov")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("condaprov")
    }

    /// Get the run log path
    pub fn run_log_path() -> PathBuf {
        Self::state_dir().join("runs.log")
    }

    /// Find the nearest `.condaprov.toml` walking up from `start`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> ProvisionResult<Config> {
        self.load_merged(None).await
    }

    /// Load the global configuration with an optional local file merged on top
    ///
    /// Tables merge key by key; any other value in the local file replaces
    /// the global one.
    pub async fn load_merged(&self, local: Option<&Path>) -> ProvisionResult<Config> {
        let mut merged = if self.config_path.exists() {
            Self::read_value(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            toml::Value::Table(toml::map::Map::new())
        };

        if let Some(local) = local {
            debug!("Merging local config {}", local.display());
            let overlay = Self::read_value(local).await?;
            merge_values(&mut merged, overlay);
        }

        merged
            .try_into()
            .map_err(|e: toml::de::Error| ProvisionError::ConfigInvalid {
                path: local.map_or_else(|| self.config_path.clone(), Path::to_path_buf),
                reason: e.to_string(),
            })
    }

    async fn read_value(path: &Path) -> ProvisionResult<toml::Value> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            ProvisionError::io(format!("reading config from {}", path.display()), e)
        })?;

        content
            .parse::<toml::Table>()
            .map(toml::Value::Table)
            .map_err(|e| ProvisionError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ProvisionResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ProvisionError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ProvisionResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ProvisionError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Deep-merge `overlay` into `base`
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
