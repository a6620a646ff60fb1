//! Resolve configuration plus command-line overrides into run inputs

use crate::cache::{ArtifactCache, DirectoryCache, HttpCache};
use crate::cli::args::KeyArgs;
use crate::config::schema::CacheConfig;
use crate::config::{CacheBackend, Config};
use crate::error::{ProvisionError, ProvisionResult};
use crate::provision::layout::expand_home;
use crate::provision::{Layout, ProvisionSettings};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Settings from config with flag and environment overrides applied
pub fn settings(config: &Config, args: &KeyArgs) -> ProvisionSettings {
    let mut settings = ProvisionSettings::from_config(config);

    if let Some(version) = &args.tool_version {
        settings.tool_version = version.clone();
    }
    if let Some(os) = &args.os {
        settings.os_id = os.clone();
    }
    if let Some(generation) = &args.cache_number {
        settings.generation = generation.trim().to_string();
    }
    settings
}

/// Layout resolved against `--workdir` or the current directory
pub fn layout(config: &Config, args: &KeyArgs) -> ProvisionResult<Layout> {
    let workdir = workdir(args)?;
    debug!("Working directory: {}", workdir.display());
    Ok(Layout::resolve(&config.layout, &workdir))
}

fn workdir(args: &KeyArgs) -> ProvisionResult<PathBuf> {
    match &args.workdir {
        Some(dir) => Ok(dir.clone()),
        None => std::env::current_dir()
            .map_err(|e| ProvisionError::io("getting current directory", e)),
    }
}

/// Build the configured cache backend
pub fn cache_backend(config: &CacheConfig) -> ProvisionResult<Arc<dyn ArtifactCache>> {
    match config.backend {
        CacheBackend::Directory => {
            let root = expand_home(&config.directory);
            debug!("Using directory cache at {}", root.display());
            Ok(Arc::new(DirectoryCache::new(root)))
        }
        CacheBackend::Http => {
            let url = config
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    ProvisionError::User("cache.backend = \"http\" requires cache.url".to_string())
                })?;
            let token = std::env::var(&config.token_env)
                .ok()
                .filter(|t| !t.is_empty());
            debug!("Using http cache at {} (token: {})", url, token.is_some());
            Ok(Arc::new(HttpCache::new(url, token)))
        }
    }
}
