//! Filesystem layout of provisioned state

use crate::cache::CachePathSet;
use crate::config::schema::LayoutConfig;
use std::path::{Path, PathBuf};

/// Marker written inside the distribution root once bootstrap completes
pub const BOOTSTRAP_MARKER: &str = ".condaprov-bootstrap";

/// Marker written inside the environment once its packages are installed
pub const PACKAGES_MARKER: &str = ".condaprov-packages";

/// Installer file name, relative to the working directory
const INSTALLER_NAME: &str = "conda.sh";

/// Resolved locations of the distribution, its config and the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub workdir: PathBuf,
    pub distribution_root: PathBuf,
    pub config_file: PathBuf,
    pub pkgs_dir: PathBuf,
    pub env_dir: PathBuf,
}

impl Layout {
    /// Resolve configured paths against the home and working directories
    pub fn resolve(config: &LayoutConfig, workdir: &Path) -> Self {
        let resolve = |raw: &str| {
            let expanded = expand_home(raw);
            if expanded.is_absolute() {
                expanded
            } else {
                workdir.join(expanded)
            }
        };

        Self {
            workdir: workdir.to_path_buf(),
            distribution_root: resolve(&config.distribution_root),
            config_file: resolve(&config.config_file),
            pkgs_dir: resolve(&config.pkgs_dir),
            env_dir: resolve(&config.env_dir),
        }
    }

    /// The locations saved and restored as one bundle, in fixed order
    pub fn cache_paths(&self) -> CachePathSet {
        CachePathSet::new(vec![
            self.distribution_root.clone(),
            self.config_file.clone(),
            self.pkgs_dir.clone(),
            self.env_dir.clone(),
        ])
    }

    /// Shell profile that activates the distribution
    pub fn profile_script(&self) -> PathBuf {
        self.distribution_root
            .join("etc")
            .join("profile.d")
            .join("conda.sh")
    }

    /// Where the downloaded installer is staged
    pub fn installer_path(&self) -> PathBuf {
        self.workdir.join(INSTALLER_NAME)
    }

    pub fn bootstrap_marker(&self) -> PathBuf {
        self.distribution_root.join(BOOTSTRAP_MARKER)
    }

    pub fn packages_marker(&self) -> PathBuf {
        self.env_dir.join(PACKAGES_MARKER)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(raw: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (raw, home) {
        ("~", Some(home)) => home,
        (raw, Some(home)) if raw.starts_with("~/") => home.join(&raw[2..]),
        (raw, _) => PathBuf::from(raw),
    }
}
