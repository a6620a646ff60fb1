//! Provisioning state derived from the filesystem
//!
//! Nothing about progress is stored outside the provisioned paths. Every
//! guard in the provisioner asks `EnvironmentProbe::inspect`, which is the
//! only place that decides what "already done" means.

use crate::config::GuardPolicy;
use crate::error::{ProvisionError, ProvisionResult};
use crate::provision::layout::Layout;
use crate::provision::packages::{pin_list, PackagePin};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// How far provisioning has progressed, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// No usable distribution
    Absent,
    /// Distribution installed and configured, no environment
    Bootstrapped,
    /// Environment prefix exists but its packages are not confirmed
    EnvironmentCreated,
    /// Environment holds the pinned package set
    PackagesInstalled,
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absent => "absent",
            Self::Bootstrapped => "bootstrapped",
            Self::EnvironmentCreated => "environment created",
            Self::PackagesInstalled => "packages installed",
        };
        f.write_str(name)
    }
}

/// Result of probing the layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inspection {
    pub state: ProvisioningState,
    /// The distribution root exists, complete or not
    pub distribution_dir_exists: bool,
    /// The environment prefix exists, complete or not
    pub env_dir_exists: bool,
    /// The config file registers the package staging directory
    pub pkgs_dir_registered: bool,
}

/// Idempotence gate for the installation steps
#[derive(Debug, Clone)]
pub struct EnvironmentProbe {
    policy: GuardPolicy,
    pins: Vec<PackagePin>,
}

impl EnvironmentProbe {
    pub fn new(policy: GuardPolicy, pins: Vec<PackagePin>) -> Self {
        Self { policy, pins }
    }

    pub fn policy(&self) -> GuardPolicy {
        self.policy
    }

    /// Whether a step's target exists
    pub fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    /// Compute the current state from disk
    pub fn inspect(&self, layout: &Layout) -> Inspection {
        let distribution_dir_exists = layout.distribution_root.is_dir();
        let env_dir_exists = self.exists(&layout.env_dir);

        let state = if !self.distribution_complete(layout) {
            ProvisioningState::Absent
        } else if self.packages_complete(layout) {
            ProvisioningState::PackagesInstalled
        } else if env_dir_exists {
            ProvisioningState::EnvironmentCreated
        } else {
            ProvisioningState::Bootstrapped
        };

        let inspection = Inspection {
            state,
            distribution_dir_exists,
            env_dir_exists,
            pkgs_dir_registered: self.pkgs_dir_registered(layout),
        };
        debug!("Probed {}: {:?}", layout.workdir.display(), inspection);
        inspection
    }

    fn distribution_complete(&self, layout: &Layout) -> bool {
        match self.policy {
            GuardPolicy::Directories => self.exists(&layout.distribution_root),
            GuardPolicy::Markers => {
                layout.distribution_root.is_dir() && self.exists(&layout.bootstrap_marker())
            }
        }
    }

    fn packages_complete(&self, layout: &Layout) -> bool {
        match self.policy {
            GuardPolicy::Directories => self.exists(&layout.env_dir),
            GuardPolicy::Markers => std::fs::read_to_string(layout.packages_marker())
                .map(|recorded| recorded == pin_list(&self.pins))
                .unwrap_or(false),
        }
    }

    /// Restored state is trusted as-is under the directory policy
    fn pkgs_dir_registered(&self, layout: &Layout) -> bool {
        if self.policy == GuardPolicy::Directories {
            return true;
        }

        let wanted = layout.pkgs_dir.display().to_string();
        std::fs::read_to_string(&layout.config_file)
            .map(|content| {
                content
                    .lines()
                    .map(|line| line.trim().trim_start_matches('-').trim())
                    .any(|entry| entry == wanted)
            })
            .unwrap_or(false)
    }

    /// Record that bootstrap finished
    pub async fn mark_bootstrapped(&self, layout: &Layout) -> ProvisionResult<()> {
        let marker = layout.bootstrap_marker();
        tokio::fs::write(&marker, format!("{}\n", chrono::Utc::now().to_rfc3339()))
            .await
            .map_err(|e| ProvisionError::io(format!("writing {}", marker.display()), e))
    }

    /// Record that the pinned packages are installed
    pub async fn mark_packages_installed(&self, layout: &Layout) -> ProvisionResult<()> {
        let marker = layout.packages_marker();
        tokio::fs::write(&marker, pin_list(&self.pins))
            .await
            .map_err(|e| ProvisionError::io(format!("writing {}", marker.display()), e))
    }

    /// Drop completion markers so partially restored state gets re-validated
    pub async fn invalidate_markers(&self, layout: &Layout) -> ProvisionResult<()> {
        for marker in [layout.bootstrap_marker(), layout.packages_marker()] {
            match tokio::fs::remove_file(&marker).await {
                Ok(()) => debug!("Removed {}", marker.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ProvisionError::io(format!("removing {}", marker.display()), e))
                }
            }
        }
        Ok(())
    }
}
