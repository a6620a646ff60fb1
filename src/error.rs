//! Error types for condaprov
//!
//! All modules use `ProvisionResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for condaprov operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// All errors that can occur while provisioning
#[derive(Error, Debug)]
pub enum ProvisionError {
    // Input errors
    #[error("Invalid cache key input: {field} must not be empty")]
    InvalidCacheKey { field: &'static str },

    #[error("Invalid package pin '{spec}': {reason}")]
    InvalidPackagePin { spec: String, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Provisioning errors
    #[error("Step '{step}' failed (exit code {code}):\n{output}")]
    StepFailed {
        step: String,
        code: i32,
        output: String,
    },

    // Cache errors
    #[error("Cache backend error: {0}")]
    Cache(String),

    #[error("Cache transfer failed for {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Cache archive error: {context}")]
    Archive {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache entry {key} was saved for different paths")]
    ManifestMismatch { key: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Failed to spawn command: {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ProvisionError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create an archive error with context
    pub fn archive(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Archive {
            context: context.into(),
            source,
        }
    }

    /// Create a spawn error
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source,
        }
    }

    /// Create a step failure error
    pub fn step_failed(step: impl Into<String>, code: i32, output: impl Into<String>) -> Self {
        Self::StepFailed {
            step: step.into(),
            code,
            output: output.into(),
        }
    }

    /// Whether the error only degrades caching and never the provisioned environment
    pub fn is_advisory(&self) -> bool {
        matches!(
            self,
            Self::Cache(_) | Self::Http { .. } | Self::Archive { .. } | Self::ManifestMismatch { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::InvalidCacheKey { .. } => {
                Some("Pass --tool-version, or set RUNNER_OS when the platform is not detected")
            }
            Self::InvalidPackagePin { .. } => {
                Some("Pins must be exact, e.g. snakemake-minimal==6.12.3")
            }
            Self::StepFailed { step, .. } if step.starts_with("Download") => {
                Some("Check conda.installer_url and network access from the runner")
            }
            Self::StepFailed { .. } => {
                Some("Rerun to resume; completed steps are skipped on the next run")
            }
            Self::Spawn { .. } => Some("Make sure bash is available on PATH"),
            _ => None,
        }
    }
}
