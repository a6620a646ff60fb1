//! Artifact cache abstraction
//!
//! Backends report outcomes as values. A miss is not an error; an `Err` means
//! the backend itself failed and the caller decides whether that matters.

use crate::cache::key::CacheKey;
use crate::cache::paths::CachePathSet;
use crate::error::ProvisionResult;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

/// Outcome of a restore attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum RestoreOutcome {
    /// A bundle was found and materialized under the path set
    Hit { key: CacheKey },
    /// Nothing stored under the key (or any fallback key)
    Miss,
}

impl RestoreOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit { .. })
    }
}

impl fmt::Display for RestoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit { key } => write!(f, "hit ({})", key),
            Self::Miss => write!(f, "miss"),
        }
    }
}

/// Receipt returned by a successful save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReceipt {
    /// Backend-specific identifier of the stored bundle
    pub id: String,
    /// Size of the stored bundle in bytes
    pub size_bytes: u64,
    /// True when the key already existed and nothing was written
    pub reused: bool,
}

/// Key-addressed blob store for provisioned state
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Restore the bundle stored under `key` (or the first matching
    /// `fallback_keys` entry) onto `paths`
    async fn restore(
        &self,
        paths: &CachePathSet,
        key: &CacheKey,
        fallback_keys: &[CacheKey],
    ) -> ProvisionResult<RestoreOutcome>;

    /// Store the current contents of `paths` under `key`
    ///
    /// Saving a key that already exists must not fail.
    async fn save(&self, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<SaveReceipt>;

    /// Human-readable backend name for display
    fn backend_name(&self) -> &'static str;
}

/// Format bytes as human-readable size (e.g., "1.5 GB")
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
