//! Cache key derivation
//!
//! Keys are a plain concatenation of a namespace tag, the tool version, the
//! runner OS and the cache generation number. Invalidation is purely
//! key-driven: bump the generation to start from a clean cache.

use crate::error::{ProvisionError, ProvisionResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace tag used when none is configured
pub const DEFAULT_NAMESPACE: &str = "conda-dev3";

const SEPARATOR: char = '-';

/// Deterministic identifier of a cached artifact bundle
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key as a file name or URL segment
    ///
    /// Bytes outside `[A-Za-z0-9._+-]` are percent-encoded, so distinct keys
    /// never share a stem.
    pub fn file_stem(&self) -> String {
        let mut stem = String::with_capacity(self.0.len());
        for byte in self.0.bytes() {
            if byte.is_ascii_alphanumeric() || b"._+-".contains(&byte) {
                stem.push(byte as char);
            } else {
                stem.push_str(&format!("%{:02X}", byte));
            }
        }
        stem
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds cache keys for one artifact class
#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    namespace: String,
}

impl CacheKeyBuilder {
    /// Create a builder for the given namespace tag
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// The namespace tag prefixed to every key
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Compute the key for a tool version, OS identifier and generation number
    ///
    /// The generation may be empty (caching disabled); the version and OS
    /// identifier may not.
    pub fn build(
        &self,
        tool_version: &str,
        os_id: &str,
        generation: &str,
    ) -> ProvisionResult<CacheKey> {
        if tool_version.trim().is_empty() {
            return Err(ProvisionError::InvalidCacheKey {
                field: "tool version",
            });
        }
        if os_id.trim().is_empty() {
            return Err(ProvisionError::InvalidCacheKey {
                field: "OS identifier",
            });
        }

        Ok(CacheKey(format!(
            "{ns}{sep}{version}{sep}{os}{sep}{generation}",
            ns = self.namespace,
            sep = SEPARATOR,
            version = tool_version,
            os = os_id,
            generation = generation,
        )))
    }
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
