//! The set of filesystem locations that make up one cached bundle

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ordered locations saved and restored together under one cache key
///
/// Order matters: archive entries are addressed by position, so a bundle can
/// only be restored onto the same set it was saved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePathSet {
    paths: Vec<PathBuf>,
}

impl CachePathSet {
    /// Create a path set, keeping the given order
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self { paths }
    }

    /// Iterate over the locations in order
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }

    /// Location at a given position
    pub fn get(&self, index: usize) -> Option<&Path> {
        self.paths.get(index).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Locations rendered for manifests and logs
    pub fn display_strings(&self) -> Vec<String> {
        self.paths
            .iter()
            .map(|p| p.display().to_string())
            .collect()
    }
}
