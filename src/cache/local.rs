//! Directory-backed artifact cache
//!
//! Stores one `<key>.tar.gz` bundle per key under a root directory, which can
//! be a shared volume mounted into every runner. Writes go to a temporary file
//! first and are renamed into place, so readers never see a partial bundle.

use crate::cache::archive::{self, DigestWriter};
use crate::cache::key::CacheKey;
use crate::cache::paths::CachePathSet;
use crate::cache::store::{ArtifactCache, RestoreOutcome, SaveReceipt};
use crate::error::{ProvisionError, ProvisionResult};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const BUNDLE_EXTENSION: &str = "tar.gz";

/// Cache bundles stored as files in a directory
#[derive(Debug, Clone)]
pub struct DirectoryCache {
    root: PathBuf,
}

impl DirectoryCache {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the bundle for a key
    pub fn bundle_path(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(format!("{}.{}", key.file_stem(), BUNDLE_EXTENSION))
    }

    fn restore_blocking(
        bundle: &Path,
        paths: &CachePathSet,
        key: &CacheKey,
    ) -> ProvisionResult<RestoreOutcome> {
        let file = File::open(bundle)
            .map_err(|e| ProvisionError::io(format!("opening {}", bundle.display()), e))?;

        match archive::unpack(BufReader::new(file), paths, key) {
            Ok(unpacked) => {
                info!("Restored {} entries from {}", unpacked.entries, bundle.display());
                Ok(RestoreOutcome::Hit { key: key.clone() })
            }
            Err(ProvisionError::ManifestMismatch { .. }) => {
                warn!(
                    "Bundle {} was saved for a different path set, ignoring it",
                    bundle.display()
                );
                Ok(RestoreOutcome::Miss)
            }
            Err(e) => Err(e),
        }
    }

    fn save_blocking(
        root: &Path,
        bundle: &Path,
        paths: &CachePathSet,
        key: &CacheKey,
    ) -> ProvisionResult<SaveReceipt> {
        std::fs::create_dir_all(root)
            .map_err(|e| ProvisionError::io(format!("creating {}", root.display()), e))?;

        let staging = root.join(format!(".{}.{}.partial", key.file_stem(), uuid::Uuid::new_v4()));
        let file = File::create(&staging)
            .map_err(|e| ProvisionError::io(format!("creating {}", staging.display()), e))?;

        let written = archive::pack(DigestWriter::new(BufWriter::new(file)), paths, key)
            .and_then(|writer| {
                let (mut inner, digest, size) = writer.finish();
                inner
                    .flush()
                    .map_err(|e| ProvisionError::archive("flushing bundle", e))?;
                Ok((digest, size))
            });

        let (digest, size) = match written {
            Ok(result) => result,
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                return Err(e);
            }
        };

        std::fs::rename(&staging, bundle).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            ProvisionError::io(format!("moving bundle to {}", bundle.display()), e)
        })?;

        Ok(SaveReceipt {
            id: digest,
            size_bytes: size,
            reused: false,
        })
    }

    /// Receipt for a bundle already stored under `key`
    ///
    /// A bundle that is unreadable or records another key is not reused.
    fn existing_receipt(bundle: &Path, key: &CacheKey) -> ProvisionResult<Option<SaveReceipt>> {
        let metadata = match std::fs::metadata(bundle) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ProvisionError::io(format!("inspecting {}", bundle.display()), e))
            }
        };

        let file = File::open(bundle)
            .map_err(|e| ProvisionError::io(format!("opening {}", bundle.display()), e))?;
        match archive::read_manifest(BufReader::new(file)) {
            Ok(manifest) if manifest.key == key.as_str() => {}
            Ok(manifest) => {
                warn!(
                    "Bundle {} belongs to {}, replacing it",
                    bundle.display(),
                    manifest.key
                );
                return Ok(None);
            }
            Err(e) => {
                warn!("Bundle {} is unreadable ({}), replacing it", bundle.display(), e);
                return Ok(None);
            }
        }

        let mut file = File::open(bundle)
            .map_err(|e| ProvisionError::io(format!("opening {}", bundle.display()), e))?;
        let mut digest = DigestWriter::new(std::io::sink());
        std::io::copy(&mut file, &mut digest)
            .map_err(|e| ProvisionError::io(format!("hashing {}", bundle.display()), e))?;
        let (_, id, _) = digest.finish();

        Ok(Some(SaveReceipt {
            id,
            size_bytes: metadata.len(),
            reused: true,
        }))
    }
}

#[async_trait]
impl ArtifactCache for DirectoryCache {
    async fn restore(
        &self,
        paths: &CachePathSet,
        key: &CacheKey,
        fallback_keys: &[CacheKey],
    ) -> ProvisionResult<RestoreOutcome> {
        let candidate = std::iter::once(key)
            .chain(fallback_keys)
            .map(|k| (k.clone(), self.bundle_path(k)))
            .find(|(_, bundle)| bundle.is_file());

        let Some((matched, bundle)) = candidate else {
            debug!("No bundle for {} under {}", key, self.root.display());
            return Ok(RestoreOutcome::Miss);
        };

        let paths = paths.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            Self::restore_blocking(&bundle, &paths, &matched)
        })
        .await
        .map_err(|e| ProvisionError::Internal(format!("restore task failed: {}", e)))??;

        // A fallback hit reports the key it came from
        Ok(outcome)
    }

    async fn save(&self, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<SaveReceipt> {
        let root = self.root.clone();
        let bundle = self.bundle_path(key);
        let paths = paths.clone();
        let key = key.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(receipt) = Self::existing_receipt(&bundle, &key)? {
                debug!("Bundle {} already exists, not overwriting", bundle.display());
                return Ok(receipt);
            }
            Self::save_blocking(&root, &bundle, &paths, &key)
        })
        .await
        .map_err(|e| ProvisionError::Internal(format!("save task failed: {}", e)))?
    }

    fn backend_name(&self) -> &'static str {
        "directory"
    }
}
