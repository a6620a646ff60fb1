//! HTTP key/value artifact cache
//!
//! Talks to any store that serves `GET`, `HEAD` and `PUT` on
//! `<base_url>/<key>.tar.gz` (nginx WebDAV, bazel-remote style caches, S3
//! presigned gateways). ureq is blocking, so every transfer runs on the
//! blocking pool; bundles are staged in a temporary file on both directions.

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

/// Suffix of the file holding a bundle's receipt id
const DIGEST_SUFFIX: &str = ".sha256";

/// Cache bundles stored behind an HTTP endpoint
#[derive(Debug, Clone)]
pub struct HttpCache {
    base_url: String,
    token: Option<String>,
}

/// Removes a staged bundle when dropped
struct StagedFile(PathBuf);

impl StagedFile {
    fn new() -> Self {
        Self(std::env::temp_dir().join(format!("condaprov-{}.tar.gz", uuid::Uuid::new_v4())))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl HttpCache {
    /// Create a client for `base_url`, sending `token` as a bearer token when set
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// URL of the bundle for a key
    pub fn bundle_url(&self, key: &CacheKey) -> String {
        format!("{}/{}.tar.gz", self.base_url, key.file_stem())
    }

    /// URL of the digest stored next to a bundle
    pub fn digest_url(&self, key: &CacheKey) -> String {
        format!("{}{}", self.bundle_url(key), DIGEST_SUFFIX)
    }

    fn authorization(&self) -> Option<String> {
        self.token.as_ref().map(|t| format!("Bearer {}", t))
    }

    fn transfer_error(url: &str, error: ureq::Error) -> ProvisionError {
        ProvisionError::Http {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }

    /// Download the bundle for `url` into `dest`; `Ok(false)` on 404
    fn download(&self, url: &str, dest: &Path) -> ProvisionResult<bool> {
        let agent = ureq::Agent::new_with_defaults();
        let mut request = agent.get(url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        let response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => return Ok(false),
            Err(e) => return Err(Self::transfer_error(url, e)),
        };

        let mut reader = response.into_body().into_reader();
        let file = File::create(dest)
            .map_err(|e| ProvisionError::io(format!("creating {}", dest.display()), e))?;
        let mut writer = BufWriter::new(file);
        let size = std::io::copy(&mut reader, &mut writer).map_err(|e| ProvisionError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        writer
            .flush()
            .map_err(|e| ProvisionError::io(format!("writing {}", dest.display()), e))?;

        debug!("Downloaded {} bytes from {}", size, url);
        Ok(true)
    }

    /// Size of the stored bundle, or `None` when nothing is stored
    fn probe(&self, url: &str) -> ProvisionResult<Option<u64>> {
        let agent = ureq::Agent::new_with_defaults();
        let mut request = agent.head(url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        match request.call() {
            Ok(response) => Ok(Some(
                response
                    .headers()
                    .get("content-length")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            )),
            Err(ureq::Error::StatusCode(404)) => Ok(None),
            Err(e) => Err(Self::transfer_error(url, e)),
        }
    }

    fn upload(&self, url: &str, source: &Path) -> ProvisionResult<()> {
        let mut file = File::open(source)
            .map_err(|e| ProvisionError::io(format!("opening {}", source.display()), e))?;

        let agent = ureq::Agent::new_with_defaults();
        let mut request = agent
            .put(url)
            .header("Content-Type", "application/gzip");
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        request
            .send(ureq::SendBody::from_reader(&mut file))
            .map_err(|e| Self::transfer_error(url, e))?;
        Ok(())
    }

    fn upload_digest(&self, url: &str, digest: &str) -> ProvisionResult<()> {
        let agent = ureq::Agent::new_with_defaults();
        let mut request = agent.put(url).header("Content-Type", "text/plain");
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        request
            .send(digest)
            .map_err(|e| Self::transfer_error(url, e))?;
        Ok(())
    }

    /// Receipt id of a stored bundle
    ///
    /// Reads the digest saved next to the bundle, and hashes the bundle
    /// itself when there is none.
    fn stored_digest(&self, key: &CacheKey) -> ProvisionResult<String> {
        let agent = ureq::Agent::new_with_defaults();
        let digest_url = self.digest_url(key);
        let mut request = agent.get(&digest_url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }

        match request.call() {
            Ok(response) => {
                let digest = response
                    .into_body()
                    .read_to_string()
                    .map_err(|e| Self::transfer_error(&digest_url, e))?;
                return Ok(digest.trim().to_string());
            }
            Err(ureq::Error::StatusCode(404)) => {
                debug!("No digest at {}, hashing the bundle", digest_url);
            }
            Err(e) => return Err(Self::transfer_error(&digest_url, e)),
        }

        let url = self.bundle_url(key);
        let mut request = agent.get(&url);
        if let Some(auth) = self.authorization() {
            request = request.header("Authorization", auth);
        }
        let response = request.call().map_err(|e| Self::transfer_error(&url, e))?;

        let mut reader = response.into_body().into_reader();
        let mut digest = DigestWriter::new(std::io::sink());
        std::io::copy(&mut reader, &mut digest).map_err(|e| ProvisionError::Http {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let (_, id, _) = digest.finish();
        Ok(id)
    }

    fn restore_blocking(
        &self,
        paths: &CachePathSet,
        keys: &[CacheKey],
    ) -> ProvisionResult<RestoreOutcome> {
        for key in keys {
            let url = self.bundle_url(key);
            let staged = StagedFile::new();
            if !self.download(&url, staged.path())? {
                debug!("No bundle at {}", url);
                continue;
            }

            let file = File::open(staged.path())
                .map_err(|e| ProvisionError::io(format!("opening {}", staged.path().display()), e))?;
            return match archive::unpack(BufReader::new(file), paths, key) {
                Ok(unpacked) => {
                    info!("Restored {} entries from {}", unpacked.entries, url);
                    Ok(RestoreOutcome::Hit { key: key.clone() })
                }
                Err(ProvisionError::ManifestMismatch { .. }) => {
                    warn!("Bundle at {} was saved for a different path set, ignoring it", url);
                    Ok(RestoreOutcome::Miss)
                }
                Err(e) => Err(e),
            };
        }
        Ok(RestoreOutcome::Miss)
    }

    fn save_blocking(&self, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<SaveReceipt> {
        let url = self.bundle_url(key);
        if let Some(size) = self.probe(&url)? {
            debug!("Bundle already stored at {}, not uploading", url);
            return Ok(SaveReceipt {
                id: self.stored_digest(key)?,
                size_bytes: size,
                reused: true,
            });
        }

        let staged = StagedFile::new();
        let file = File::create(staged.path())
            .map_err(|e| ProvisionError::io(format!("creating {}", staged.path().display()), e))?;
        let writer = archive::pack(DigestWriter::new(BufWriter::new(file)), paths, key)?;
        let (mut inner, digest, size) = writer.finish();
        inner
            .flush()
            .map_err(|e| ProvisionError::archive("flushing bundle", e))?;
        drop(inner);

        self.upload(&url, staged.path())?;
        info!("Uploaded {} bytes to {}", size, url);

        if let Err(e) = self.upload_digest(&self.digest_url(key), &digest) {
            warn!("Bundle digest not stored: {}", e);
        }

        Ok(SaveReceipt {
            id: digest,
            size_bytes: size,
            reused: false,
        })
    }
}

#[async_trait]
impl ArtifactCache for HttpCache {
    async fn restore(
        &self,
        paths: &CachePathSet,
        key: &CacheKey,
        fallback_keys: &[CacheKey],
    ) -> ProvisionResult<RestoreOutcome> {
        let this = self.clone();
        let paths = paths.clone();
        let keys: Vec<CacheKey> = std::iter::once(key).chain(fallback_keys).cloned().collect();

        tokio::task::spawn_blocking(move || this.restore_blocking(&paths, &keys))
            .await
            .map_err(|e| ProvisionError::Internal(format!("restore task failed: {}", e)))?
    }

    async fn save(&self, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<SaveReceipt> {
        let this = self.clone();
        let paths = paths.clone();
        let key = key.clone();

        tokio::task::spawn_blocking(move || this.save_blocking(&paths, &key))
            .await
            .map_err(|e| ProvisionError::Internal(format!("save task failed: {}", e)))?
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
