//! Bundle codec for a cache path set
//!
//! A bundle is a gzip-compressed tar stream. The first entry is a JSON
//! manifest recording the key and the exact path set; each location is then
//! stored under `paths/<index>/...` so it can be restored onto the same
//! location it was saved from.

use crate::cache::key::CacheKey;
use crate::cache::paths::CachePathSet;
use crate::error::{ProvisionError, ProvisionResult};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

const MANIFEST_NAME: &str = "manifest.json";
const PATHS_ROOT: &str = "paths";

/// Metadata stored at the head of every bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub key: String,
    pub paths: Vec<String>,
    /// Which locations existed when the bundle was written
    pub present: Vec<bool>,
    pub created_at: DateTime<Utc>,
}

impl Manifest {
    fn describe(key: &CacheKey, paths: &CachePathSet) -> Self {
        Self {
            key: key.to_string(),
            paths: paths.display_strings(),
            present: paths.iter().map(|p| p.symlink_metadata().is_ok()).collect(),
            created_at: Utc::now(),
        }
    }

    /// Whether this bundle was written for the same key and path set
    pub fn matches(&self, key: &CacheKey, paths: &CachePathSet) -> bool {
        self.key == key.as_str() && self.paths == paths.display_strings()
    }
}

/// Summary of an unpacked bundle
#[derive(Debug, Clone)]
pub struct Unpacked {
    pub manifest: Manifest,
    pub entries: usize,
}

/// Writer that hashes and counts everything passing through it
pub struct DigestWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> DigestWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Return the inner writer, the first 12 hex chars of the SHA256 and the byte count
    pub fn finish(self) -> (W, String, u64) {
        let digest = self.hasher.finalize();
        (self.inner, hex::encode(&digest[..6]), self.written)
    }
}

impl<W: Write> Write for DigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn entry_root(index: usize) -> PathBuf {
    Path::new(PATHS_ROOT).join(index.to_string())
}

/// Write a bundle of `paths` to `writer`, returning the writer
///
/// Missing locations are recorded as absent in the manifest and skipped.
/// Symlinks are stored as links.
pub fn pack<W: Write>(writer: W, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<W> {
    let manifest = Manifest::describe(key, paths);
    let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;

    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(manifest_bytes.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(manifest.created_at.timestamp().max(0) as u64);
    header.set_cksum();
    builder
        .append_data(&mut header, MANIFEST_NAME, manifest_bytes.as_slice())
        .map_err(|e| ProvisionError::archive("writing bundle manifest", e))?;

    for (index, path) in paths.iter().enumerate() {
        if !manifest.present[index] {
            debug!("Skipping absent cache path {}", path.display());
            continue;
        }

        let name = entry_root(index);
        let is_dir = path
            .symlink_metadata()
            .map(|m| m.is_dir())
            .unwrap_or(false);

        let result = if is_dir {
            builder.append_dir_all(&name, path)
        } else {
            builder.append_path_with_name(path, &name)
        };
        result.map_err(|e| ProvisionError::archive(format!("packing {}", path.display()), e))?;
        debug!("Packed {}", path.display());
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| ProvisionError::archive("finishing tar stream", e))?;
    encoder
        .finish()
        .map_err(|e| ProvisionError::archive("finishing gzip stream", e))
}

/// Read only the manifest from a bundle
pub fn read_manifest<R: Read>(reader: R) -> ProvisionResult<Manifest> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let mut entries = archive
        .entries()
        .map_err(|e| ProvisionError::archive("reading bundle", e))?;
    let first = entries
        .next()
        .ok_or_else(|| ProvisionError::Cache("bundle is empty".to_string()))?
        .map_err(|e| ProvisionError::archive("reading bundle manifest", e))?;
    parse_manifest(first)
}

fn parse_manifest<R: Read>(mut entry: tar::Entry<'_, R>) -> ProvisionResult<Manifest> {
    let name = entry
        .path()
        .map_err(|e| ProvisionError::archive("reading entry name", e))?
        .into_owned();
    if name != Path::new(MANIFEST_NAME) {
        return Err(ProvisionError::Cache(format!(
            "bundle starts with {} instead of a manifest",
            name.display()
        )));
    }

    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| ProvisionError::archive("reading bundle manifest", e))?;
    Ok(serde_json::from_str(&content)?)
}

/// Restore a bundle onto `paths`
///
/// Fails with `ManifestMismatch` before touching the filesystem when the
/// bundle was written for another key or path set.
pub fn unpack<R: Read>(reader: R, paths: &CachePathSet, key: &CacheKey) -> ProvisionResult<Unpacked> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);

    let mut entries = archive
        .entries()
        .map_err(|e| ProvisionError::archive("reading bundle", e))?;

    let first = entries
        .next()
        .ok_or_else(|| ProvisionError::Cache("bundle is empty".to_string()))?
        .map_err(|e| ProvisionError::archive("reading bundle manifest", e))?;
    let manifest = parse_manifest(first)?;

    if !manifest.matches(key, paths) {
        return Err(ProvisionError::ManifestMismatch {
            key: key.to_string(),
        });
    }

    let mut count = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| ProvisionError::archive("reading bundle entry", e))?;
        let name = entry
            .path()
            .map_err(|e| ProvisionError::archive("reading entry name", e))?
            .into_owned();
        let target = resolve_target(&name, paths)?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProvisionError::archive(format!("creating {}", parent.display()), e)
            })?;
        }
        entry
            .unpack(&target)
            .map_err(|e| ProvisionError::archive(format!("restoring {}", target.display()), e))?;
        count += 1;
    }

    debug!("Restored {} entries for {}", count, key);
    Ok(Unpacked {
        manifest,
        entries: count,
    })
}

/// Map `paths/<index>/rest` back to the location it was saved from
fn resolve_target(name: &Path, paths: &CachePathSet) -> ProvisionResult<PathBuf> {
    let unexpected = || ProvisionError::Cache(format!("unexpected bundle entry {}", name.display()));

    let mut components = name.components();
    match components.next() {
        Some(Component::Normal(root)) if root == PATHS_ROOT => {}
        _ => return Err(unexpected()),
    }

    let index: usize = match components.next() {
        Some(Component::Normal(index)) => index
            .to_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(unexpected)?,
        _ => return Err(unexpected()),
    };

    let mut target = paths.get(index).ok_or_else(unexpected)?.to_path_buf();
    for component in components {
        match component {
            Component::Normal(part) => target.push(part),
            _ => return Err(unexpected()),
        }
    }

    Ok(target)
}
