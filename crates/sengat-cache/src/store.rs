//! Blob storage behind the cache.
//!
//! The cache only needs `write`/`read`/`exists` keyed by
//! `(namespace, attribute, kind)`; which backend provides that is a caller
//! choice behind [`BlobStore`]. The bundled [`FsBlobStore`] lays blobs out
//! as `{root}/{namespace}/{attribute}.{extension}` — a stable naming
//! contract that external tooling may rely on for manual inspection and
//! clearing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{CacheError, CacheResult};
use crate::kind::StorageKind;

/// Key/value blob storage contract consumed by the cache driver.
pub trait BlobStore {
    /// Persist one attribute blob under a namespace.
    fn write(
        &self,
        namespace: &str,
        attr: &str,
        kind: StorageKind,
        bytes: &[u8],
    ) -> CacheResult<()>;

    /// Read one attribute blob back.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotCached`] if the blob does not exist.
    fn read(&self, namespace: &str, attr: &str, kind: StorageKind) -> CacheResult<Vec<u8>>;

    /// Whether the blob exists.
    fn exists(&self, namespace: &str, attr: &str, kind: StorageKind) -> bool;
}

/// Filesystem-backed blob store.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, namespace: &str, attr: &str, kind: StorageKind) -> PathBuf {
        self.root
            .join(namespace)
            .join(format!("{}.{}", attr, kind.extension()))
    }
}

impl BlobStore for FsBlobStore {
    fn write(
        &self,
        namespace: &str,
        attr: &str,
        kind: StorageKind,
        bytes: &[u8],
    ) -> CacheResult<()> {
        let path = self.blob_path(namespace, attr, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write via temp file + rename so readers never observe a torn blob.
        let temp_path = path.with_extension(format!("{}.tmp", kind.extension()));
        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "wrote cache blob");
        Ok(())
    }

    fn read(&self, namespace: &str, attr: &str, kind: StorageKind) -> CacheResult<Vec<u8>> {
        let path = self.blob_path(namespace, attr, kind);
        if !path.exists() {
            return Err(CacheError::NotCached {
                namespace: namespace.to_string(),
                attr: attr.to_string(),
            });
        }
        Ok(fs::read(&path)?)
    }

    fn exists(&self, namespace: &str, attr: &str, kind: StorageKind) -> bool {
        self.blob_path(namespace, attr, kind).exists()
    }
}
