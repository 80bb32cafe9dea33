//! Static catalog snapshot for the frontend fallback
//!
//! The file is written to a temporary sibling and renamed into place, so
//! readers see either the previous snapshot or the new one, never a torn
//! write. Publishing the same catalog twice yields byte-identical files.

use parostok_provenance::Catalog;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Snapshot write/read failures
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Filesystem failure
    #[error("snapshot io at {path}: {source}")]
    Io {
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Catalog could not be encoded or decoded
    #[error("snapshot encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Background write task died
    #[error("snapshot task failed: {0}")]
    Task(String),
}

/// What a successful publish produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotReceipt {
    /// Final location
    pub path: PathBuf,
    /// Bytes written
    pub bytes: usize,
    /// SHA-256 of the file contents, hex
    pub digest: String,
    /// Hybrids in the snapshot
    pub hybrids: usize,
}

/// Writes the catalog to a fixed path
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    path: PathBuf,
}

impl SnapshotPublisher {
    /// Create publisher for `path`
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Target path
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and atomically replace the snapshot file
    ///
    /// # Errors
    /// `Io` when the directory or file cannot be written; the previous
    /// snapshot is left untouched in that case.
    pub async fn publish(&self, catalog: &Catalog) -> Result<SnapshotReceipt, SnapshotError> {
        let mut bytes = serde_json::to_vec_pretty(catalog)?;
        bytes.push(b'\n');
        let hybrids = catalog.hybrid_count();
        let path = self.path.clone();

        let receipt = tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|err| SnapshotError::Task(err.to_string()))??;

        let receipt = SnapshotReceipt { hybrids, ..receipt };
        tracing::info!(
            path = %receipt.path.display(),
            bytes = receipt.bytes,
            hybrids = receipt.hybrids,
            digest = %&receipt.digest[..12],
            "published catalog snapshot"
        );
        Ok(receipt)
    }

    /// Read the current snapshot back
    ///
    /// # Errors
    /// `Io` if the file is missing or unreadable, `Encoding` if it is not a
    /// catalog.
    pub async fn load(&self) -> Result<Catalog, SnapshotError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<SnapshotReceipt, SnapshotError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| SnapshotError::Io { path, source }
    };

    std::fs::create_dir_all(&dir).map_err(io_err(&dir))?;
    let mut file = NamedTempFile::new_in(&dir).map_err(io_err(&dir))?;
    file.write_all(bytes).map_err(io_err(file.path()))?;
    file.as_file().sync_all().map_err(io_err(file.path()))?;
    file.persist(path)
        .map_err(|err| SnapshotError::Io {
            path: path.to_path_buf(),
            source: err.error,
        })?;

    Ok(SnapshotReceipt {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        digest: hex::encode(Sha256::digest(bytes)),
        hybrids: 0,
    })
}
