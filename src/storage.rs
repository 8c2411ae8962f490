//! Where fetched torrent files land.
//!
//! The download client only sees the narrow [`TorrentStore`] contract; the
//! filesystem layout belongs to [`FsTorrentStore`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

/// Errors from a [`TorrentStore`].
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Filesystem I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The identifier cannot be turned into a file name.
    #[error("identifier {id:?} does not form a usable file name")]
    InvalidId {
        /// The rejected identifier.
        id: String,
    },
}

impl StorageError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// File-storage collaborator for fetched payloads.
#[async_trait]
pub trait TorrentStore: Send + Sync {
    /// Stores `bytes` for listing `id` and returns the stored path.
    async fn save(&self, id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError>;

    /// Removes a stored file.
    async fn cleanup(&self, path: &Path) -> Result<(), StorageError>;

    /// Size of a stored file in bytes; zero when it cannot be read.
    async fn size(&self, path: &Path) -> u64;
}

/// Stores payloads as `<dir>/<id>.torrent`.
#[derive(Debug, Clone)]
pub struct FsTorrentStore {
    dir: PathBuf,
}

impl FsTorrentStore {
    /// Creates a store rooted at `dir`; the directory is created on first save.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The path a payload for `id` is stored at.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidId`] when nothing usable is left after sanitizing.
    pub fn path_for(&self, id: &str) -> Result<PathBuf, StorageError> {
        let stem = sanitize_id(id);
        if stem.is_empty() {
            return Err(StorageError::InvalidId { id: id.to_string() });
        }
        Ok(self.dir.join(format!("{stem}.torrent")))
    }
}

#[async_trait]
impl TorrentStore for FsTorrentStore {
    async fn save(&self, id: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.path_for(id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?;
        if let Err(error) = tokio::fs::write(&path, bytes).await {
            debug!(path = %path.display(), "removing partial file after write error");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StorageError::io(path, error));
        }
        debug!(path = %path.display(), bytes = bytes.len(), "stored torrent file");
        Ok(path)
    }

    async fn cleanup(&self, path: &Path) -> Result<(), StorageError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed torrent file");
                Ok(())
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(StorageError::io(path, error)),
        }
    }

    async fn size(&self, path: &Path) -> u64 {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(error) => {
                warn!(path = %path.display(), error = %error, "cannot stat torrent file");
                0
            }
        }
    }
}

// Identifiers are numeric in practice but come from scraped hrefs.
fn sanitize_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut prev_sep = false;
    for ch in id.trim().chars() {
        let mapped = if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
            }
            prev_sep = true;
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    out.trim_matches('_').to_string()
}
