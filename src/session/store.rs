//! Persisted session: a JSON array of cookie records at a fixed path.
//!
//! Both the authenticator and the download client write this file, possibly
//! at overlapping times, so every save goes to a temporary file in the same
//! directory and is then renamed over the target.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use super::cookies::CookieRecord;

/// Errors for persisted session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    /// Filesystem I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file does not hold a JSON cookie array.
    #[error("malformed cookie file {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl SessionStoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads and writes the persisted cookie file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cookie file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads persisted cookies. Returns `Ok(None)` when no file exists.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when the file cannot be read or parsed.
    #[instrument(level = "debug", skip(self), fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<Option<Vec<CookieRecord>>, SessionStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(SessionStoreError::io(&self.path, error)),
        };
        let records: Vec<CookieRecord> =
            serde_json::from_slice(&bytes).map_err(|source| SessionStoreError::Json {
                path: self.path.clone(),
                source,
            })?;
        debug!(count = records.len(), "loaded persisted cookies");
        Ok(Some(records))
    }

    /// Replaces the persisted cookie set with `records`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError`] when serializing or writing fails.
    #[instrument(level = "debug", skip(self, records), fields(path = %self.path.display(), count = records.len()))]
    pub fn save(&self, records: &[CookieRecord]) -> Result<(), SessionStoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(|source| SessionStoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| SessionStoreError::io(&dir, e))?;

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| SessionStoreError::io(&dir, e))?;
        temp.write_all(&json)
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| SessionStoreError::io(temp.path(), e))?;
        set_owner_only_permissions(temp.path())?;
        temp.persist(&self.path)
            .map_err(|e| SessionStoreError::io(&self.path, e.error))?;

        debug!("persisted cookies");
        Ok(())
    }

    /// Deletes the persisted cookie file. Returns `true` if a file was removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionStoreError::Io`] when removal fails for a reason other than absence.
    pub fn clear(&self) -> Result<bool, SessionStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(error) => Err(SessionStoreError::io(&self.path, error)),
        }
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> Result<(), SessionStoreError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
        .map_err(|e| SessionStoreError::io(path, e))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> Result<(), SessionStoreError> {
    Ok(())
}
