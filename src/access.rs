//! Allow-list of user ids permitted to use the front-end.
//!
//! Stored as a flat JSON array of integers. A missing file is an empty list.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Errors from the allow-list store.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    /// Filesystem I/O failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a JSON array of integers.
    #[error("malformed allow-list {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// User ids are positive integers.
    #[error("invalid user id {0}")]
    InvalidUserId(i64),
}

/// Persistent list of allowed user ids.
#[derive(Debug, Clone)]
pub struct AllowList {
    path: PathBuf,
    users: Vec<i64>,
}

impl AllowList {
    /// Loads the allow-list at `path`; a missing file yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when the file exists but cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, AccessError> {
        let path = path.into();
        let users = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| AccessError::Json {
                path: path.clone(),
                source,
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(AccessError::Io { path, source }),
        };
        debug!(path = %path.display(), count = users.len(), "loaded allow-list");
        Ok(Self { path, users })
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allowed user ids in insertion order.
    #[must_use]
    pub fn list(&self) -> &[i64] {
        &self.users
    }

    /// Whether `user_id` may use the front-end. The admin is always allowed.
    #[must_use]
    pub fn is_allowed(&self, user_id: i64, admin_id: Option<i64>) -> bool {
        admin_id == Some(user_id) || self.users.contains(&user_id)
    }

    /// Adds a user and saves. Returns `false` if the user was already listed.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InvalidUserId`] for non-positive ids, or a save error.
    pub fn add(&mut self, user_id: i64) -> Result<bool, AccessError> {
        if user_id <= 0 {
            return Err(AccessError::InvalidUserId(user_id));
        }
        if self.users.contains(&user_id) {
            return Ok(false);
        }
        self.users.push(user_id);
        self.save()?;
        info!(user_id, "user allowed");
        Ok(true)
    }

    /// Removes a user and saves. Returns `false` if the user was not listed.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError::InvalidUserId`] for non-positive ids, or a save error.
    pub fn remove(&mut self, user_id: i64) -> Result<bool, AccessError> {
        if user_id <= 0 {
            return Err(AccessError::InvalidUserId(user_id));
        }
        let before = self.users.len();
        self.users.retain(|id| *id != user_id);
        if self.users.len() == before {
            return Ok(false);
        }
        self.save()?;
        info!(user_id, "user removed");
        Ok(true)
    }

    /// Writes the list to its file, replacing the previous content atomically.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] when serializing or writing fails.
    pub fn save(&self) -> Result<(), AccessError> {
        let json = serde_json::to_vec(&self.users).map_err(|source| AccessError::Json {
            path: self.path.clone(),
            source,
        })?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| io(&dir, e))?;
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| io(&dir, e))?;
        temp.write_all(&json).map_err(|e| io(temp.path(), e))?;
        temp.persist(&self.path).map_err(|e| io(&self.path, e.error))?;
        Ok(())
    }
}

fn io(path: &Path, source: std::io::Error) -> AccessError {
    AccessError::Io {
        path: path.to_path_buf(),
        source,
    }
}
