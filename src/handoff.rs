//! Hand-off of a fetched torrent file to the local download daemon.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Errors from a [`TorrentSubmitter`].
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The submitting program could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The daemon refused the torrent.
    #[error("{program} exited with {status}: {stderr}")]
    Rejected {
        /// Program name.
        program: String,
        /// Exit status as text.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// Registers a torrent file with a download daemon.
#[async_trait]
pub trait TorrentSubmitter: Send + Sync {
    /// Submits `torrent` for download into `download_dir`.
    async fn submit(&self, torrent: &Path, download_dir: &Path) -> Result<(), SubmitError>;
}

/// Submits through the `transmission-remote` command-line client.
#[derive(Debug, Clone)]
pub struct TransmissionRemote {
    program: String,
    connection_args: Vec<String>,
}

impl Default for TransmissionRemote {
    fn default() -> Self {
        Self::new("transmission-remote")
    }
}

impl TransmissionRemote {
    /// Uses `program` as the remote client.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            connection_args: Vec::new(),
        }
    }

    /// Arguments placed before the add command, such as `host:port` or `--auth`.
    #[must_use]
    pub fn with_connection_args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.connection_args = args.into_iter().collect();
        self
    }
}

#[async_trait]
impl TorrentSubmitter for TransmissionRemote {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn submit(&self, torrent: &Path, download_dir: &Path) -> Result<(), SubmitError> {
        let output = Command::new(&self.program)
            .args(&self.connection_args)
            .arg("--add")
            .arg(torrent)
            .arg("--download-dir")
            .arg(download_dir)
            .output()
            .await
            .map_err(|source| SubmitError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SubmitError::Rejected {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        debug!("torrent submitted");
        Ok(())
    }
}
