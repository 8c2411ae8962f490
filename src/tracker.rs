//! Facade over the authenticator, search client and download client.
//!
//! [`Tracker`] owns the one live [`Session`] of the process. Operations clone
//! it out of the slot and release the lock before any network call; a session
//! renewed by a re-login inside an operation is written back afterwards.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::auth::Authenticator;
use crate::config::Config;
use crate::cooldown::UserCooldown;
use crate::download::{DownloadClient, DownloadOutcome};
use crate::error::ScrapeError;
use crate::handoff::TorrentSubmitter;
use crate::search::{Pause, SearchClient, SearchResult, TokioPause};
use crate::session::{Session, SessionStore};
use crate::storage::{FsTorrentStore, TorrentStore};

/// A torrent that was fetched and accepted by the download daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Listing identifier.
    pub torrent_id: String,
    /// Size of the torrent file in bytes.
    pub bytes: usize,
}

/// Entry point for front-ends.
pub struct Tracker {
    config: Arc<Config>,
    authenticator: Arc<Authenticator>,
    search: SearchClient,
    download: DownloadClient,
    torrents: Arc<dyn TorrentStore>,
    cooldown: UserCooldown,
    session: RwLock<Option<Session>>,
    login_gate: Mutex<()>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("site_url", &self.config.endpoints.site_url.as_str())
            .field("cooldown", &self.cooldown.cooldown())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Builds a tracker that sleeps on the tokio timer and stores files in
    /// the configured torrents directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ClientBuild`] when an HTTP client cannot be built.
    pub fn new(config: Config) -> Result<Self, ScrapeError> {
        let torrents = Arc::new(FsTorrentStore::new(config.torrents_dir.clone()));
        Self::with_parts(Arc::new(config), Arc::new(TokioPause), torrents)
    }

    /// Builds a tracker from explicit collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ClientBuild`] when an HTTP client cannot be built.
    pub fn with_parts(
        config: Arc<Config>,
        pause: Arc<dyn Pause>,
        torrents: Arc<dyn TorrentStore>,
    ) -> Result<Self, ScrapeError> {
        let store = SessionStore::new(config.cookie_file.clone());
        let authenticator = Arc::new(Authenticator::new(Arc::clone(&config), store));
        let search = SearchClient::new(
            Arc::clone(&config),
            Arc::clone(&authenticator),
            Arc::clone(&pause),
        );
        let download = DownloadClient::new(
            Arc::clone(&config),
            Arc::clone(&authenticator),
            Arc::clone(&torrents),
            pause,
        )?;
        Ok(Self {
            cooldown: UserCooldown::new(config.search_cooldown),
            config,
            authenticator,
            search,
            download,
            torrents,
            session: RwLock::new(None),
            login_gate: Mutex::new(()),
        })
    }

    /// The configuration this tracker was built with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The per-user search cooldown.
    #[must_use]
    pub fn cooldown(&self) -> &UserCooldown {
        &self.cooldown
    }

    /// Logs in unconditionally and makes the new session current.
    ///
    /// # Errors
    ///
    /// Any error from [`Authenticator::login`].
    pub async fn login(&self) -> Result<Session, ScrapeError> {
        let _gate = self.login_gate.lock().await;
        let session = self.authenticator.login().await?;
        self.replace_session(session.clone()).await;
        Ok(session)
    }

    /// Returns the current session, restoring or creating one on first use.
    ///
    /// Concurrent first callers share a single login.
    ///
    /// # Errors
    ///
    /// Any error from [`Authenticator::login`].
    pub async fn session(&self) -> Result<Session, ScrapeError> {
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let _gate = self.login_gate.lock().await;
        if let Some(session) = self.session.read().await.clone() {
            return Ok(session);
        }

        let session = match self.restore_persisted()? {
            Some(session) => session,
            None => self.authenticator.login().await?,
        };
        self.replace_session(session.clone()).await;
        Ok(session)
    }

    /// Searches with the current session.
    ///
    /// # Errors
    ///
    /// See [`SearchClient::search`].
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ScrapeError> {
        let session = self.session().await?;
        let outcome = self.search.search(&session, query).await?;
        if let Some(renewed) = outcome.renewed_session {
            self.replace_session(renewed).await;
        }
        Ok(outcome.results)
    }

    /// Searches on behalf of `user_id`, subject to the per-user cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::CoolingDown`] before the network is touched when
    /// the user searched too recently; otherwise see [`SearchClient::search`].
    #[instrument(skip(self))]
    pub async fn search_as(
        &self,
        user_id: i64,
        query: &str,
    ) -> Result<Vec<SearchResult>, ScrapeError> {
        if !self.cooldown.check_and_record(user_id) {
            let remaining = self.cooldown.remaining(user_id);
            debug!(?remaining, "search refused during cooldown");
            return Err(ScrapeError::CoolingDown { user_id, remaining });
        }
        self.search(query).await
    }

    /// Downloads and stores the torrent for `torrent_id`.
    ///
    /// # Errors
    ///
    /// See [`DownloadClient::download`].
    pub async fn download(&self, torrent_id: &str) -> Result<DownloadOutcome, ScrapeError> {
        let current = self.session.read().await.clone();
        let outcome = self.download.download(current.as_ref(), torrent_id).await?;
        if let Some(renewed) = &outcome.renewed_session {
            self.replace_session(renewed.clone()).await;
        }
        Ok(outcome)
    }

    /// Downloads a torrent, submits it into `download_dir`, and removes the
    /// stored file again.
    ///
    /// # Errors
    ///
    /// Download errors as in [`Tracker::download`], or [`ScrapeError::Submit`].
    #[instrument(skip(self, submitter))]
    pub async fn fetch_and_submit(
        &self,
        torrent_id: &str,
        download_dir: &Path,
        submitter: &dyn TorrentSubmitter,
    ) -> Result<Submission, ScrapeError> {
        let outcome = self.download(torrent_id).await?;
        let submitted = submitter.submit(&outcome.path, download_dir).await;
        self.discard(&outcome.path).await;

        submitted.map_err(|source| ScrapeError::Submit {
            torrent_id: torrent_id.to_string(),
            source,
        })?;
        info!(torrent_id, "torrent handed to download daemon");
        Ok(Submission {
            torrent_id: torrent_id.to_string(),
            bytes: outcome.bytes,
        })
    }

    async fn discard(&self, path: &Path) {
        if let Err(error) = self.torrents.cleanup(path).await {
            warn!(path = %path.display(), error = %error, "failed to remove torrent file");
        }
    }

    fn restore_persisted(&self) -> Result<Option<Session>, ScrapeError> {
        match self.authenticator.store().load() {
            Ok(Some(records)) => Session::restore(&records, &self.config),
            Ok(None) => Ok(None),
            Err(error) => {
                warn!(error = %error, "ignoring unreadable cookie file");
                Ok(None)
            }
        }
    }

    async fn replace_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }
}
