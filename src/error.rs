//! Error types for the scraping core.
//!
//! Every failure that can cross the core boundary is a [`ScrapeError`]
//! variant with typed context. Retryable kinds (transport failures, soft
//! rate limits, a single expired session) are absorbed inside the search and
//! download clients; only final outcomes reach the caller.

use std::time::Duration;

use thiserror::Error;

use crate::handoff::SubmitError;
use crate::storage::StorageError;

/// Coarse classification of a [`ScrapeError`], for front-ends that map
/// failures to their own wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeErrorKind {
    /// Network, DNS, TLS or timeout failure.
    Transport,
    /// Login completed at the HTTP level but the auth cookies never arrived.
    AuthenticationFailure,
    /// The site kept answering HTTP 400, its throttling signal.
    RateLimited,
    /// Any other non-success status that outlived the retry budget.
    HttpStatus,
    /// A login form came back where authenticated content was expected.
    SessionExpired,
    /// Non-binary content without login markers where a torrent was expected.
    UnexpectedResponse,
    /// The server answered with a torrent content type but no bytes.
    EmptyPayload,
    /// The caller asked again before its cooldown elapsed.
    CoolingDown,
    /// Failure on this side of the exchange (client setup, storage, hand-off).
    Local,
}

/// Errors surfaced by the authenticator, search client and download client.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Network-level error (DNS resolution, connection refused, TLS errors).
    #[error("network error requesting {url} (attempt {attempts}): {source}")]
    Transport {
        /// The URL that failed.
        url: String,
        /// How many attempts were made before giving up.
        attempts: u32,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request did not complete within its timeout.
    #[error("timeout requesting {url} (attempt {attempts})")]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// How many attempts were made before giving up.
        attempts: u32,
    },

    /// Login finished without the two required session cookies.
    #[error("login failed: missing required cookies {missing:?} (observed: {observed:?})")]
    AuthenticationFailure {
        /// Names of the required cookies that were absent.
        missing: Vec<&'static str>,
        /// Names of the cookies the jar did hold for the site (values omitted).
        observed: Vec<String>,
    },

    /// The site kept answering HTTP 400 until the retry budget ran out.
    #[error("rate limited by {url}: HTTP {status} after {attempts} attempts")]
    RateLimited {
        /// The URL being requested.
        url: String,
        /// The last status seen (400 for this site).
        status: u16,
        /// Attempts made.
        attempts: u32,
    },

    /// A non-success status outlived the retry budget.
    #[error("HTTP {status} from {url} after {attempts} attempts")]
    HttpStatus {
        /// The URL being requested.
        url: String,
        /// The last status seen.
        status: u16,
        /// Attempts made.
        attempts: u32,
    },

    /// The response was a login page even after re-authenticating.
    #[error("session expired requesting {url}; re-authentication did not help")]
    SessionExpired {
        /// The URL that kept returning a login form.
        url: String,
    },

    /// A torrent was expected but the body was something else.
    #[error("unexpected {content_type:?} response for torrent {torrent_id}: {preview}")]
    UnexpectedResponse {
        /// The identifier being downloaded.
        torrent_id: String,
        /// The declared content type, if any.
        content_type: Option<String>,
        /// A short prefix of the body for diagnostics.
        preview: String,
    },

    /// The server sent a torrent content type with a zero-length body.
    #[error("empty torrent payload for {torrent_id}")]
    EmptyPayload {
        /// The identifier being downloaded.
        torrent_id: String,
    },

    /// The response body could not be read.
    #[error("failed to read response body from {url}: {source}")]
    Body {
        /// The URL whose body failed.
        url: String,
        /// The underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild {
        /// Why construction failed.
        reason: String,
    },

    /// Persisting the fetched payload failed.
    #[error("failed to store torrent {torrent_id}: {source}")]
    Storage {
        /// The identifier being stored.
        torrent_id: String,
        /// The storage collaborator's error.
        #[source]
        source: StorageError,
    },

    /// The download daemon did not accept the fetched torrent.
    #[error("failed to submit torrent {torrent_id}: {source}")]
    Submit {
        /// The identifier that was fetched.
        torrent_id: String,
        /// The submitter's error.
        #[source]
        source: SubmitError,
    },

    /// The caller must wait before searching again.
    #[error("user {user_id} must wait {remaining:?} before the next search")]
    CoolingDown {
        /// The user that was refused.
        user_id: i64,
        /// Time left until the next request is allowed.
        remaining: Duration,
    },
}

impl ScrapeError {
    /// Creates a transport error, promoting reqwest timeouts to [`ScrapeError::Timeout`].
    pub fn transport(url: impl Into<String>, attempts: u32, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                url: url.into(),
                attempts,
            }
        } else {
            Self::Transport {
                url: url.into(),
                attempts,
                source,
            }
        }
    }

    /// Creates a body-read error.
    pub fn body(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Body {
            url: url.into(),
            source,
        }
    }

    /// Creates a session-expired error.
    pub fn session_expired(url: impl Into<String>) -> Self {
        Self::SessionExpired { url: url.into() }
    }

    /// Creates an empty-payload error.
    pub fn empty_payload(torrent_id: impl Into<String>) -> Self {
        Self::EmptyPayload {
            torrent_id: torrent_id.into(),
        }
    }

    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ScrapeErrorKind {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Body { .. } => {
                ScrapeErrorKind::Transport
            }
            Self::AuthenticationFailure { .. } => ScrapeErrorKind::AuthenticationFailure,
            Self::RateLimited { .. } => ScrapeErrorKind::RateLimited,
            Self::HttpStatus { .. } => ScrapeErrorKind::HttpStatus,
            Self::SessionExpired { .. } => ScrapeErrorKind::SessionExpired,
            Self::UnexpectedResponse { .. } => ScrapeErrorKind::UnexpectedResponse,
            Self::EmptyPayload { .. } => ScrapeErrorKind::EmptyPayload,
            Self::CoolingDown { .. } => ScrapeErrorKind::CoolingDown,
            Self::ClientBuild { .. } | Self::Storage { .. } | Self::Submit { .. } => {
                ScrapeErrorKind::Local
            }
        }
    }
}
