//! Torrent file retrieval from the download host.
//!
//! The download host (`dl.<site>`) does not share the login/search jar, so
//! the session's cookies go out as an explicit `Cookie` header. Only an
//! `application/x-bittorrent` response counts as a torrent; anything else is
//! either a login page (re-login once and retry) or an unexpected response.
//! Network failures on the GET are retried with the search backoff schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use reqwest::{Client, Response};
use reqwest::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::http_client::build_site_client;
use crate::search::{Pause, RetryDecision, SearchFailure, SearchRetryPolicy, decode_site_text};
use crate::session::{CookieRecord, Session};
use crate::storage::TorrentStore;
use crate::user_agent::download_headers;

/// The only content type accepted as a torrent payload.
pub const TORRENT_CONTENT_TYPE: &str = "application/x-bittorrent";

const PREVIEW_CHARS: usize = 200;

// Form field markers match verbatim; word markers match case-insensitively.
const LOGIN_FIELD_MARKERS: [&str; 2] = [r#"name="username""#, r#"name="password""#];
const LOGIN_WORD_MARKERS: [&str; 2] = ["login", "вход"];

/// A stored torrent file.
#[derive(Debug)]
pub struct DownloadOutcome {
    /// Where the file-storage collaborator put the payload.
    pub path: PathBuf,
    /// Payload size in bytes.
    pub bytes: usize,
    /// The session used, when it differs from the one supplied (restored or re-logged-in).
    pub renewed_session: Option<Session>,
}

enum Attempt {
    Torrent {
        body: Vec<u8>,
        rotated: Vec<CookieRecord>,
    },
    LoginPage,
}

/// Fetches torrent files and hands them to a [`TorrentStore`].
pub struct DownloadClient {
    config: Arc<Config>,
    authenticator: Arc<Authenticator>,
    torrents: Arc<dyn TorrentStore>,
    pause: Arc<dyn Pause>,
    policy: SearchRetryPolicy,
    client: Client,
}

impl std::fmt::Debug for DownloadClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadClient")
            .field("download_url", &self.config.endpoints.download_url.as_str())
            .finish_non_exhaustive()
    }
}

impl DownloadClient {
    /// Creates a download client. `pause` performs the transport backoff waits.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ClientBuild`] when the HTTP client cannot be built.
    pub fn new(
        config: Arc<Config>,
        authenticator: Arc<Authenticator>,
        torrents: Arc<dyn TorrentStore>,
        pause: Arc<dyn Pause>,
    ) -> Result<Self, ScrapeError> {
        let client = build_site_client(None, config.request_timeout)?;
        Ok(Self {
            config,
            authenticator,
            torrents,
            pause,
            policy: SearchRetryPolicy::default(),
            client,
        })
    }

    /// Downloads the torrent for listing `torrent_id` and stores it.
    ///
    /// With no `session`, the persisted session is restored when usable and a
    /// fresh login happens otherwise.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Transport`] / [`ScrapeError::Timeout`] once network retries run out
    /// - [`ScrapeError::UnexpectedResponse`] for non-torrent content without login markers
    /// - [`ScrapeError::SessionExpired`] when a fresh login still yields a login page
    /// - [`ScrapeError::EmptyPayload`] for a zero-length torrent response
    /// - [`ScrapeError::Storage`] when the file-storage collaborator fails
    /// - any error from [`Authenticator::login`]
    #[instrument(skip(self, session), fields(torrent_id = %torrent_id))]
    pub async fn download(
        &self,
        session: Option<&Session>,
        torrent_id: &str,
    ) -> Result<DownloadOutcome, ScrapeError> {
        let (mut current, mut renewed_session) = match session {
            Some(session) => (session.clone(), None),
            None => {
                let session = self.restore_or_login().await?;
                (session.clone(), Some(session))
            }
        };

        let endpoints = &self.config.endpoints;
        let url = endpoints.download(torrent_id);
        let referer = endpoints.details(torrent_id);
        let mut relogged = false;

        let (body, rotated) = loop {
            match self.attempt(&current, &url, &referer, torrent_id).await? {
                Attempt::Torrent { body, rotated } => break (body, rotated),
                Attempt::LoginPage if relogged => {
                    warn!("login page persists after re-authentication");
                    return Err(ScrapeError::session_expired(url.as_str()));
                }
                Attempt::LoginPage => {
                    warn!("download returned a login page; re-authenticating");
                    current = self.authenticator.login().await?;
                    renewed_session = Some(current.clone());
                    relogged = true;
                }
            }
        };

        if body.is_empty() {
            warn!("torrent response carried no bytes");
            return Err(ScrapeError::empty_payload(torrent_id));
        }

        if !rotated.is_empty() {
            debug!(count = rotated.len(), "download host rotated cookies");
            current.absorb(rotated);
        }
        if let Err(error) = self.authenticator.store().save(&current.cookies()) {
            warn!(error = %error, "failed to persist session cookies after download");
        }

        let path = self
            .torrents
            .save(torrent_id, &body)
            .await
            .map_err(|source| ScrapeError::Storage {
                torrent_id: torrent_id.to_string(),
                source,
            })?;
        info!(path = %path.display(), bytes = body.len(), "torrent downloaded");

        Ok(DownloadOutcome {
            path,
            bytes: body.len(),
            renewed_session,
        })
    }

    async fn restore_or_login(&self) -> Result<Session, ScrapeError> {
        let store = self.authenticator.store();
        match store.load() {
            Ok(Some(records)) => {
                if let Some(session) = Session::restore(&records, &self.config)? {
                    return Ok(session);
                }
                debug!("persisted cookies lack a usable session");
            }
            Ok(None) => debug!("no persisted session"),
            Err(error) => warn!(error = %error, "ignoring unreadable cookie file"),
        }
        self.authenticator.login().await
    }

    async fn attempt(
        &self,
        session: &Session,
        url: &Url,
        referer: &Url,
        torrent_id: &str,
    ) -> Result<Attempt, ScrapeError> {
        let response = self.send_with_retry(session, url, referer).await?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "download host returned non-success status");
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let rotated = rotated_cookies(&response);
        let body = response
            .bytes()
            .await
            .map_err(|e| ScrapeError::body(url.as_str(), e))?;

        if is_torrent_content_type(content_type.as_deref()) {
            return Ok(Attempt::Torrent {
                body: body.to_vec(),
                rotated,
            });
        }

        let text = decode_site_text(&body);
        if has_login_markers(&text) {
            return Ok(Attempt::LoginPage);
        }

        warn!(content_type = ?content_type, status = status.as_u16(), "unexpected download response");
        Err(ScrapeError::UnexpectedResponse {
            torrent_id: torrent_id.to_string(),
            content_type,
            preview: preview(&text),
        })
    }

    async fn send_with_retry(
        &self,
        session: &Session,
        url: &Url,
        referer: &Url,
    ) -> Result<Response, ScrapeError> {
        let mut attempt = 1;
        loop {
            let mut request = download_headers(self.client.get(url.clone()), referer.as_str());
            if let Some(cookies) = session.cookie_header() {
                request = request.header(COOKIE, cookies);
            }
            let error = match request.send().await {
                Ok(response) => return Ok(response),
                Err(error) => error,
            };
            warn!(attempt, error = %error, "download request failed");
            match self.policy.should_retry(SearchFailure::Transport, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    debug!(?delay, next_attempt = next, "backing off before retry");
                    self.pause.pause(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => {
                    return Err(ScrapeError::transport(url.as_str(), attempt, error));
                }
            }
        }
    }
}

fn rotated_cookies(response: &Response) -> Vec<CookieRecord> {
    let now = SystemTime::now();
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|header| CookieRecord::parse_set_cookie(header, response.url(), now))
        .collect()
}

/// Whether a `Content-Type` value names the torrent media type (parameters ignored).
#[must_use]
pub fn is_torrent_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(TORRENT_CONTENT_TYPE))
}

/// Whether a non-torrent body looks like the site's login page.
#[must_use]
pub fn has_login_markers(text: &str) -> bool {
    if LOGIN_FIELD_MARKERS.iter().any(|marker| text.contains(marker)) {
        return true;
    }
    let lowered = text.to_lowercase();
    LOGIN_WORD_MARKERS.iter().any(|marker| lowered.contains(marker))
}

fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &collapsed[..cut]),
        None => collapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrent_content_type_ignores_parameters_and_case() {
        assert!(is_torrent_content_type(Some("application/x-bittorrent")));
        assert!(is_torrent_content_type(Some(
            "Application/X-BitTorrent; name=\"1.torrent\""
        )));
        assert!(!is_torrent_content_type(Some("text/html; charset=windows-1251")));
        assert!(!is_torrent_content_type(Some("application/octet-stream")));
        assert!(!is_torrent_content_type(None));
    }

    #[test]
    fn test_login_markers() {
        assert!(has_login_markers(r#"<input name="username">"#));
        assert!(has_login_markers(r#"<input name="password">"#));
        assert!(has_login_markers("<a href=\"/login.php\">Login</a>"));
        assert!(has_login_markers("<h1>ВХОД на сайт</h1>"));
        assert!(!has_login_markers("<h1>Раздача не найдена</h1>"));
    }

    #[test]
    fn test_preview_is_bounded() {
        let long = "а".repeat(500);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("  short \n page "), "short page");
    }
}
