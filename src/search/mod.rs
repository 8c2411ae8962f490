//! Search through an authenticated session.
//!
//! Each call pauses for [`COURTESY_DELAY`], then fetches the results page with
//! bounded retries (see [`retry`]). A login form in a 200 response means the
//! session died mid-search: the client logs in once and repeats the same
//! query. Pages are Windows-1251 and decoded before parsing.

pub mod parser;
pub mod retry;

use std::sync::Arc;

use encoding_rs::WINDOWS_1251;
use reqwest::StatusCode;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::error::ScrapeError;
use crate::session::Session;
use crate::user_agent::navigation_headers;

pub use parser::{NOTHING_FOUND_MARKER, SearchResult, contains_login_form, parse_search_results};
pub use retry::{
    COURTESY_DELAY, MAX_SEARCH_ATTEMPTS, Pause, RecordingPause, RetryDecision, SearchFailure,
    SearchRetryPolicy, TokioPause,
};

/// Results of one search call.
#[derive(Debug)]
pub struct SearchOutcome {
    /// Listings ordered by seeders, descending.
    pub results: Vec<SearchResult>,
    /// The session created by a mid-search re-login, if one happened.
    ///
    /// Callers holding a shared session should replace theirs with it.
    pub renewed_session: Option<Session>,
}

/// Issues search queries and recovers from throttling and session loss.
pub struct SearchClient {
    config: Arc<Config>,
    authenticator: Arc<Authenticator>,
    pause: Arc<dyn Pause>,
    policy: SearchRetryPolicy,
}

impl std::fmt::Debug for SearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

enum LastFailure {
    Transport(reqwest::Error),
    Status(u16),
}

impl SearchClient {
    /// Creates a search client. `pause` performs the courtesy and backoff waits.
    #[must_use]
    pub fn new(config: Arc<Config>, authenticator: Arc<Authenticator>, pause: Arc<dyn Pause>) -> Self {
        Self {
            config,
            authenticator,
            pause,
            policy: SearchRetryPolicy::default(),
        }
    }

    /// Searches for `query` and returns listings ordered by seeders.
    ///
    /// An empty result list (including the site's "nothing found" page) is
    /// success.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::RateLimited`] after repeated HTTP 400
    /// - [`ScrapeError::HttpStatus`] after repeated other non-200 statuses
    /// - [`ScrapeError::Transport`] / [`ScrapeError::Timeout`] after repeated network failures
    /// - [`ScrapeError::SessionExpired`] when a fresh login still yields a login page
    /// - any error from [`Authenticator::login`] during re-authentication
    #[instrument(skip(self, session), fields(query = %query))]
    pub async fn search(&self, session: &Session, query: &str) -> Result<SearchOutcome, ScrapeError> {
        let url = self.config.endpoints.search(query);
        let mut current = session.clone();
        let mut renewed_session = None;

        loop {
            self.pause.pause(COURTESY_DELAY).await;
            let body = self.fetch_with_retry(&current, &url).await?;
            let page = decode_site_text(&body);

            if contains_login_form(&page) {
                if renewed_session.is_some() {
                    warn!("login page persists after re-authentication");
                    return Err(ScrapeError::session_expired(url.as_str()));
                }
                warn!("session expired during search; re-authenticating");
                let fresh = self.authenticator.login().await?;
                current = fresh.clone();
                renewed_session = Some(fresh);
                continue;
            }

            let results = parse_search_results(&page);
            info!(count = results.len(), "search finished");
            return Ok(SearchOutcome {
                results,
                renewed_session,
            });
        }
    }

    async fn fetch_with_retry(&self, session: &Session, url: &Url) -> Result<Vec<u8>, ScrapeError> {
        let mut attempt = 1;
        loop {
            debug!(attempt, "requesting results page");
            let request = navigation_headers(
                session.client().get(url.clone()),
                session.site_url().as_str(),
            );
            let (failure, last) = match request.send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    match response.bytes().await {
                        Ok(body) => return Ok(body.to_vec()),
                        Err(error) => {
                            warn!(attempt, error = %error, "failed reading results page");
                            (SearchFailure::Transport, LastFailure::Transport(error))
                        }
                    }
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    warn!(attempt, status, "search returned non-200 status");
                    (SearchFailure::from_status(status), LastFailure::Status(status))
                }
                Err(error) => {
                    warn!(attempt, error = %error, "search request failed");
                    (SearchFailure::Transport, LastFailure::Transport(error))
                }
            };

            match self.policy.should_retry(failure, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next,
                } => {
                    debug!(?delay, next_attempt = next, "backing off before retry");
                    self.pause.pause(delay).await;
                    attempt = next;
                }
                RetryDecision::GiveUp => {
                    return Err(match last {
                        LastFailure::Transport(source) => {
                            ScrapeError::transport(url.as_str(), attempt, source)
                        }
                        LastFailure::Status(400) => ScrapeError::RateLimited {
                            url: url.to_string(),
                            status: 400,
                            attempts: attempt,
                        },
                        LastFailure::Status(status) => ScrapeError::HttpStatus {
                            url: url.to_string(),
                            status,
                            attempts: attempt,
                        },
                    });
                }
            }
        }
    }
}

/// Decodes a site page from Windows-1251. Undecodable bytes become U+FFFD.
#[must_use]
pub fn decode_site_text(bytes: &[u8]) -> String {
    let (text, _, had_errors) = WINDOWS_1251.decode(bytes);
    if had_errors {
        debug!("page contained bytes outside windows-1251");
    }
    text.into_owned()
}
