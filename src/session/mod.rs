//! Authenticated session: a cookie jar plus the client that carries it.
//!
//! A session is only usable while both [`REQUIRED_COOKIES`] are present for
//! the site URL. Without either it is treated as never authenticated.

pub mod cookies;
pub mod store;

use std::fmt;
use std::sync::Arc;

use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::ScrapeError;
use crate::http_client::build_site_client;

pub use cookies::{CookieRecord, SessionJar};
pub use store::{SessionStore, SessionStoreError};

/// Session-id cookie set by a successful login.
pub const SESSION_ID_COOKIE: &str = "uid";

/// Auth-token cookie set by a successful login.
pub const AUTH_TOKEN_COOKIE: &str = "pass";

/// Cookies that must all be present for a session to be usable.
pub const REQUIRED_COOKIES: [&str; 2] = [SESSION_ID_COOKIE, AUTH_TOKEN_COOKIE];

/// Cookie-bearing transport for site requests.
///
/// Cheap to clone; clones share the same jar.
#[derive(Clone)]
pub struct Session {
    client: Client,
    jar: Arc<SessionJar>,
    site_url: Url,
}

impl Session {
    pub(crate) fn new(client: Client, jar: Arc<SessionJar>, site_url: Url) -> Self {
        Self {
            client,
            jar,
            site_url,
        }
    }

    /// Rebuilds a session from persisted cookie records.
    ///
    /// Returns `Ok(None)` when the records do not hold both required cookies.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::ClientBuild`] when the HTTP client cannot be built.
    pub fn restore(records: &[CookieRecord], config: &Config) -> Result<Option<Self>, ScrapeError> {
        let jar = Arc::new(SessionJar::from_records(records));
        let site_url = config.endpoints.site_url.clone();
        let client = build_site_client(Some(Arc::clone(&jar)), config.request_timeout)?;
        let session = Self::new(client, jar, site_url);

        let missing = session.missing_required();
        if missing.is_empty() {
            debug!(cookies = records.len(), "restored persisted session");
            Ok(Some(session))
        } else {
            debug!(?missing, "persisted session lacks required cookies");
            Ok(None)
        }
    }

    /// The HTTP client whose cookie provider is this session's jar.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The site base URL the session was established against.
    #[must_use]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    /// All unexpired cookie records held by the session.
    #[must_use]
    pub fn cookies(&self) -> Vec<CookieRecord> {
        self.jar.records()
    }

    /// Names of the cookies the session sends to the site.
    #[must_use]
    pub fn cookie_names(&self) -> Vec<String> {
        self.jar.names_for(&self.site_url)
    }

    /// Required cookies that are absent for the site URL.
    #[must_use]
    pub fn missing_required(&self) -> Vec<&'static str> {
        let names = self.cookie_names();
        REQUIRED_COOKIES
            .into_iter()
            .filter(|required| !names.iter().any(|name| name == required))
            .collect()
    }

    /// Whether both required cookies are present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// A `Cookie` header value carrying every unexpired record.
    ///
    /// Used for hosts that do not share this session's jar.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let records = self.cookies();
        if records.is_empty() {
            return None;
        }
        Some(
            records
                .iter()
                .map(|record| format!("{}={}", record.name, record.value()))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Merges cookies received outside the jar (for example on the download host).
    ///
    /// A host-only cookie from another host takes over the slot of the
    /// site cookie with the same name and path, so a rotated token replaces
    /// the stale one instead of sitting next to it.
    pub fn absorb(&self, records: impl IntoIterator<Item = CookieRecord>) {
        let Some(site_host) = self.site_url.host_str().map(str::to_ascii_lowercase) else {
            self.jar.merge(records);
            return;
        };
        let current = self.jar.records();
        let rebound: Vec<CookieRecord> = records
            .into_iter()
            .map(|mut record| {
                if record.host_only && record.domain != site_host {
                    match current
                        .iter()
                        .find(|existing| existing.name == record.name && existing.path == record.path)
                    {
                        Some(existing) => {
                            record.domain.clone_from(&existing.domain);
                            record.host_only = existing.host_only;
                        }
                        None => record.domain.clone_from(&site_host),
                    }
                    debug!(cookie = %record.name, domain = %record.domain, "rebound foreign host cookie");
                }
                record
            })
            .collect();
        self.jar.merge(rebound);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("site_url", &self.site_url.as_str())
            .field("cookies", &self.cookie_names())
            .finish_non_exhaustive()
    }
}
