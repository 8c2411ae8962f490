//! Login handshake against the site.
//!
//! The flow is a GET of the site root (seeds anti-bot cookies and follows any
//! redirect chain) followed by the form POST. Success is judged only by the
//! presence of both required cookies in the jar; status codes and bodies are
//! not meaningful for this endpoint.

use std::sync::Arc;

use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info, instrument, warn};
use url::form_urlencoded;

use crate::config::Config;
use crate::error::ScrapeError;
use crate::http_client::build_site_client;
use crate::session::{REQUIRED_COOKIES, Session, SessionJar, SessionStore};
use crate::user_agent::{login_headers, navigation_headers};

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Performs logins and persists the resulting cookie set.
#[derive(Debug, Clone)]
pub struct Authenticator {
    config: Arc<Config>,
    store: SessionStore,
}

impl Authenticator {
    /// Creates an authenticator that persists sessions through `store`.
    #[must_use]
    pub fn new(config: Arc<Config>, store: SessionStore) -> Self {
        Self { config, store }
    }

    /// The store sessions are persisted to.
    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Logs in with the configured credentials and returns a fresh session.
    ///
    /// No retries happen here; callers decide whether to try again.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::Transport`] / [`ScrapeError::Timeout`] when either request fails
    /// - [`ScrapeError::AuthenticationFailure`] when the required cookies are absent
    #[instrument(skip(self), fields(user = %self.config.credentials.username))]
    pub async fn login(&self) -> Result<Session, ScrapeError> {
        let endpoints = &self.config.endpoints;
        let jar = Arc::new(SessionJar::default());
        let login_client = build_site_client(Some(Arc::clone(&jar)), self.config.login_timeout)?;

        let root = endpoints.root();
        let root_str = root.as_str();
        let landing = navigation_headers(login_client.get(root.clone()), root_str)
            .send()
            .await
            .map_err(|e| ScrapeError::transport(root_str, 1, e))?;
        debug!(status = landing.status().as_u16(), "loaded site root");
        drop(landing);

        let login_url = endpoints.login();
        let credentials = &self.config.credentials;
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("username", &credentials.username)
            .append_pair("password", credentials.password())
            .append_pair("returnto", "/")
            .append_pair("before", "//")
            .append_pair("auth_submit_login", "submit")
            .finish();
        let response = login_headers(login_client.post(login_url.clone()), root_str)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(form)
            .send()
            .await
            .map_err(|e| ScrapeError::transport(login_url.as_str(), 1, e))?;
        debug!(
            status = response.status().as_u16(),
            final_url = %response.url(),
            "login form submitted"
        );
        drop(response);

        let observed = jar.names_for(&endpoints.site_url);
        let missing: Vec<&'static str> = REQUIRED_COOKIES
            .into_iter()
            .filter(|required| !observed.iter().any(|name| name == required))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, ?observed, "login did not yield the session cookies");
            return Err(ScrapeError::AuthenticationFailure { missing, observed });
        }

        let client = build_site_client(Some(Arc::clone(&jar)), self.config.request_timeout)?;
        let session = Session::new(client, jar, endpoints.site_url.clone());

        if let Err(error) = self.store.save(&session.cookies()) {
            warn!(error = %error, "failed to persist session cookies");
        }
        info!(cookies = ?session.cookie_names(), "logged in");
        Ok(session)
    }
}
