//! Process configuration read from the environment.
//!
//! All settings are resolved once at start-up into an immutable [`Config`]
//! and handed to the core by reference.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Default site address when `KZ_ADDR` is unset.
pub const DEFAULT_SITE_ADDRESS: &str = "kinozal.tv";

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Default timeout for the multi-step login flow in seconds.
pub const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 30;

/// Default per-user search cooldown in seconds.
pub const DEFAULT_SEARCH_COOLDOWN_SECS: u64 = 10;

/// Default allow-list file when `KZ_USERS_FILE` is unset.
pub const DEFAULT_USERS_FILE: &str = "users.json";

const LOGIN_PATH: &str = "/takelogin.php";
const SEARCH_PATH: &str = "/browse.php";
const DETAILS_PATH: &str = "/details.php";
const DOWNLOAD_PATH: &str = "/download.php";

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset or blank.
    #[error("{name} is required")]
    Missing {
        /// The environment variable name.
        name: &'static str,
    },
    /// A variable holds a value that does not parse or is out of range.
    #[error("invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        /// The environment variable name.
        name: &'static str,
        /// The raw value.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

/// Login credentials. The password is redacted from `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    /// Site account name.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials from a username and password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password. Never log the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Site addresses and endpoint paths.
#[derive(Debug, Clone)]
pub struct SiteEndpoints {
    /// Base URL of the main site (root page, login, search, details).
    pub site_url: Url,
    /// Base URL of the download host (`dl.<site-address>`).
    pub download_url: Url,
    /// Login endpoint path.
    pub login_path: String,
    /// Search endpoint path.
    pub search_path: String,
    /// Details page path.
    pub details_path: String,
    /// Download endpoint path on the download host.
    pub download_path: String,
}

impl SiteEndpoints {
    /// Builds endpoints for a bare site address such as `kinozal.tv`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not form a URL.
    pub fn for_address(address: &str) -> Result<Self, ConfigError> {
        let site_url = parse_base_url("KZ_ADDR", &format!("https://{address}/"))?;
        let download_url = parse_base_url("KZ_ADDR", &format!("https://dl.{address}/"))?;
        Ok(Self::with_urls(site_url, download_url))
    }

    /// Builds endpoints from explicit base URLs, keeping the fixed paths.
    #[must_use]
    pub fn with_urls(site_url: Url, download_url: Url) -> Self {
        Self {
            site_url,
            download_url,
            login_path: LOGIN_PATH.to_string(),
            search_path: SEARCH_PATH.to_string(),
            details_path: DETAILS_PATH.to_string(),
            download_path: DOWNLOAD_PATH.to_string(),
        }
    }

    /// The site root page.
    #[must_use]
    pub fn root(&self) -> Url {
        self.site_url.clone()
    }

    /// The login form target.
    #[must_use]
    pub fn login(&self) -> Url {
        join_path(&self.site_url, &self.login_path)
    }

    /// The search endpoint with the free-text query form-encoded as `s`.
    #[must_use]
    pub fn search(&self, query: &str) -> Url {
        let mut url = join_path(&self.site_url, &self.search_path);
        url.query_pairs_mut().append_pair("s", query);
        url
    }

    /// The details page of a listing, used as the download Referer.
    #[must_use]
    pub fn details(&self, torrent_id: &str) -> Url {
        let mut url = join_path(&self.site_url, &self.details_path);
        url.query_pairs_mut().append_pair("id", torrent_id);
        url
    }

    /// The download URL of a listing on the download host.
    #[must_use]
    pub fn download(&self, torrent_id: &str) -> Url {
        let mut url = join_path(&self.download_url, &self.download_path);
        url.query_pairs_mut().append_pair("id", torrent_id);
        url
    }
}

fn join_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let prefix = base.path().trim_end_matches('/');
    url.set_path(&format!("{prefix}/{}", path.trim_start_matches('/')));
    url.set_query(None);
    url
}

fn parse_base_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: "expected an absolute http(s) URL",
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "expected an absolute http(s) URL",
        });
    }
    Ok(url)
}

/// Immutable process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Site account.
    pub credentials: Credentials,
    /// Site addresses and paths.
    pub endpoints: SiteEndpoints,
    /// Persisted session (cookie) file.
    pub cookie_file: PathBuf,
    /// Directory where fetched torrent files are stored.
    pub torrents_dir: PathBuf,
    /// Allow-list file.
    pub users_file: PathBuf,
    /// Timeout applied to each search/download request.
    pub request_timeout: Duration,
    /// Timeout applied to each request of the login flow.
    pub login_timeout: Duration,
    /// Minimum time between two searches by the same user.
    pub search_cooldown: Duration,
    /// Administrator user id; always allowed.
    pub admin_id: Option<i64>,
}

impl Config {
    /// Builds a configuration with defaults for everything but the essentials.
    #[must_use]
    pub fn new(credentials: Credentials, endpoints: SiteEndpoints) -> Self {
        Self {
            credentials,
            endpoints,
            cookie_file: PathBuf::from("kinozal_cookies.json"),
            torrents_dir: PathBuf::from("torrents"),
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            login_timeout: Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECS),
            search_cooldown: Duration::from_secs(DEFAULT_SEARCH_COOLDOWN_SECS),
            admin_id: None,
        }
    }

    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a required variable is missing or a value is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let username = get("KZ_USER").ok_or(ConfigError::Missing { name: "KZ_USER" })?;
        // Passwords may legitimately start or end with spaces.
        let password = lookup("KZ_PASS")
            .filter(|value| !value.is_empty())
            .ok_or(ConfigError::Missing { name: "KZ_PASS" })?;

        let address = get("KZ_ADDR").unwrap_or_else(|| DEFAULT_SITE_ADDRESS.to_string());
        let mut endpoints = SiteEndpoints::for_address(&address)?;
        if let Some(raw) = get("KZ_SITE_URL") {
            endpoints.site_url = parse_base_url("KZ_SITE_URL", &raw)?;
        }
        if let Some(raw) = get("KZ_DOWNLOAD_URL") {
            endpoints.download_url = parse_base_url("KZ_DOWNLOAD_URL", &raw)?;
        }

        let mut config = Self::new(Credentials::new(username, password), endpoints);

        if let Some(path) = get("KZ_COOKIE_FILE") {
            config.cookie_file = PathBuf::from(path);
        }
        if let Some(path) = get("KZ_TORRENTS_DIR") {
            config.torrents_dir = PathBuf::from(path);
        }
        if let Some(path) = get("KZ_USERS_FILE") {
            config.users_file = PathBuf::from(path);
        }
        if let Some(raw) = get("KZ_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = parse_timeout_secs("KZ_REQUEST_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("KZ_LOGIN_TIMEOUT_SECS") {
            config.login_timeout = parse_timeout_secs("KZ_LOGIN_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("KZ_SEARCH_COOLDOWN_SECS") {
            let secs = raw.parse::<u64>().map_err(|_| ConfigError::Invalid {
                name: "KZ_SEARCH_COOLDOWN_SECS",
                value: raw.clone(),
                reason: "expected a non-negative integer",
            })?;
            config.search_cooldown = Duration::from_secs(secs);
        }
        if let Some(raw) = get("BOT_ADMIN_ID") {
            let id = raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                name: "BOT_ADMIN_ID",
                value: raw.clone(),
                reason: "expected an integer user id",
            })?;
            config.admin_id = Some(id);
        }

        Ok(config)
    }
}

/// Allow-list path from `KZ_USERS_FILE`, for commands that need no credentials.
#[must_use]
pub fn users_file_from_env() -> PathBuf {
    std::env::var("KZ_USERS_FILE")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_USERS_FILE), PathBuf::from)
}

fn parse_timeout_secs(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.parse::<u64>() {
        Ok(secs) if (1..=3600).contains(&secs) => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "expected seconds in 1..=3600",
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_from_lookup_requires_credentials() {
        let result = Config::from_lookup(lookup_from(&[("KZ_USER", "alice")]));
        assert!(matches!(result, Err(ConfigError::Missing { name: "KZ_PASS" })));

        let result = Config::from_lookup(lookup_from(&[("KZ_PASS", "secret")]));
        assert!(matches!(result, Err(ConfigError::Missing { name: "KZ_USER" })));
    }

    #[test]
    fn test_from_lookup_keeps_password_verbatim() {
        let config =
            Config::from_lookup(lookup_from(&[("KZ_USER", " alice "), ("KZ_PASS", " pa ss ")]))
                .unwrap();
        assert_eq!(config.credentials.username, "alice");
        assert_eq!(config.credentials.password(), " pa ss ");

        let result = Config::from_lookup(lookup_from(&[("KZ_USER", "alice"), ("KZ_PASS", "")]));
        assert!(matches!(result, Err(ConfigError::Missing { name: "KZ_PASS" })));
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config =
            Config::from_lookup(lookup_from(&[("KZ_USER", "alice"), ("KZ_PASS", "secret")]))
                .unwrap();
        assert_eq!(config.endpoints.site_url.as_str(), "https://kinozal.tv/");
        assert_eq!(config.endpoints.download_url.as_str(), "https://dl.kinozal.tv/");
        assert_eq!(config.cookie_file, PathBuf::from("kinozal_cookies.json"));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.login_timeout, Duration::from_secs(30));
        assert_eq!(config.search_cooldown, Duration::from_secs(10));
        assert_eq!(config.admin_id, None);
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("KZ_USER", "alice"),
            ("KZ_PASS", "secret"),
            ("KZ_ADDR", "kinozal.me"),
            ("KZ_REQUEST_TIMEOUT_SECS", "15"),
            ("KZ_COOKIE_FILE", "/tmp/c.json"),
            ("BOT_ADMIN_ID", "42"),
        ]))
        .unwrap();
        assert_eq!(config.endpoints.site_url.as_str(), "https://kinozal.me/");
        assert_eq!(config.endpoints.download_url.as_str(), "https://dl.kinozal.me/");
        assert_eq!(config.request_timeout, Duration::from_secs(15));
        assert_eq!(config.cookie_file, PathBuf::from("/tmp/c.json"));
        assert_eq!(config.admin_id, Some(42));
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_timeout() {
        let result = Config::from_lookup(lookup_from(&[
            ("KZ_USER", "alice"),
            ("KZ_PASS", "secret"),
            ("KZ_LOGIN_TIMEOUT_SECS", "0"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "KZ_LOGIN_TIMEOUT_SECS",
                ..
            })
        ));
    }

    #[test]
    fn test_from_lookup_rejects_non_http_site_url() {
        let result = Config::from_lookup(lookup_from(&[
            ("KZ_USER", "alice"),
            ("KZ_PASS", "secret"),
            ("KZ_SITE_URL", "ftp://example.com/"),
        ]));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                name: "KZ_SITE_URL",
                ..
            })
        ));
    }

    #[test]
    fn test_endpoint_urls() {
        let endpoints = SiteEndpoints::for_address("kinozal.tv").unwrap();
        assert_eq!(endpoints.login().as_str(), "https://kinozal.tv/takelogin.php");
        assert_eq!(
            endpoints.search("Матрица 1999").as_str(),
            "https://kinozal.tv/browse.php?s=%D0%9C%D0%B0%D1%82%D1%80%D0%B8%D1%86%D0%B0+1999"
        );
        assert_eq!(
            endpoints.details("1234").as_str(),
            "https://kinozal.tv/details.php?id=1234"
        );
        assert_eq!(
            endpoints.download("1234").as_str(),
            "https://dl.kinozal.tv/download.php?id=1234"
        );
    }

    #[test]
    fn test_endpoints_keep_base_path_prefix() {
        let endpoints = SiteEndpoints::with_urls(
            Url::parse("http://127.0.0.1:8080/mirror/").unwrap(),
            Url::parse("http://127.0.0.1:8080/").unwrap(),
        );
        assert_eq!(
            endpoints.login().as_str(),
            "http://127.0.0.1:8080/mirror/takelogin.php"
        );
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("alice", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("alice"));
        assert!(!debug.contains("hunter2"));
    }
}
