//! Cookie records and the recording cookie store.
//!
//! reqwest's [`Jar`] sends cookies but cannot enumerate them with their
//! attributes. [`SessionJar`] wraps a `Jar` and keeps a parallel list of
//! [`CookieRecord`]s built from every `Set-Cookie` header it sees, so the
//! full cookie set can be persisted and re-attached by hand later.

use std::fmt;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use url::Url;

/// A single cookie with the attributes needed to restore it.
///
/// The value is redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Cookie name.
    pub name: String,
    value: String,
    /// Domain without a leading dot.
    pub domain: String,
    /// True when the cookie was set without a `Domain` attribute.
    #[serde(default)]
    pub host_only: bool,
    /// URL path scope.
    pub path: String,
    /// Unix timestamp of expiry; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<u64>,
    /// Only sent over HTTPS.
    #[serde(default)]
    pub secure: bool,
    /// Not exposed to scripts.
    #[serde(default)]
    pub http_only: bool,
}

impl CookieRecord {
    /// Creates a domain cookie valid for `domain` and its subdomains.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        let domain = domain.into();
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.trim_start_matches('.').to_ascii_lowercase(),
            host_only: false,
            path: path.into(),
            expires: None,
            secure: false,
            http_only: false,
        }
    }

    /// Sets the expiry timestamp.
    #[must_use]
    pub fn with_expires(mut self, expires: Option<u64>) -> Self {
        self.expires = expires;
        self
    }

    /// Restricts the cookie to exactly its domain, as if set without `Domain`.
    #[must_use]
    pub fn as_host_only(mut self) -> Self {
        self.host_only = true;
        self
    }

    /// Returns the cookie value. Never log it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Parses a `Set-Cookie` header received from `request_url`.
    ///
    /// Returns `None` for headers without a `name=value` pair.
    #[must_use]
    pub fn parse_set_cookie(header: &str, request_url: &Url, now: SystemTime) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let request_host = request_url.host_str()?.to_ascii_lowercase();
        let mut record = Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: request_host.clone(),
            host_only: true,
            path: default_path(request_url),
            expires: None,
            secure: false,
            http_only: false,
        };

        let mut max_age: Option<i64> = None;
        for attribute in parts {
            let (key, attr_value) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attribute.trim(), ""),
            };
            match key.to_ascii_lowercase().as_str() {
                "domain" if !attr_value.is_empty() => {
                    let domain = attr_value.trim_start_matches('.').to_ascii_lowercase();
                    if domain_matches(&request_host, &domain) {
                        record.domain = domain;
                        record.host_only = false;
                    } else {
                        warn!(cookie = %record.name, domain = %domain, "ignoring cookie for foreign domain");
                        return None;
                    }
                }
                "path" if attr_value.starts_with('/') => record.path = attr_value.to_string(),
                "expires" => {
                    if let Ok(at) = httpdate::parse_http_date(attr_value) {
                        record.expires = Some(unix_secs(at));
                    }
                }
                "max-age" => max_age = attr_value.parse::<i64>().ok(),
                "secure" => record.secure = true,
                "httponly" => record.http_only = true,
                _ => {}
            }
        }

        if let Some(seconds) = max_age {
            record.expires = Some(if seconds <= 0 {
                0
            } else {
                unix_secs(now).saturating_add(seconds.unsigned_abs())
            });
        }

        Some(record)
    }

    /// Whether the cookie is past its expiry at `now`.
    #[must_use]
    pub fn is_expired(&self, now: SystemTime) -> bool {
        self.expires.is_some_and(|at| at <= unix_secs(now))
    }

    /// Whether two records denote the same cookie slot.
    #[must_use]
    pub fn same_slot(&self, other: &Self) -> bool {
        self.name == other.name && self.domain == other.domain && self.path == other.path
    }

    fn to_set_cookie(&self) -> String {
        let mut parts = vec![format!("{}={}", self.name, self.value)];
        if !self.host_only {
            parts.push(format!("Domain={}", self.domain));
        }
        parts.push(format!("Path={}", self.path));
        if self.secure {
            parts.push("Secure".to_string());
        }
        if self.http_only {
            parts.push("HttpOnly".to_string());
        }
        if let Some(at) = self.expires
            && let Some(time) = UNIX_EPOCH.checked_add(Duration::from_secs(at))
        {
            parts.push(format!("Expires={}", httpdate::fmt_http_date(time)));
        }
        parts.join("; ")
    }

    fn origin_url(&self) -> Option<Url> {
        let scheme = if self.secure { "https" } else { "http" };
        Url::parse(&format!("{scheme}://{}{}", self.domain, self.path)).ok()
    }
}

impl fmt::Debug for CookieRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieRecord")
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .field("domain", &self.domain)
            .field("host_only", &self.host_only)
            .field("path", &self.path)
            .field("expires", &self.expires)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .finish()
    }
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn domain_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

// RFC 6265 default-path: the request path up to, not including, its last '/'.
fn default_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Cookie store that sends cookies like [`Jar`] and remembers every cookie
/// it was given as a [`CookieRecord`].
#[derive(Debug, Default)]
pub struct SessionJar {
    jar: Jar,
    records: RwLock<Vec<CookieRecord>>,
}

impl SessionJar {
    /// Builds a jar pre-loaded with `records`; expired ones are skipped.
    #[must_use]
    pub fn from_records(records: &[CookieRecord]) -> Self {
        let jar = Self::default();
        jar.merge(records.iter().cloned());
        jar
    }

    /// Returns all unexpired records.
    #[must_use]
    pub fn records(&self) -> Vec<CookieRecord> {
        let now = SystemTime::now();
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| !record.is_expired(now))
            .cloned()
            .collect()
    }

    /// Names of the cookies the jar would send to `url`.
    #[must_use]
    pub fn names_for(&self, url: &Url) -> Vec<String> {
        self.jar
            .cookies(url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| {
                header
                    .split(';')
                    .filter_map(|pair| pair.split_once('=').map(|(name, _)| name.trim()))
                    .filter(|name| !name.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Merges records into the jar, replacing cookies in the same slot.
    ///
    /// An expired record deletes its slot.
    pub fn merge(&self, incoming: impl IntoIterator<Item = CookieRecord>) {
        let now = SystemTime::now();
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        for record in incoming {
            records.retain(|existing| !existing.same_slot(&record));
            if let Some(origin) = record.origin_url() {
                self.jar.add_cookie_str(&record.to_set_cookie(), &origin);
            } else {
                warn!(cookie = %record.name, domain = %record.domain, "skipping cookie with unusable domain");
                continue;
            }
            if record.is_expired(now) {
                debug!(cookie = %record.name, "cookie expired by server");
            } else {
                records.push(record);
            }
        }
    }
}

impl CookieStore for SessionJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        let now = SystemTime::now();
        let parsed: Vec<CookieRecord> = headers
            .iter()
            .filter_map(|header| header.to_str().ok())
            .filter_map(|header| CookieRecord::parse_set_cookie(header, url, now))
            .collect();
        trace!(url = %url, count = parsed.len(), "recording cookies");

        {
            let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
            for record in parsed {
                records.retain(|existing| !existing.same_slot(&record));
                if !record.is_expired(now) {
                    records.push(record);
                }
            }
        }

        self.jar.set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }
}
