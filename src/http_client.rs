//! Shared reqwest client construction for site traffic.
//!
//! Login/search clients carry a [`SessionJar`] as their cookie provider; the
//! download client has no jar and receives cookies as an explicit header.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, ClientBuilder, Proxy};
use tracing::warn;

use crate::error::ScrapeError;
use crate::session::cookies::SessionJar;

/// Connect timeout applied on top of the overall request timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds a client with the given request timeout and optional cookie jar.
///
/// Some sandboxed environments panic while reading system proxy settings;
/// in that case the client is rebuilt with only environment proxies.
///
/// # Errors
///
/// Returns [`ScrapeError::ClientBuild`] when reqwest rejects the configuration.
pub fn build_site_client(
    jar: Option<Arc<SessionJar>>,
    timeout: Duration,
) -> Result<Client, ScrapeError> {
    let primary = catch_unwind(AssertUnwindSafe({
        let jar = jar.clone();
        move || base_builder(jar, timeout).build()
    }));

    let built = match primary {
        Ok(result) => result,
        Err(_) => {
            warn!("HTTP client builder panicked loading system proxies; using env-proxy fallback");
            catch_unwind(AssertUnwindSafe(move || {
                apply_env_proxy_fallback(base_builder(jar, timeout).no_proxy()).build()
            }))
            .map_err(|_| ScrapeError::ClientBuild {
                reason: "client builder panicked during env-proxy fallback".to_string(),
            })?
        }
    };

    built.map_err(|error| ScrapeError::ClientBuild {
        reason: error.to_string(),
    })
}

fn base_builder(jar: Option<Arc<SessionJar>>, timeout: Duration) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .timeout(timeout);
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder
}

fn apply_env_proxy_fallback(mut builder: ClientBuilder) -> ClientBuilder {
    if let Some(proxy) = first_env(&["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::https(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    if let Some(proxy) = first_env(&["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"])
        && let Ok(resolved) = Proxy::http(&proxy)
    {
        builder = builder.proxy(resolved);
    }
    builder
}

fn first_env(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}
