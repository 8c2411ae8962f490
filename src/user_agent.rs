//! Browser-like header sets for site traffic.
//!
//! The site rejects requests that do not look like they come from a desktop
//! browser, so every request carries one of these header sets. None of them
//! advertise `Accept-Encoding`: responses are read undecompressed.

use reqwest::RequestBuilder;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, ORIGIN, REFERER, USER_AGENT};

/// User-Agent for login and search requests.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";

/// User-Agent for the download host.
pub const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";

const HTML_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
    image/avif,image/webp,image/apng,*/*;q=0.8";

const DOWNLOAD_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,\
    image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";

const RU_ACCEPT_LANGUAGE: &str = "ru-RU,ru;q=0.9,en-US;q=0.8,en;q=0.7";

/// Headers for the login form POST.
pub(crate) fn login_headers(request: RequestBuilder, site_root: &str) -> RequestBuilder {
    request
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .header(ACCEPT, HTML_ACCEPT)
        .header(ACCEPT_LANGUAGE, RU_ACCEPT_LANGUAGE)
        .header(REFERER, site_root)
        .header(ORIGIN, site_root.trim_end_matches('/'))
}

/// Headers for a same-origin page navigation (root page, search).
pub(crate) fn navigation_headers(request: RequestBuilder, site_root: &str) -> RequestBuilder {
    request
        .header(USER_AGENT, BROWSER_USER_AGENT)
        .header(ACCEPT, HTML_ACCEPT)
        .header(ACCEPT_LANGUAGE, RU_ACCEPT_LANGUAGE)
        .header(REFERER, site_root)
        .header("Upgrade-Insecure-Requests", "1")
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "same-origin")
}

/// Headers for a download-host request coming from the item's detail page.
pub(crate) fn download_headers(request: RequestBuilder, details_url: &str) -> RequestBuilder {
    request
        .header(USER_AGENT, DOWNLOAD_USER_AGENT)
        .header(ACCEPT, DOWNLOAD_ACCEPT)
        .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .header(REFERER, details_url)
        .header(
            "Sec-CH-UA",
            r#""Chromium";v="130", "Google Chrome";v="130", "Not?A_Brand";v="99""#,
        )
        .header("Sec-CH-UA-Mobile", "?0")
        .header("Sec-CH-UA-Platform", r#""macOS""#)
        .header("Sec-Fetch-Dest", "document")
        .header("Sec-Fetch-Mode", "navigate")
        .header("Sec-Fetch-Site", "same-site")
        .header("Upgrade-Insecure-Requests", "1")
}
