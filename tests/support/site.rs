//! Mock-site fixtures shared by the integration tests.

use std::path::Path;
use std::sync::Arc;

use encoding_rs::WINDOWS_1251;
use kinozal_core::{Config, CookieRecord, Credentials, Session, SiteEndpoints};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const LOGIN_FORM: &str = r#"<html><body><form method="post" action="/takelogin.php">
<input type="text" name="username"><input type="password" name="password">
<input type="submit" value="Войти"></form></body></html>"#;

/// A configuration pointing both the site and the download host at `server`.
pub fn config_for(server: &MockServer, dir: &Path) -> Config {
    let base = Url::parse(&format!("{}/", server.uri())).expect("mock uri is a URL");
    let mut config = Config::new(
        Credentials::new("alice", "secret"),
        SiteEndpoints::with_urls(base.clone(), base),
    );
    config.cookie_file = dir.join("kinozal_cookies.json");
    config.torrents_dir = dir.join("torrents");
    config.users_file = dir.join("users.json");
    config
}

/// Like [`config_for`], but the site answers as `localhost` while downloads
/// go to the server's IP, so the two hosts keep separate cookies.
pub fn split_host_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = config_for(server, dir);
    let port = server.address().port();
    config.endpoints.site_url =
        Url::parse(&format!("http://localhost:{port}/")).expect("localhost url");
    config
}

/// Cookie records a successful login would leave for the mock host.
pub fn auth_records(config: &Config) -> Vec<CookieRecord> {
    let host = config
        .endpoints
        .site_url
        .host_str()
        .expect("mock uri has a host")
        .to_string();
    vec![
        CookieRecord::new("uid", "1001", host.clone(), "/").as_host_only(),
        CookieRecord::new("pass", "hash", host, "/").as_host_only(),
    ]
}

/// An authenticated session without going through the login mocks.
pub fn seeded_session(config: &Config) -> Session {
    Session::restore(&auth_records(config), config)
        .expect("client builds")
        .expect("records carry both auth cookies")
}

/// Mounts the root page and a login endpoint that sets `cookies`.
///
/// The login POST must be hit exactly `expected_logins` times.
pub async fn mount_login(server: &MockServer, cookies: &[&str], expected_logins: u64) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Кинозал</html>"))
        .named("site root")
        .mount(server)
        .await;

    let mut response = ResponseTemplate::new(200).set_body_string("<html>ok</html>");
    for cookie in cookies {
        response = response.append_header("set-cookie", *cookie);
    }
    Mock::given(method("POST"))
        .and(path("/takelogin.php"))
        .respond_with(response)
        .expect(expected_logins)
        .named("login form")
        .mount(server)
        .await;
}

/// Mounts a working login that sets both auth cookies.
pub async fn mount_good_login(server: &MockServer, expected_logins: u64) {
    mount_login(
        server,
        &["uid=1001; Path=/", "pass=hash; Path=/; HttpOnly"],
        expected_logins,
    )
    .await;
}

/// Encodes `text` the way the site serves pages.
pub fn cp1251(text: &str) -> Vec<u8> {
    WINDOWS_1251.encode(text).0.into_owned()
}

/// A Windows-1251 HTML response.
pub fn html_response(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=windows-1251")
        .set_body_bytes(cp1251(text))
}

/// A search results page with `(id, title, seeders, size)` rows in document order.
pub fn results_page(rows: &[(&str, &str, u32, &str)]) -> String {
    let body: String = rows
        .iter()
        .map(|(id, title, seeders, size)| {
            format!(
                r#"<tr class="bg"><td class="bt"><img src="/pic/cat/8.gif"></td>
<td class="nam"><a href="/details.php?id={id}" class="r0">{title}</a></td>
<td class="s">0</td><td class="s">{size}</td>
<td class="sl_s">{seeders}</td><td class="sl_p">1</td><td class="s">сегодня</td></tr>"#
            )
        })
        .collect();
    format!(
        r#"<html><head><meta charset="windows-1251"></head><body>
<table class="t_peer w100p"><tr class="mn"><td>Название</td><td>Комм.</td><td>Размер</td></tr>
{body}</table></body></html>"#
    )
}

/// Shares a config the way the components expect it.
pub fn shared(config: &Config) -> Arc<Config> {
    Arc::new(config.clone())
}
