//! Integration tests for searching through a mock site.

use std::sync::Arc;
use std::time::Duration;

use kinozal_core::{
    Authenticator, RecordingPause, ScrapeError, ScrapeErrorKind, SearchClient, SessionStore,
};
use tempfile::TempDir;
use wiremock::matchers::{header_exists, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::site::{
    LOGIN_FORM, config_for, html_response, mount_good_login, results_page, seeded_session, shared,
};
use support::socket_guard::start_mock_server_or_skip;

fn search_client(
    config: &kinozal_core::Config,
    pause: &Arc<RecordingPause>,
) -> SearchClient {
    let authenticator = Arc::new(Authenticator::new(
        shared(config),
        SessionStore::new(config.cookie_file.clone()),
    ));
    SearchClient::new(shared(config), authenticator, pause.clone())
}

#[tokio::test]
async fn test_search_orders_results_by_seeders() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let page = results_page(&[
        ("101", "Матрица / The Matrix (1999) BDRip", 5, "1.46 ГБ"),
        ("102", "Матрица / The Matrix (1999) 2160p", 20, "58.2 ГБ"),
    ]);
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .and(query_param("s", "Матрица"))
        .and(header_exists("cookie"))
        .respond_with(html_response(&page))
        .expect(1)
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let session = seeded_session(&config);
    let outcome = search_client(&config, &pause)
        .search(&session, "Матрица")
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 2);
    assert_eq!(outcome.results[0].seeders, 20);
    assert_eq!(outcome.results[0].id, "102");
    assert_eq!(outcome.results[0].size, "58.2 ГБ");
    assert_eq!(outcome.results[1].seeders, 5);
    assert_eq!(outcome.results[1].title, "Матрица / The Matrix (1999) BDRip");
    assert!(outcome.renewed_session.is_none());
    assert_eq!(pause.recorded(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn test_search_nothing_found_is_empty_success() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(
            "<html><body><div class=\"bx1\">По Вашему запросу ничего не найдено</div></body></html>",
        ))
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let outcome = search_client(&config, &pause)
        .search(&seeded_session(&config), "qwertyuiop")
        .await
        .unwrap();
    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_search_rate_limited_after_three_attempts() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(ResponseTemplate::new(400))
        .expect(3)
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let error = search_client(&config, &pause)
        .search(&seeded_session(&config), "Матрица")
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ScrapeErrorKind::RateLimited);
    assert!(matches!(
        error,
        ScrapeError::RateLimited {
            status: 400,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(
        pause.recorded(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(3),
            Duration::from_secs(6)
        ]
    );
}

#[tokio::test]
async fn test_search_other_status_uses_base_backoff() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let error = search_client(&config, &pause)
        .search(&seeded_session(&config), "x")
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ScrapeError::HttpStatus {
            status: 503,
            attempts: 3,
            ..
        }
    ));
    assert_eq!(
        pause.recorded(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[tokio::test]
async fn test_search_recovers_after_transient_failure() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(ResponseTemplate::new(400))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(&results_page(&[("7", "Кино", 3, "700 МБ")])))
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let outcome = search_client(&config, &pause)
        .search(&seeded_session(&config), "Кино")
        .await
        .unwrap();
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(
        pause.recorded(),
        vec![Duration::from_secs(1), Duration::from_secs(3)]
    );
}

#[tokio::test]
async fn test_search_login_page_triggers_exactly_one_reauthentication() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    mount_good_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(LOGIN_FORM))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .and(query_param("s", "Матрица"))
        .respond_with(html_response(&results_page(&[("1", "Матрица", 9, "1 ГБ")])))
        .expect(1)
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let outcome = search_client(&config, &pause)
        .search(&seeded_session(&config), "Матрица")
        .await
        .unwrap();

    assert_eq!(outcome.results.len(), 1);
    let renewed = outcome.renewed_session.expect("re-login yields a new session");
    assert!(renewed.is_authenticated());
    assert!(config.cookie_file.exists(), "re-login persists the session");
}

#[tokio::test]
async fn test_search_persistent_login_page_is_session_expired() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    mount_good_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(LOGIN_FORM))
        .expect(2)
        .mount(&server)
        .await;

    let pause = Arc::new(RecordingPause::default());
    let error = search_client(&config, &pause)
        .search(&seeded_session(&config), "Матрица")
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ScrapeErrorKind::SessionExpired);
}
