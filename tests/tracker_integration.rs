//! Integration tests for the `Tracker` facade.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kinozal_core::{
    FsTorrentStore, RecordingPause, ScrapeError, ScrapeErrorKind, SessionStore, SubmitError,
    TorrentSubmitter, Tracker,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::site::{auth_records, config_for, html_response, mount_good_login, results_page};
use support::socket_guard::start_mock_server_or_skip;

#[derive(Default)]
struct RecordingSubmitter {
    fail: bool,
    seen: Mutex<Vec<(PathBuf, PathBuf, bool)>>,
}

#[async_trait]
impl TorrentSubmitter for RecordingSubmitter {
    async fn submit(&self, torrent: &Path, download_dir: &Path) -> Result<(), SubmitError> {
        self.seen.lock().unwrap().push((
            torrent.to_path_buf(),
            download_dir.to_path_buf(),
            torrent.exists(),
        ));
        if self.fail {
            return Err(SubmitError::Rejected {
                program: "fake-remote".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "duplicate torrent".to_string(),
            });
        }
        Ok(())
    }
}

fn tracker_for(config: kinozal_core::Config) -> Tracker {
    let torrents = Arc::new(FsTorrentStore::new(config.torrents_dir.clone()));
    Tracker::with_parts(
        Arc::new(config),
        Arc::new(RecordingPause::default()),
        torrents,
    )
    .unwrap()
}

fn torrent_mock() -> Mock {
    Mock::given(method("GET"))
        .and(path("/download.php"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/x-bittorrent")
                .set_body_bytes(b"d4:infod4:name1:xee".to_vec()),
        )
}

#[tokio::test]
async fn test_tracker_logs_in_once_for_consecutive_searches() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    mount_good_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(&results_page(&[("1", "Кино", 2, "1 ГБ")])))
        .expect(2)
        .mount(&server)
        .await;

    let tracker = tracker_for(config);
    assert_eq!(tracker.search("Кино").await.unwrap().len(), 1);
    assert_eq!(tracker.search("Кино").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_tracker_restores_persisted_session_without_login() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    SessionStore::new(config.cookie_file.clone())
        .save(&auth_records(&config))
        .unwrap();
    mount_good_login(&server, 0).await;

    let tracker = tracker_for(config);
    let session = tracker.session().await.unwrap();
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn test_search_as_refuses_during_cooldown_without_network() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let mut config = config_for(&server, dir.path());
    config.search_cooldown = Duration::from_secs(60);
    mount_good_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(&results_page(&[("1", "Кино", 2, "1 ГБ")])))
        .expect(1)
        .mount(&server)
        .await;

    let tracker = tracker_for(config);
    tracker.search_as(42, "Кино").await.unwrap();
    let error = tracker.search_as(42, "Кино").await.unwrap_err();

    assert_eq!(error.kind(), ScrapeErrorKind::CoolingDown);
    match error {
        ScrapeError::CoolingDown { user_id, remaining } => {
            assert_eq!(user_id, 42);
            assert!(remaining > Duration::ZERO);
            assert!(remaining <= Duration::from_secs(60));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_cooldown_is_tracked_per_user() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    mount_good_login(&server, 1).await;
    Mock::given(method("GET"))
        .and(path("/browse.php"))
        .respond_with(html_response(&results_page(&[])))
        .expect(2)
        .mount(&server)
        .await;

    let tracker = tracker_for(config);
    tracker.search_as(1, "a").await.unwrap();
    tracker.search_as(2, "a").await.unwrap();
}

#[tokio::test]
async fn test_fetch_and_submit_hands_off_then_removes_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let torrents_dir = config.torrents_dir.clone();
    mount_good_login(&server, 1).await;
    torrent_mock().expect(1).mount(&server).await;

    let tracker = tracker_for(config);
    let submitter = RecordingSubmitter::default();
    let download_dir = dir.path().join("media");
    let submission = tracker
        .fetch_and_submit("1761744", &download_dir, &submitter)
        .await
        .unwrap();

    assert_eq!(submission.torrent_id, "1761744");
    assert_eq!(submission.bytes, b"d4:infod4:name1:xee".len());
    let seen = submitter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (torrent, target, existed) = &seen[0];
    assert_eq!(torrent, &torrents_dir.join("1761744.torrent"));
    assert_eq!(target, &download_dir);
    assert!(*existed, "file must exist while the daemon reads it");
    assert!(!torrent.exists(), "file removed after hand-off");
}

#[tokio::test]
async fn test_fetch_and_submit_failure_still_removes_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let dir = TempDir::new().unwrap();
    let config = config_for(&server, dir.path());
    let torrents_dir = config.torrents_dir.clone();
    mount_good_login(&server, 1).await;
    torrent_mock().mount(&server).await;

    let tracker = tracker_for(config);
    let submitter = RecordingSubmitter {
        fail: true,
        ..RecordingSubmitter::default()
    };
    let error = tracker
        .fetch_and_submit("55", dir.path(), &submitter)
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        ScrapeError::Submit {
            source: SubmitError::Rejected { .. },
            ..
        }
    ));
    assert!(!torrents_dir.join("55.torrent").exists());
}
