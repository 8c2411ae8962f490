use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var("KINOZAL_REQUIRE_SOCKET_TESTS")
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Whether the wiremock site double can listen on loopback here.
///
/// Sandboxed runners often forbid binding; those skip the mock-site tests
/// unless `KINOZAL_REQUIRE_SOCKET_TESTS` insists on running them.
#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let location = Location::caller();
    let message = format!(
        "no loopback socket for the mock Kinozal site ({}:{})",
        location.file(),
        location.line()
    );
    assert!(
        !socket_tests_required(),
        "{message}; KINOZAL_REQUIRE_SOCKET_TESTS is set"
    );

    eprintln!("skipping: {message}");
    true
}

/// Starts the mock site, or returns `None` when the test should be skipped.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        None
    } else {
        Some(MockServer::start().await)
    }
}
