//! Kinozal Core Library
//!
//! Authenticated scraping client for a cookie-session torrent tracker: it
//! keeps a logged-in session, searches the catalog, and fetches `.torrent`
//! files while telling real payloads apart from disguised login pages.
//!
//! # Architecture
//!
//! - [`session`] - Cookie records, the persisted cookie file, the session type
//! - [`auth`] - Login handshake producing a validated session
//! - [`search`] - Search client, retry policy and results parser
//! - [`download`] - Torrent retrieval with re-login on session loss
//! - [`tracker`] - Facade owning the live session and the search cooldown
//!
//! Collaborators at the edge: [`storage`] (where torrent files land),
//! [`handoff`] (submission to the download daemon) and [`access`] (the user
//! allow-list).

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod access;
pub mod auth;
pub mod config;
pub mod cooldown;
pub mod download;
pub mod error;
pub mod handoff;
pub mod http_client;
pub mod search;
pub mod session;
pub mod storage;
pub mod tracker;
pub mod user_agent;

// Re-export commonly used types
pub use access::{AccessError, AllowList};
pub use auth::Authenticator;
pub use config::{Config, ConfigError, Credentials, SiteEndpoints};
pub use cooldown::UserCooldown;
pub use download::{DownloadClient, DownloadOutcome};
pub use error::{ScrapeError, ScrapeErrorKind};
pub use handoff::{SubmitError, TorrentSubmitter, TransmissionRemote};
pub use search::{
    Pause, RecordingPause, SearchClient, SearchOutcome, SearchResult, TokioPause,
    parse_search_results,
};
pub use session::{CookieRecord, Session, SessionStore, SessionStoreError};
pub use storage::{FsTorrentStore, StorageError, TorrentStore};
pub use tracker::{Submission, Tracker};
