//! Retry policy for search requests.
//!
//! The site throttles with HTTP 400 rather than 429, so 400 gets a steeper
//! linear backoff than transport errors and other statuses:
//!
//! | Failure           | Delay before next attempt |
//! |-------------------|---------------------------|
//! | transport error   | `attempt × 2s`            |
//! | HTTP 400          | `attempt × 3s`            |
//! | other non-200     | `attempt × 2s`            |
//!
//! Sleeping goes through the [`Pause`] trait so tests can observe delays
//! without waiting for them.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

/// Attempts per search call, including the first.
pub const MAX_SEARCH_ATTEMPTS: u32 = 3;

/// Pause applied before every search request.
pub const COURTESY_DELAY: Duration = Duration::from_secs(1);

const BASE_STEP: Duration = Duration::from_secs(2);
const RATE_LIMIT_STEP: Duration = Duration::from_secs(3);

/// Why a search attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchFailure {
    /// Network, DNS, TLS or timeout failure.
    Transport,
    /// HTTP 400, the site's throttling signal.
    RateLimited,
    /// Any other non-200 status.
    Status(u16),
}

impl SearchFailure {
    /// Classifies a non-200 status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if status == 400 {
            Self::RateLimited
        } else {
            Self::Status(status)
        }
    }
}

/// Decision after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`; `attempt` is the number of the next attempt.
    Retry {
        /// How long to wait.
        delay: Duration,
        /// The upcoming attempt number (1-indexed).
        attempt: u32,
    },
    /// The attempt budget is spent.
    GiveUp,
}

/// Linear backoff with a steeper step for soft rate limits.
#[derive(Debug, Clone)]
pub struct SearchRetryPolicy {
    max_attempts: u32,
    base_step: Duration,
    rate_limit_step: Duration,
}

impl Default for SearchRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_SEARCH_ATTEMPTS,
            base_step: BASE_STEP,
            rate_limit_step: RATE_LIMIT_STEP,
        }
    }
}

impl SearchRetryPolicy {
    /// Maximum attempts including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after `attempt` (1-indexed) failed with `failure`.
    #[must_use]
    pub fn delay_for(&self, failure: SearchFailure, attempt: u32) -> Duration {
        let step = match failure {
            SearchFailure::RateLimited => self.rate_limit_step,
            SearchFailure::Transport | SearchFailure::Status(_) => self.base_step,
        };
        step.saturating_mul(attempt)
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed.
    #[must_use]
    pub fn should_retry(&self, failure: SearchFailure, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            debug!(?failure, attempt, "search retry budget exhausted");
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.delay_for(failure, attempt),
            attempt: attempt + 1,
        }
    }
}

/// Something that waits. Production code sleeps; tests record.
#[async_trait]
pub trait Pause: Send + Sync {
    /// Waits for `delay`.
    async fn pause(&self, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Records requested delays and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingPause {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingPause {
    /// Delays requested so far, in order.
    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delay);
    }
}
