//! Per-user search cooldown.
//!
//! One [`UserCooldown`] is built per process and passed by reference to the
//! layer that gates searches. Lookups (`remaining`) take a shard read lock;
//! `check_and_record` takes the shard write lock only for the user it touches.
//!
//! ```
//! use std::time::Duration;
//! use kinozal_core::cooldown::UserCooldown;
//!
//! let cooldown = UserCooldown::new(Duration::from_secs(10));
//! assert!(cooldown.check_and_record(42));
//! assert!(!cooldown.check_and_record(42));
//! assert!(cooldown.check_and_record(7));
//! ```

use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

/// Tracks the last permitted request per user.
#[derive(Debug)]
pub struct UserCooldown {
    cooldown: Duration,
    last_request: DashMap<i64, Instant>,
}

impl UserCooldown {
    /// Creates a cooldown of `cooldown` between two requests of the same user.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_request: DashMap::new(),
        }
    }

    /// The configured cooldown.
    #[must_use]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Allows and records a request, or refuses it while the user is cooling down.
    ///
    /// A refused request does not extend the cooldown.
    pub fn check_and_record(&self, user_id: i64) -> bool {
        let now = Instant::now();
        match self.last_request.entry(user_id) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) < self.cooldown {
                    debug!(user_id, "request refused during cooldown");
                    return false;
                }
                last.insert(now);
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
            }
        }
        true
    }

    /// Time left before `user_id` may request again; zero when allowed now.
    #[must_use]
    pub fn remaining(&self, user_id: i64) -> Duration {
        self.last_request.get(&user_id).map_or(Duration::ZERO, |last| {
            self.cooldown.saturating_sub(last.elapsed())
        })
    }
}
