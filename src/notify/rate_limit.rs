//! Per-key cooldown for alert notifications.
//!
//! Each [`NotificationKey`] remembers when it was last admitted. A key is
//! admitted again only once its cooldown has fully elapsed. This is not a
//! token bucket: distinct keys never affect each other, and the cache lives
//! only as long as the process, so a cold start admits every key once.

use crate::models::NotificationKey;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default cooldown between two alerts for the same key (1 hour).
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(3600);

/// Rate limiter for duplicate alerts.
#[derive(Debug)]
pub struct RateLimiter {
    cache: Mutex<HashMap<NotificationKey, Instant>>,
    default_cooldown: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN)
    }
}

impl RateLimiter {
    pub fn new(default_cooldown: Duration) -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
            default_cooldown,
        }
    }

    pub fn default_cooldown(&self) -> Duration {
        self.default_cooldown
    }

    /// Decide whether an alert for `key` may go out now.
    ///
    /// Admitting records the current instant; a denial leaves the recorded
    /// instant untouched so the window is measured from the last admission.
    pub fn admit(&self, key: &NotificationKey, cooldown: Option<Duration>) -> bool {
        let cooldown = cooldown.unwrap_or(self.default_cooldown);
        let now = Instant::now();

        // A poisoned lock only means another sender panicked mid-update;
        // the map itself is still a valid set of timestamps.
        let mut cache = self
            .cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match cache.get(key) {
            Some(last_sent) => {
                let elapsed = now.saturating_duration_since(*last_sent);
                if elapsed >= cooldown {
                    cache.insert(key.clone(), now);
                    true
                } else {
                    debug!(
                        "Alert rate limited: {} (sent {}s ago, cooldown: {}s)",
                        key,
                        elapsed.as_secs(),
                        cooldown.as_secs()
                    );
                    false
                }
            }
            None => {
                cache.insert(key.clone(), now);
                true
            }
        }
    }

    /// Forget every key.
    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
