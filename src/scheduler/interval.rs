//! Wall-clock interval trigger.

use std::time::Duration;
use tokio::time::Instant;

/// Fires once per `interval`, immediately on first use.
#[derive(Debug, Clone)]
pub struct IntervalTrigger {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl IntervalTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// True if the trigger never fired or a full interval has elapsed.
    pub fn should_fire(&self, now: Instant) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark_fired(&mut self, now: Instant) {
        self.last_fired = Some(now);
    }

    /// When the trigger is next due. `None` only if the deadline is not
    /// representable (an absurd interval).
    pub fn next_fire_at(&self, now: Instant) -> Option<Instant> {
        match self.last_fired {
            None => Some(now),
            Some(last) => last.checked_add(self.interval),
        }
    }
}
