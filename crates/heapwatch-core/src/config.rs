//! Tracker configuration.

use std::time::Duration;

/// Delay before the first poll.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(500);
/// Delay between the end of one poll and the start of the next.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Timing knobs for a [`MemoryTracker`](crate::MemoryTracker).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Time from `start()` to the first poll.
    pub initial_delay: Duration,
    /// Time from the end of one poll to the start of the next.
    pub poll_interval: Duration,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl TrackerConfig {
    /// Set the delay before the first poll.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the delay between polls.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
