//! Persistence throttling.
//!
//! Rate-limits progress-driven state saves to avoid hammering disk.

use std::time::{Duration, Instant};

/// Rate-limiter for progress-driven persistence.
///
/// Ensures the state store is not written more frequently than the
/// configured interval. Structural changes (enqueue, cancel, completion)
/// bypass the throttle and call [`Self::reset`] so the next progress tick
/// after a structural save does not double-write.
pub struct PersistThrottle {
    last_write: Option<Instant>,
    min_interval: Duration,
}

impl PersistThrottle {
    /// Create a new throttle with the specified minimum interval.
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            last_write: None,
            min_interval,
        }
    }

    /// Check if enough time has passed to write the state again.
    pub fn should_write(&mut self) -> bool {
        let now = Instant::now();
        match self.last_write {
            Some(last) if now.duration_since(last) < self.min_interval => false,
            _ => {
                self.last_write = Some(now);
                true
            }
        }
    }

    /// Record that an unthrottled write just happened.
    pub fn reset(&mut self) {
        self.last_write = Some(Instant::now());
    }
}
