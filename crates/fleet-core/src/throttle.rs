//! Per-key rate limiting for repetitive log lines.
//!
//! A device that keeps failing raises the same error on every trigger. The
//! throttle lets the first occurrence through and then at most one per
//! interval for each key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default minimum spacing for device error lines.
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug)]
pub struct LogThrottle {
    min_interval: Duration,
    last: Mutex<HashMap<String, Instant>>,
}

impl LogThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if a line for `key` may be emitted now, and records it.
    pub fn should_log(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match last.get(key) {
            Some(prev) if now.duration_since(*prev) < self.min_interval => false,
            _ => {
                last.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget a key so its next line is emitted immediately.
    pub fn reset(&self, key: &str) {
        self.last.lock().remove(key);
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}
