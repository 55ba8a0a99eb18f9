//! Exponential reconnect backoff.

use std::time::Duration;

/// Delay before the first reconnect attempt, and the value a success resets to.
pub const DEFAULT_RETRY_FLOOR: Duration = Duration::from_millis(1000);

/// Upper bound on the reconnect delay.
pub const DEFAULT_RETRY_CEILING: Duration = Duration::from_millis(30_000);

/// Reconnect delay calculator, one instance per device.
///
/// Each failure yields the current delay and doubles it for next time, capped
/// at the ceiling. No jitter.
///
/// # Example
///
/// ```rust
/// use fleet_core::RetryPolicy;
/// use std::time::Duration;
///
/// let mut policy = RetryPolicy::default();
/// assert_eq!(policy.next_delay(), Duration::from_millis(1000));
/// assert_eq!(policy.next_delay(), Duration::from_millis(2000));
/// policy.reset();
/// assert_eq!(policy.next_delay(), Duration::from_millis(1000));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    floor: Duration,
    ceiling: Duration,
    current: Duration,
}

impl RetryPolicy {
    /// Create a policy with explicit bounds.
    ///
    /// A zero floor is raised to 1ms and a ceiling below the floor is raised to
    /// the floor, so the delay sequence is always non-decreasing.
    pub fn new(floor: Duration, ceiling: Duration) -> Self {
        let floor = floor.max(Duration::from_millis(1));
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            current: floor,
        }
    }

    pub fn floor(&self) -> Duration {
        self.floor
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// The delay the next failure will be charged.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure: returns the delay to wait and advances the backoff.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.ceiling);
        delay
    }

    /// Record a success: the next failure starts again from the floor.
    pub fn reset(&mut self) {
        self.current = self.floor;
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_FLOOR, DEFAULT_RETRY_CEILING)
    }
}
