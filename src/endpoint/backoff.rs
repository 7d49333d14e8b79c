//! Retry pacing for a listener whose `accept()` keeps failing.
//!
//! Transient accept errors (file descriptor exhaustion, aborted handshakes)
//! tend to come in bursts, so each consecutive failure waits twice as long
//! as the previous one. The first successful accept starts over.

use std::time::Duration;

/// Shortest delay the accept loop will ever sleep for.
const FLOOR: Duration = Duration::from_millis(1);

/// Bounds of the accept retry delay.
///
/// Defaults to 10 ms, growing to at most 1 s.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Wait after the first failure of a burst.
    pub initial_delay: Duration,
    /// Ceiling the wait stops doubling at.
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
        }
    }
}

impl BackoffConfig {
    /// Bounds with both delays at least 1 ms and `initial_delay` the
    /// smaller of the two.
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use muxframe::endpoint::BackoffConfig;
    ///
    /// let bounds = BackoffConfig {
    ///     initial_delay: Duration::from_millis(5),
    ///     max_delay: Duration::ZERO,
    /// }
    /// .normalized();
    /// assert_eq!(bounds.initial_delay, Duration::from_millis(1));
    /// assert_eq!(bounds.max_delay, Duration::from_millis(5));
    /// ```
    #[must_use]
    pub fn normalized(self) -> Self {
        let a = self.initial_delay.max(FLOOR);
        let b = self.max_delay.max(FLOOR);
        Self {
            initial_delay: a.min(b),
            max_delay: a.max(b),
        }
    }
}

/// Delay state of one accept loop.
#[derive(Debug)]
pub(crate) struct Backoff {
    bounds: BackoffConfig,
    next: Duration,
}

impl Backoff {
    pub(crate) fn new(bounds: BackoffConfig) -> Self {
        let bounds = bounds.normalized();
        Self {
            bounds,
            next: bounds.initial_delay,
        }
    }

    /// Delay to sleep after a failure; the one after it is twice as long.
    pub(crate) fn failed(&mut self) -> Duration {
        let delay = self.next;
        self.next = delay.saturating_mul(2).min(self.bounds.max_delay);
        delay
    }

    /// Start over after a successful accept.
    pub(crate) fn succeeded(&mut self) { self.next = self.bounds.initial_delay; }
}
