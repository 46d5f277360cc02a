//! Retry backoff policy for failed uploads
//!
//! The delay law is deterministic: the first wait is the configured initial
//! delay, and each successive wait doubles the previous one, capped at
//! 30 seconds. The coordinator deliberately shares one [`Backoff`] instance
//! across a whole upload batch, so a run of failures compounds the delay
//! across files rather than resetting per file.

use std::time::Duration;

/// Upper bound on any single backoff delay (30 seconds)
pub const MAX_BACKOFF: Duration = Duration::from_millis(30_000);

/// Exponential backoff delay generator
///
/// Produces the configured initial delay first, then doubles on each call up
/// to [`MAX_BACKOFF`] (or a caller-supplied cap).
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Duration,
    cap: Duration,
}

impl Backoff {
    /// Create a backoff starting at `initial` with the standard 30 s cap
    #[must_use]
    pub fn new(initial: Duration) -> Self {
        Self::with_cap(initial, MAX_BACKOFF)
    }

    /// Create a backoff with an explicit cap
    #[must_use]
    pub fn with_cap(initial: Duration, cap: Duration) -> Self {
        Self {
            delay: initial.min(cap),
            cap,
        }
    }

    /// The delay to wait before the next retry; doubles the internal state
    /// for the call after this one
    pub fn next_delay(&mut self) -> Duration {
        let current = self.delay;
        self.delay = self.delay.saturating_mul(2).min(self.cap);
        current
    }

    /// The delay the next call to [`next_delay`](Self::next_delay) will return
    #[must_use]
    pub fn peek(&self) -> Duration {
        self.delay
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_double_monotonically() {
        let mut backoff = Backoff::new(Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(4000));
    }

    #[test]
    fn delays_cap_at_thirty_seconds() {
        let mut backoff = Backoff::new(Duration::from_millis(10_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(10_000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(20_000));
        // 40 000 would exceed the cap
        assert_eq!(backoff.next_delay(), MAX_BACKOFF);
        assert_eq!(backoff.next_delay(), MAX_BACKOFF);
    }

    #[test]
    fn initial_delay_above_cap_is_clamped() {
        let mut backoff = Backoff::new(Duration::from_secs(120));
        assert_eq!(backoff.next_delay(), MAX_BACKOFF);
    }

    #[test]
    fn custom_cap_respected() {
        let mut backoff = Backoff::with_cap(Duration::from_millis(50), Duration::from_millis(120));
        assert_eq!(backoff.next_delay(), Duration::from_millis(50));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(120));
    }

    #[test]
    fn peek_does_not_advance_state() {
        let mut backoff = Backoff::new(Duration::from_millis(500));
        assert_eq!(backoff.peek(), Duration::from_millis(500));
        assert_eq!(backoff.peek(), Duration::from_millis(500));
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
        assert_eq!(backoff.peek(), Duration::from_millis(1000));
    }
}
