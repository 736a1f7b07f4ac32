//! Reconnect policy.
//!
//! Fixed interval, no growth, no jitter. A server hint (the event stream's
//! `retry:` field) replaces the interval when honored, but never drops below
//! [`MIN_SERVER_RETRY`].

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default delay between a transport failure and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(5000);

/// Shortest delay a server retry hint can request.
pub const MIN_SERVER_RETRY: Duration = Duration::from_millis(100);

// ============================================================================
// ReconnectPolicy
// ============================================================================

/// Delay rule applied after a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the next attempt.
    pub delay: Duration,
    /// Use the server's retry hint when it sends one.
    pub honor_server_retry: bool,
}

impl ReconnectPolicy {
    /// Process-wide default: 5 s, server hints honored.
    pub const DEFAULT: Self = Self {
        delay: DEFAULT_RECONNECT_DELAY,
        honor_server_retry: true,
    };

    /// Fixed delay with server hints honored.
    #[inline]
    #[must_use]
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            honor_server_retry: true,
        }
    }

    /// Sets whether server hints replace the delay.
    #[inline]
    #[must_use]
    pub const fn with_server_retry(mut self, honor: bool) -> Self {
        self.honor_server_retry = honor;
        self
    }

    /// Delay when the server gave no hint.
    #[inline]
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay for a failure that carried `hint`.
    ///
    /// Honored hints are clamped to at least [`MIN_SERVER_RETRY`].
    #[must_use]
    pub fn delay_for(&self, hint: Option<Duration>) -> Duration {
        match hint {
            Some(hint) if self.honor_server_retry => hint.max(MIN_SERVER_RETRY),
            _ => self.delay,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_five_seconds() {
        assert_eq!(ReconnectPolicy::default().delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_server_hint() {
        let policy = ReconnectPolicy::fixed(Duration::from_secs(3));
        assert_eq!(policy.delay_for(None), Duration::from_secs(3));
        assert_eq!(
            policy.delay_for(Some(Duration::from_millis(250))),
            Duration::from_millis(250)
        );

        let strict = policy.with_server_retry(false);
        assert_eq!(
            strict.delay_for(Some(Duration::from_millis(250))),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_zero_hint_is_clamped() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(Some(Duration::ZERO)), MIN_SERVER_RETRY);
        assert_eq!(
            policy.delay_for(Some(Duration::from_millis(20))),
            MIN_SERVER_RETRY
        );
    }

    #[test]
    fn test_delay_does_not_grow() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<_> = (0..5).map(|_| policy.delay_for(None)).collect();
        assert!(delays.iter().all(|d| *d == DEFAULT_RECONNECT_DELAY));
    }
}
