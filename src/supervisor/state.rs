//! Connection states.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle of a supervised connection.
///
/// ```text
/// Idle ──► Connecting ──► Connected ──► Reconnecting ──► Connecting ──► …
///   │           │              │              │
///   └───────────┴──────────────┴──────────────┴──► Closed (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not activated yet.
    #[default]
    Idle,
    /// An adapter is opening a session.
    Connecting,
    /// Session open, subscriptions replayed.
    Connected,
    /// Waiting for the reconnect timer.
    Reconnecting,
    /// Deactivated. Terminal.
    Closed,
}

impl ConnectionState {
    /// Returns `true` for the terminal state.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the state machine allows `self -> next`.
    #[must_use]
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Connecting)
            | (Connecting, Connected)
            | (Connecting | Connected, Reconnecting)
            | (Reconnecting, Connecting) => true,
            _ => false,
        }
    }

    /// Lower-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::ConnectionState::*;
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Reconnecting.can_transition_to(Connecting));
    }

    #[test]
    fn test_failed_attempt_reconnects() {
        assert!(Connecting.can_transition_to(Reconnecting));
    }

    #[test]
    fn test_closed_is_terminal_and_reachable() {
        for state in [Idle, Connecting, Connected, Reconnecting] {
            assert!(state.can_transition_to(Closed));
        }
        for state in [Idle, Connecting, Connected, Reconnecting, Closed] {
            assert!(!Closed.can_transition_to(state));
        }
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Idle.can_transition_to(Connected));
        assert!(!Reconnecting.can_transition_to(Connected));
        assert!(!Connected.can_transition_to(Connecting));
    }

    #[test]
    fn test_display() {
        assert_eq!(Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::default(), Idle);
    }
}
