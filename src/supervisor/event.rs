//! Lifecycle events broadcast to observers.

// ============================================================================
// Imports
// ============================================================================

use crate::decoder::DecodeError;
use crate::identifiers::Topic;
use crate::transport::DisconnectReason;

use super::state::ConnectionState;

// ============================================================================
// LifecycleEvent
// ============================================================================

/// Something an observer may want to record.
///
/// None of these require action; the supervisor has already handled them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// State machine moved.
    StateChanged {
        /// Previous state.
        from: ConnectionState,
        /// New state.
        to: ConnectionState,
    },
    /// A topic was subscribed on the current adapter.
    Subscribed {
        /// Topic.
        topic: Topic,
    },
    /// A payload was dropped.
    DecodeFailed {
        /// Topic it arrived on.
        topic: Topic,
        /// Decoder error, including the raw payload.
        error: DecodeError,
    },
    /// The broker reported an error; state unchanged.
    ProtocolError {
        /// Short description.
        message: String,
        /// Additional detail.
        detail: String,
    },
    /// The transport failed; a reconnect follows.
    TransportError {
        /// Description of the failure.
        message: String,
    },
    /// The session ended; a reconnect follows.
    Disconnected {
        /// Why it ended.
        reason: DisconnectReason,
    },
}
