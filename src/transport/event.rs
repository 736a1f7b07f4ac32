//! Tagged adapter events.
//!
//! Adapters never call into the supervisor directly. Every callback point
//! (`open`, `message`, `error`, `close`) is one [`TransportEvent`] variant
//! sent through an [`EventSink`], tagged with the adapter's [`Generation`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::identifiers::{Generation, Topic};

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a transport session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    /// Human-readable reason.
    pub message: String,
    /// Close code, when the transport supplies one.
    pub code: Option<u16>,
    /// Server-suggested delay before the next attempt.
    pub retry_after: Option<Duration>,
}

impl DisconnectReason {
    /// Creates a reason with no code and no retry hint.
    #[inline]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            retry_after: None,
        }
    }

    /// Sets the close code.
    #[inline]
    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Sets the retry hint.
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry_after: Option<Duration>) -> Self {
        self.retry_after = retry_after;
        self
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {code})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// TransportEvent
// ============================================================================

/// Event emitted by a transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session is ready for subscriptions.
    Opened,
    /// Raw payload received on a topic.
    Message {
        /// Topic (destination or event name) the payload arrived on.
        topic: Topic,
        /// Undecoded payload.
        raw: String,
    },
    /// Broker reported an error; the session stays up.
    ProtocolError {
        /// Short description (e.g. the STOMP `message` header).
        message: String,
        /// Additional detail (e.g. the ERROR frame body).
        detail: String,
    },
    /// Transport became unusable.
    TransportError {
        /// Description of the failure.
        message: String,
    },
    /// Session ended.
    Closed(DisconnectReason),
}

impl TransportEvent {
    /// Creates a transport error event.
    #[inline]
    pub fn transport_error(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// Returns `true` if this event means the session is gone.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TransportError { .. } | Self::Closed(_))
    }
}

/// A [`TransportEvent`] tagged with its adapter's generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterEvent {
    /// Generation of the adapter that produced the event.
    pub generation: Generation,
    /// The event.
    pub event: TransportEvent,
}

// ============================================================================
// EventSink
// ============================================================================

/// Sending half handed to one adapter.
///
/// Muting is shared by all clones, so once an adapter is disconnected none
/// of its tasks can emit again.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<AdapterEvent>,
    muted: Arc<AtomicBool>,
}

impl EventSink {
    /// Creates a sink for one adapter generation.
    pub fn new(generation: Generation, tx: mpsc::UnboundedSender<AdapterEvent>) -> Self {
        Self {
            generation,
            tx,
            muted: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a sink and the receiver it feeds.
    pub fn channel(generation: Generation) -> (Self, mpsc::UnboundedReceiver<AdapterEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(generation, tx), rx)
    }

    /// Generation this sink tags events with.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Sends an event. Returns `false` if muted or the receiver is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        if self.is_muted() {
            return false;
        }
        self.tx
            .send(AdapterEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Stops all further emission from this sink and its clones.
    #[inline]
    pub fn mute(&self) {
        self.muted.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`mute`](Self::mute) was called.
    #[inline]
    #[must_use]
    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    /// Same channel and generation with a mute flag of its own.
    #[cfg(test)]
    pub(crate) fn unmuted(&self) -> Self {
        Self::new(self.generation, self.tx.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
