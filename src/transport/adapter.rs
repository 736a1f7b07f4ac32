//! Transport adapter contract.
//!
//! A [`TransportAdapter`] owns one connection attempt. Adapters are never
//! reused: after a failure the supervisor asks its [`AdapterFactory`] for a
//! fresh one with a new [`EventSink`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use async_trait::async_trait;
use url::Url;

use crate::auth::ConnectHeaders;
use crate::error::Result;
use crate::identifiers::{SubscriptionId, Topic};

use super::event::EventSink;

// ============================================================================
// TransportKind
// ============================================================================

/// Transport variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// STOMP over SockJS.
    Broker,
    /// Server-Sent Events.
    EventStream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Broker => f.write_str("broker"),
            Self::EventStream => f.write_str("event-stream"),
        }
    }
}

// ============================================================================
// AdapterPhase
// ============================================================================

/// Lifecycle of a single adapter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterPhase {
    /// Created, `connect` not called yet.
    New,
    /// I/O task running.
    Active,
    /// Disconnected; emits nothing further.
    Stopped,
}

// ============================================================================
// TransportAdapter
// ============================================================================

/// One connection attempt over a realtime transport.
///
/// Results and failures of the session are reported through the adapter's
/// [`EventSink`], never through return values: `connect` only fails when
/// the attempt cannot even be started.
#[async_trait]
pub trait TransportAdapter: Send {
    /// Transport variant.
    fn kind(&self) -> TransportKind;

    /// Starts the I/O task. Returns immediately.
    ///
    /// Calling it again while connecting or connected does nothing.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`](crate::Error::InvalidUrl) if the endpoint
    ///   cannot be used by this transport
    /// - [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if the
    ///   adapter was already disconnected
    fn connect(&mut self, endpoint: &Url, headers: &ConnectHeaders) -> Result<()>;

    /// Subscribes to a topic. Subscribing twice returns the same id.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic cannot be served by this adapter or the
    /// adapter was disconnected.
    fn subscribe(&mut self, topic: &Topic) -> Result<SubscriptionId>;

    /// Cancels a subscription. Unknown topics are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter was disconnected.
    fn unsubscribe(&mut self, topic: &Topic) -> Result<()>;

    /// Stops the I/O task. Safe from any phase and idempotent.
    ///
    /// Once this returns, the adapter emits no further events.
    async fn disconnect(&mut self);
}

// ============================================================================
// AdapterFactory
// ============================================================================

/// Builds a fresh adapter for every connection attempt.
pub trait AdapterFactory: Send + Sync + fmt::Debug {
    /// Transport variant produced.
    fn kind(&self) -> TransportKind;

    /// Endpoint adapters connect to.
    fn endpoint(&self) -> &Url;

    /// Identity of the remote stream.
    ///
    /// Two factories with the same key reach the same stream, so a binding
    /// can keep its connection when only props unrelated to the stream change.
    fn endpoint_key(&self) -> String {
        format!("{}:{}", self.kind(), self.endpoint())
    }

    /// Creates an adapter that reports through `sink`.
    fn create(&self, sink: EventSink) -> Box<dyn TransportAdapter>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(TransportKind::Broker.to_string(), "broker");
        assert_eq!(TransportKind::EventStream.to_string(), "event-stream");
    }
}
