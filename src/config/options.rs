//! Transport options.
//!
//! Endpoints are not part of the options; they are parsed and validated by
//! [`StreamBuilder`](super::StreamBuilder) and owned by the adapter factory.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use gps_stream::BrokerOptions;
//!
//! let options = BrokerOptions::new()
//!     .with_topic("/topic/gps")
//!     .without_info_probe()
//!     .with_connect_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::identifiers::Topic;
use crate::protocol::HeartBeat;
use crate::protocol::sse::DEFAULT_EVENT;

// ============================================================================
// Constants
// ============================================================================

/// Default SockJS base URL of the broker.
pub const DEFAULT_BROKER_ENDPOINT: &str = "http://localhost:8090/ws";

/// Default broker topic.
pub const DEFAULT_BROKER_TOPIC: &str = "/topic/gps";

/// Default event-stream URL.
pub const DEFAULT_EVENT_STREAM_ENDPOINT: &str = "http://localhost:8080/api/v1/sse/gps";

/// Default heart-beat interval in both directions.
pub const DEFAULT_HEART_BEAT: Duration = Duration::from_secs(10);

/// Default time allowed for a connection attempt to open.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// BrokerOptions
// ============================================================================

/// Options of the STOMP-over-SockJS transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerOptions {
    /// Topic the binding subscribes to.
    pub topic: Topic,

    /// Try a WebSocket session first.
    pub websocket: bool,

    /// Fall back to XHR polling when WebSocket is unavailable.
    pub xhr_fallback: bool,

    /// Query `{base}/info` before choosing a transport.
    pub probe_info: bool,

    /// Heart-beat intervals offered in `CONNECT`.
    pub heart_beat: HeartBeat,

    /// Time allowed from opening the session to `CONNECTED`.
    pub connect_timeout: Duration,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            topic: Topic::new(DEFAULT_BROKER_TOPIC),
            websocket: true,
            xhr_fallback: true,
            probe_info: true,
            heart_beat: HeartBeat::new(DEFAULT_HEART_BEAT, DEFAULT_HEART_BEAT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl BrokerOptions {
    /// Creates options with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the topic.
    #[inline]
    #[must_use]
    pub fn with_topic(mut self, topic: impl Into<Topic>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Uses XHR polling only.
    #[inline]
    #[must_use]
    pub fn xhr_only(mut self) -> Self {
        self.websocket = false;
        self.xhr_fallback = true;
        self
    }

    /// Disables the XHR fallback.
    #[inline]
    #[must_use]
    pub fn without_xhr_fallback(mut self) -> Self {
        self.xhr_fallback = false;
        self
    }

    /// Skips the `{base}/info` probe.
    #[inline]
    #[must_use]
    pub fn without_info_probe(mut self) -> Self {
        self.probe_info = false;
        self
    }

    /// Sets heart-beat intervals. Zero disables a direction.
    #[inline]
    #[must_use]
    pub fn with_heart_beat(mut self, outgoing: Duration, incoming: Duration) -> Self {
        self.heart_beat = HeartBeat::new(outgoing, incoming);
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// EventStreamOptions
// ============================================================================

/// Options of the event-stream transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStreamOptions {
    /// Event type to deliver; other events are ignored.
    pub event_name: String,

    /// Time allowed to receive response headers.
    pub connect_timeout: Duration,
}

impl Default for EventStreamOptions {
    fn default() -> Self {
        Self {
            event_name: DEFAULT_EVENT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl EventStreamOptions {
    /// Creates options with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the event name.
    #[inline]
    #[must_use]
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = name.into();
        self
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Topic messages are delivered on (the event name).
    #[inline]
    #[must_use]
    pub fn topic(&self) -> Topic {
        Topic::new(self.event_name.clone())
    }
}

// ============================================================================
// TransportOptions
// ============================================================================

/// Transport selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOptions {
    /// STOMP over SockJS.
    Broker(BrokerOptions),
    /// Server-Sent Events.
    EventStream(EventStreamOptions),
}

impl TransportOptions {
    /// Topic a binding subscribes to by default.
    #[must_use]
    pub fn default_topic(&self) -> Topic {
        match self {
            Self::Broker(options) => options.topic.clone(),
            Self::EventStream(options) => options.topic(),
        }
    }

    /// Connect timeout of the selected transport.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        match self {
            Self::Broker(options) => options.connect_timeout,
            Self::EventStream(options) => options.connect_timeout,
        }
    }
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::Broker(BrokerOptions::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
