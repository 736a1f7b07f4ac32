//! Builder pattern for stream configuration.
//!
//! Provides a fluent API for configuring and validating a [`StreamConfig`].
//!
//! # Example
//!
//! ```no_run
//! use gps_stream::StreamConfig;
//!
//! # fn example() -> gps_stream::Result<()> {
//! let config = StreamConfig::builder()
//!     .broker("http://localhost:8090/ws")
//!     .topic("/topic/gps")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::Topic;
use crate::supervisor::ReconnectPolicy;

use super::StreamConfig;
use super::options::{
    BrokerOptions, DEFAULT_BROKER_ENDPOINT, DEFAULT_EVENT_STREAM_ENDPOINT, EventStreamOptions,
    TransportOptions,
};

// ============================================================================
// StreamBuilder
// ============================================================================

/// Builder for a [`StreamConfig`].
///
/// Use [`StreamConfig::builder()`] to create a new builder. Defaults to the
/// broker transport at [`DEFAULT_BROKER_ENDPOINT`].
#[derive(Debug, Default, Clone)]
pub struct StreamBuilder {
    /// Endpoint text; the transport's default when unset.
    endpoint: Option<String>,
    /// Transport and its options.
    transport: TransportOptions,
    /// Reconnect policy.
    policy: ReconnectPolicy,
}

// ============================================================================
// StreamBuilder Implementation
// ============================================================================

impl StreamBuilder {
    /// Creates a builder with defaults.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects the broker transport at `endpoint` (the SockJS base URL).
    ///
    /// Broker options already set are kept.
    #[must_use]
    pub fn broker(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        if !matches!(self.transport, TransportOptions::Broker(_)) {
            self.transport = TransportOptions::Broker(BrokerOptions::default());
        }
        self
    }

    /// Selects the event-stream transport at `endpoint`, delivering
    /// `event_name` events.
    #[must_use]
    pub fn event_stream(mut self, endpoint: impl Into<String>, event_name: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        let options = match self.transport {
            TransportOptions::EventStream(options) => options,
            TransportOptions::Broker(_) => EventStreamOptions::default(),
        };
        self.transport = TransportOptions::EventStream(options.with_event_name(event_name));
        self
    }

    /// Replaces the broker options and selects the broker transport.
    #[inline]
    #[must_use]
    pub fn broker_options(mut self, options: BrokerOptions) -> Self {
        self.transport = TransportOptions::Broker(options);
        self
    }

    /// Replaces the event-stream options and selects the event-stream transport.
    #[inline]
    #[must_use]
    pub fn event_stream_options(mut self, options: EventStreamOptions) -> Self {
        self.transport = TransportOptions::EventStream(options);
        self
    }

    /// Sets the broker topic. Ignored by the event-stream transport.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<Topic>) -> Self {
        if let TransportOptions::Broker(options) = &mut self.transport {
            options.topic = topic.into();
        }
        self
    }

    /// Sets the connect timeout of the selected transport.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        match &mut self.transport {
            TransportOptions::Broker(options) => options.connect_timeout = timeout,
            TransportOptions::EventStream(options) => options.connect_timeout = timeout,
        }
        self
    }

    /// Sets a fixed reconnect delay.
    #[inline]
    #[must_use]
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.policy.delay = delay;
        self
    }

    /// Replaces the reconnect policy.
    #[inline]
    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the endpoint is not an http(s) URL
    /// - [`Error::Config`] if the topic or event name is blank
    /// - [`Error::Config`] if the reconnect delay is zero
    pub fn build(self) -> Result<StreamConfig> {
        let endpoint = self.validate_endpoint()?;
        self.validate_transport()?;
        self.validate_policy()?;

        Ok(StreamConfig::new(endpoint, self.transport, self.policy))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl StreamBuilder {
    /// Parses the endpoint and checks its scheme.
    fn validate_endpoint(&self) -> Result<Url> {
        let text = self.endpoint.as_deref().unwrap_or(match self.transport {
            TransportOptions::Broker(_) => DEFAULT_BROKER_ENDPOINT,
            TransportOptions::EventStream(_) => DEFAULT_EVENT_STREAM_ENDPOINT,
        });

        let url = Url::parse(text).map_err(|e| Error::invalid_url(text, e.to_string()))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                text,
                format!(
                    "scheme '{}' is not supported. Use http:// or https://",
                    url.scheme()
                ),
            ));
        }
        if url.host_str().is_none() {
            return Err(Error::invalid_url(text, "missing host"));
        }

        Ok(url)
    }

    /// Checks topic and event name.
    fn validate_transport(&self) -> Result<()> {
        match &self.transport {
            TransportOptions::Broker(options) if options.topic.is_blank() => Err(Error::config(
                "Broker topic must not be empty.\n\
                 Example: StreamConfig::builder().topic(\"/topic/gps\")",
            )),
            TransportOptions::EventStream(options) if options.event_name.trim().is_empty() => {
                Err(Error::config(
                    "Event name must not be empty.\n\
                     Example: StreamConfig::builder().event_stream(url, \"gps\")",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Checks the reconnect delay.
    fn validate_policy(&self) -> Result<()> {
        if self.policy.delay.is_zero() {
            return Err(Error::config(
                "Reconnect delay must be greater than zero.\n\
                 Example: StreamConfig::builder().reconnect_delay(Duration::from_secs(5))",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
