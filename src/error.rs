//! Error types for the GPS stream client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use gps_stream::{Result, StreamBuilder};
//!
//! fn example() -> Result<()> {
//!     let config = StreamBuilder::new().broker("http://localhost:8090/ws").build()?;
//!     let supervisor = config.supervisor(config.registry());
//!     supervisor.activate(None)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Effect on the connection |
//! |----------|----------|--------------------------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] | Rejected before connecting |
//! | Transport | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Http`], [`Error::FrameTooLarge`] | Drives reconnect |
//! | Protocol | [`Error::Protocol`], [`Error::Frame`] | Reported, state unchanged |
//! | Lifecycle | [`Error::SupervisorClosed`] | Caller must build a new supervisor |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Request`] | Mapped by caller |
//!
//! Undecodable payloads are not errors of this type. The supervisor drops
//! them and reports the [`DecodeError`](crate::decoder::DecodeError) through
//! its lifecycle events.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when stream configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be parsed or has an unsupported scheme.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl {
        /// The offending URL text.
        url: String,
        /// Why it was rejected.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Connection could not be established or was dropped.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connection attempt did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Connection closed while an operation was in flight.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Server answered an HTTP request with an unexpected status.
    #[error("HTTP {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response summary.
        message: String,
    },

    /// Peer sent more unterminated data than a decoder will buffer.
    #[error("{codec} input exceeds {limit} buffered bytes")]
    FrameTooLarge {
        /// Codec that hit the limit (`stomp`, `sse`).
        codec: &'static str,
        /// Limit in bytes.
        limit: usize,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Broker reported an error or violated the protocol.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// A wire frame could not be parsed.
    #[error("Malformed {codec} frame: {message}")]
    Frame {
        /// Codec that rejected the frame (`stomp`, `sockjs`).
        codec: &'static str,
        /// Parser message.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Supervisor was deactivated and cannot be reactivated.
    #[error("Supervisor is closed")]
    SupervisorClosed,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates an HTTP status error.
    #[inline]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Creates a buffer limit error.
    #[inline]
    pub fn frame_too_large(codec: &'static str, limit: usize) -> Self {
        Self::FrameTooLarge { codec, limit }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a frame parse error.
    #[inline]
    pub fn frame(codec: &'static str, message: impl Into<String>) -> Self {
        Self::Frame {
            codec,
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectionTimeout { .. })
    }

    /// Returns `true` if the error means the transport itself is unusable.
    ///
    /// These are the only errors that move a supervisor to `Reconnecting`.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Http { .. }
                | Self::FrameTooLarge { .. }
                | Self::Io(_)
                | Self::WebSocket(_)
                | Self::Request(_)
        )
    }

    /// Returns `true` if this is a broker protocol or framing error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Frame { .. })
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors leave a running supervisor usable.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.is_transport_error() || self.is_protocol_error()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("socket reset");
        assert_eq!(err.to_string(), "Connection failed: socket reset");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("topic must not be empty");
        assert_eq!(err.to_string(), "Configuration error: topic must not be empty");
    }

    #[test]
    fn test_frame_error_names_codec() {
        let err = Error::frame("stomp", "missing command");
        assert_eq!(err.to_string(), "Malformed stomp frame: missing command");
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_is_transport_error() {
        assert!(Error::connection("x").is_transport_error());
        assert!(Error::connection_timeout(1000).is_transport_error());
        assert!(Error::ConnectionClosed.is_transport_error());
        assert!(Error::http(503, "unavailable").is_transport_error());
        assert!(!Error::protocol("rejected").is_transport_error());
        assert!(!Error::config("x").is_transport_error());
    }

    #[test]
    fn test_frame_too_large_is_transport_error() {
        let err = Error::frame_too_large("sse", 1024);
        assert_eq!(err.to_string(), "sse input exceeds 1024 buffered bytes");
        assert!(err.is_transport_error());
        assert!(!err.is_protocol_error());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(500).is_timeout());
        assert!(!Error::connection("x").is_timeout());
    }

    #[test]
    fn test_lifecycle_and_config_not_recoverable() {
        assert!(!Error::SupervisorClosed.is_recoverable());
        assert!(!Error::config("x").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_transport_error());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
