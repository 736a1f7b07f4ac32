//! Wire formats.
//!
//! This module defines the payload record and the codecs of both realtime
//! transports.
//!
//! # Protocol Overview
//!
//! | Layer | Broker transport | Event-stream transport |
//! |-------|------------------|------------------------|
//! | Session | SockJS (`sockjs`) | HTTP response body |
//! | Messaging | STOMP (`stomp`) | Server-Sent Events (`sse`) |
//! | Payload | JSON [`GpsUpdate`] | JSON [`GpsUpdate`] |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `gps` | GPS update record |
//! | `sockjs` | SockJS frames and session URLs |
//! | `sse` | Incremental event-stream parser |
//! | `stomp` | STOMP frame encoder/decoder |

// ============================================================================
// Submodules
// ============================================================================

/// GPS update record.
pub mod gps;

/// SockJS session framing.
pub mod sockjs;

/// Server-Sent Events parser.
pub mod sse;

/// STOMP frame codec.
pub mod stomp;

// ============================================================================
// Re-exports
// ============================================================================

pub use gps::{FieldValue, GpsUpdate};
pub use sockjs::{SessionPath, SockJsFrame, SockJsInfo};
pub use sse::{EventStreamParser, SseEvent};
pub use stomp::{Frame, HeartBeat, StompCommand, StompData, StompDecoder};
