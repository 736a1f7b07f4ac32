//! GPS Stream - Realtime vehicle position client.
//!
//! This library keeps a live connection to a GPS position feed and delivers
//! every decoded [`GpsUpdate`] to the callbacks registered for its topic.
//!
//! # Architecture
//!
//! One [`ConnectionSupervisor`] owns one transport adapter at a time:
//!
//! - **Broker**: STOMP over SockJS (WebSocket, XHR-polling fallback)
//! - **Event stream**: Server-Sent Events over HTTP
//!
//! Key design principles:
//!
//! - Callbacks live in a [`SubscriptionRegistry`], independent of any connection
//! - Every reconnect replays all registered topics on the new adapter
//! - Reconnects use a fixed delay ([`ReconnectPolicy`])
//! - Malformed payloads are dropped and reported, never fatal
//!
//! ```text
//!  adapter I/O task ──TransportEvent──► supervisor task ──decode──► registry ──► callbacks
//!         ▲                                   │
//!         └──────── connect / subscribe ──────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use gps_stream::{ConnectionState, StreamConfig, callback, Result};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = StreamConfig::builder()
//!         .broker("http://localhost:8090/ws")
//!         .topic("/topic/gps")
//!         .build()?;
//!
//!     let registry = config.registry();
//!     registry.register("/topic/gps", callback(|update| {
//!         println!("vehicle {} at {}, {}", update.vehicle_id, update.lat, update.lon);
//!     }));
//!
//!     let supervisor = config.supervisor(registry);
//!     supervisor.activate(None)?;
//!     supervisor
//!         .wait_for_state(ConnectionState::Connected, Duration::from_secs(10))
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     supervisor.deactivate().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Bearer token and connect headers |
//! | [`binding`] | Consumer mount/update/unmount lifecycle |
//! | [`config`] | [`StreamBuilder`] and transport options |
//! | [`decoder`] | Payload decoding into [`GpsUpdate`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | SockJS, STOMP and event-stream codecs |
//! | [`registry`] | Topic to callback registry |
//! | [`supervisor`] | Connection state machine and reconnects |
//! | [`transport`] | Transport adapters |

// ============================================================================
// Modules
// ============================================================================

/// Bearer token and connect headers.
pub mod auth;

/// Consumer lifetime binding.
pub mod binding;

/// Stream configuration.
///
/// Use [`StreamConfig::builder()`] to create a validated configuration.
pub mod config;

/// Payload decoder.
pub mod decoder;

/// Error types.
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire formats of both transports.
pub mod protocol;

/// Subscription registry.
pub mod registry;

/// Connection supervisor.
pub mod supervisor;

/// Transport adapters.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Auth types
pub use auth::{BearerToken, ConnectHeaders};

// Binding types
pub use binding::{BindingChange, BindingProps, ConsumerBinding};

// Config types
pub use config::{BrokerOptions, EventStreamOptions, StreamBuilder, StreamConfig, TransportOptions};

// Decoder
pub use decoder::{DecodeError, DecodeErrorKind, decode};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{Generation, SubscriptionId, Topic, VehicleId};

// Protocol types
pub use protocol::{FieldValue, GpsUpdate};

// Registry types
pub use registry::{Callback, SubscriptionHandle, SubscriptionRegistry, callback};

// Supervisor types
pub use supervisor::{ConnectionState, ConnectionSupervisor, LifecycleEvent, ReconnectPolicy};

// Transport types
pub use transport::{
    AdapterFactory, BrokerFactory, DisconnectReason, EventStreamFactory, TransportAdapter,
    TransportEvent, TransportKind,
};
