//! Realtime transport layer.
//!
//! This module connects to the backend over one of two transports and turns
//! everything the transport does into tagged [`TransportEvent`]s.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   AdapterEvent { generation, event }   ┌────────────┐
//! │  TransportAdapter    │───────────────────────────────────────►│ Supervisor │
//! │  (I/O task)          │◄───────────────────────────────────────│   task     │
//! │                      │   connect / subscribe / disconnect     └────────────┘
//! └──────────────────────┘
//!      │           │
//!      │ SockJS    │ HTTP GET
//!      ▼           ▼
//!  STOMP broker   SSE endpoint
//! ```
//!
//! # Adapter Lifecycle
//!
//! 1. `AdapterFactory::create` - New adapter bound to an [`EventSink`]
//! 2. `TransportAdapter::connect` - Spawn the I/O task
//! 3. `Opened` / `Message` / `ProtocolError` events flow to the supervisor
//! 4. `TransportError` or `Closed` ends the adapter's useful life
//! 5. `TransportAdapter::disconnect` - Mute the sink and stop the task
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `adapter` | Adapter and factory traits |
//! | `broker` | STOMP over SockJS |
//! | `event` | Tagged events and the event sink |
//! | `event_stream` | Server-Sent Events |

// ============================================================================
// Submodules
// ============================================================================

/// Adapter and factory traits.
pub mod adapter;

/// STOMP-over-SockJS adapter.
pub mod broker;

/// Tagged adapter events.
pub mod event;

/// Server-Sent Events adapter.
pub mod event_stream;

/// SockJS session link.
mod link;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{AdapterFactory, AdapterPhase, TransportAdapter, TransportKind};
pub use broker::{BrokerAdapter, BrokerFactory};
pub use event::{AdapterEvent, DisconnectReason, EventSink, TransportEvent};
pub use event_stream::{EventStreamAdapter, EventStreamFactory, ResumeState};
