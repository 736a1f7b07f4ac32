//! Shared utilities for integration tests.

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use gps_stream::{Callback, GpsUpdate, LifecycleEvent, callback};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// The reference payload.
pub const SAMPLE: &str = r#"{"vehicleId":7,"lat":"37.5","lon":"127.0","spd":"42","ang":"180"}"#;

/// The reference payload, cut short.
pub const TRUNCATED: &str = r#"{"vehicleId":7,"lat":"37.5""#;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing once; `RUST_LOG` controls the filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gps_stream=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A payload for another vehicle.
pub fn payload(vehicle_id: i64) -> String {
    format!(r#"{{"vehicleId":{vehicle_id},"lat":"37.5","lon":"127.0","spd":"42","ang":"180"}}"#)
}

/// A callback forwarding every update into a channel.
pub fn channel_callback() -> (Callback, mpsc::UnboundedReceiver<GpsUpdate>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let callback = callback(move |update| {
        let _ = tx.send(update);
    });
    (callback, rx)
}

/// Next update, failing the test after [`WAIT`].
pub async fn next_update(rx: &mut mpsc::UnboundedReceiver<GpsUpdate>) -> GpsUpdate {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for an update")
        .expect("callback channel closed")
}

/// First lifecycle event matching `predicate`.
pub async fn next_event<F>(
    events: &mut broadcast::Receiver<LifecycleEvent>,
    mut predicate: F,
) -> LifecycleEvent
where
    F: FnMut(&LifecycleEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for a lifecycle event")
}
