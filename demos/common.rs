//! Shared utilities for demos.
//!
//! Provides common functionality used across all demos:
//! - Command-line argument parsing
//! - Logging initialization
//! - Graceful exit handling

#![allow(dead_code)]

// ============================================================================
// Imports
// ============================================================================

use gps_stream::{BearerToken, GpsUpdate, LifecycleEvent};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Types
// ============================================================================

/// Command-line arguments for demos.
#[derive(Debug, Clone)]
pub struct Args {
    pub debug: bool,
    pub no_wait: bool,
    /// First positional argument, if any.
    pub endpoint: Option<String>,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self {
            debug: args.iter().any(|a| a == "--debug"),
            no_wait: args.iter().any(|a| a == "--no-wait"),
            endpoint: args.iter().find(|a| !a.starts_with("--")).cloned(),
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Initialize tracing/logging.
pub fn init_logging(debug: bool) {
    let filter = if debug {
        "gps_stream=debug"
    } else {
        "gps_stream=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();
}

/// Token from `GPS_STREAM_TOKEN`, if set and non-blank.
pub fn token_from_env() -> Option<BearerToken> {
    std::env::var("GPS_STREAM_TOKEN").ok().and_then(BearerToken::new)
}

/// Print one update.
pub fn print_update(update: &GpsUpdate) {
    println!(
        "    vehicle {:>6}  lat {:>12}  lon {:>12}  spd {:>6}  ang {:>5}",
        update.vehicle_id, update.lat, update.lon, update.spd, update.ang
    );
}

/// Print lifecycle events until the channel closes.
pub async fn print_events(mut events: broadcast::Receiver<LifecycleEvent>) {
    loop {
        match events.recv().await {
            Ok(LifecycleEvent::StateChanged { from, to }) => println!("[State] {from} -> {to}"),
            Ok(LifecycleEvent::DecodeFailed { topic, error }) => {
                println!("[Drop] {topic}: {error}");
            }
            Ok(event) => println!("[Event] {event:?}"),
            Err(broadcast::error::RecvError::Lagged(n)) => println!("[Event] skipped {n}"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for Ctrl+C or skip if `--no-wait` flag is set.
pub async fn wait_for_exit(no_wait: bool) {
    if no_wait {
        println!("[--no-wait] Skipping wait");
        return;
    }

    println!("Press Ctrl+C to exit...");
    tokio::signal::ctrl_c().await.ok();
}
