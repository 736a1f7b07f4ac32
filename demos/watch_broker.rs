//! Live positions from the STOMP broker.
//!
//! Demonstrates:
//! - Building a broker configuration
//! - Registering a callback and activating a supervisor
//! - Observing lifecycle events
//!
//! Usage:
//!   cargo run --example watch_broker
//!   cargo run --example watch_broker -- http://localhost:8090/ws
//!   cargo run --example watch_broker -- --debug
//!   GPS_STREAM_TOKEN=... cargo run --example watch_broker

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use gps_stream::config::DEFAULT_BROKER_ENDPOINT;
use gps_stream::{ConnectionState, Result, StreamConfig, callback};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Broker: /topic/gps ===\n");

    let endpoint = args.endpoint.as_deref().unwrap_or(DEFAULT_BROKER_ENDPOINT);
    println!("[1] Endpoint: {endpoint}");

    let config = StreamConfig::builder()
        .broker(endpoint)
        .topic("/topic/gps")
        .build()?;

    let registry = config.registry();
    registry.register(config.default_topic(), callback(|update| common::print_update(&update)));

    let supervisor = config.supervisor(registry);
    tokio::spawn(common::print_events(supervisor.events()));

    println!("[2] Connecting...");
    supervisor.activate(common::token_from_env())?;

    match supervisor
        .wait_for_state(ConnectionState::Connected, Duration::from_secs(15))
        .await
    {
        Ok(()) => println!("    ✓ Connected\n"),
        Err(e) if e.is_timeout() => {
            println!("    ✗ Not connected yet ({e}); retrying in the background\n");
        }
        Err(e) => return Err(e),
    }

    common::wait_for_exit(args.no_wait).await;

    println!("\n[3] Disconnecting...");
    supervisor.deactivate().await;
    println!("    ✓ Closed");

    Ok(())
}
