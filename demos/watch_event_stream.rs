//! Live positions from the event stream, through a consumer binding.
//!
//! Demonstrates:
//! - Building an event-stream configuration
//! - Mounting, updating and unmounting a consumer
//!
//! Usage:
//!   cargo run --example watch_event_stream
//!   cargo run --example watch_event_stream -- http://localhost:8080/api/v1/sse/gps
//!   cargo run --example watch_event_stream -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use common::Args;
use gps_stream::config::DEFAULT_EVENT_STREAM_ENDPOINT;
use gps_stream::{Result, StreamConfig, callback};

// ============================================================================
// Constants
// ============================================================================

const EVENT_NAME: &str = "gps";

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
    println!("=== Event stream: {EVENT_NAME} ===\n");

    let endpoint = args
        .endpoint
        .as_deref()
        .unwrap_or(DEFAULT_EVENT_STREAM_ENDPOINT);
    println!("[1] Endpoint: {endpoint}");

    let config = StreamConfig::builder()
        .event_stream(endpoint, EVENT_NAME)
        .build()?;

    // ========================================================================
    // Mount
    // ========================================================================

    let received = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&received);
    let mut binding = config.mount(
        config.registry(),
        callback(move |update| {
            counter.fetch_add(1, Ordering::Relaxed);
            common::print_update(&update);
        }),
        common::token_from_env(),
    )?;
    tokio::spawn(common::print_events(binding.supervisor().events()));
    println!("[2] Mounted\n");

    // ========================================================================
    // Re-render with equal props
    // ========================================================================

    let change = binding.update(binding.props().clone()).await?;
    println!("[3] Re-render: {change:?}\n");

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Unmount
    // ========================================================================

    binding.unmount().await;
    println!(
        "\n[4] Unmounted after {} updates",
        received.load(Ordering::Relaxed)
    );

    Ok(())
}
