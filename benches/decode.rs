//! Decode path benchmark suite.
//!
//! Benchmarks the work done for every inbound position:
//! - JSON payload decoding (valid and malformed)
//! - SockJS + STOMP unwrapping of a broker message
//! - Event-stream parsing of a chunked body
//!
//! Run with: cargo bench --bench decode
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use gps_stream::decode;
use gps_stream::protocol::{
    EventStreamParser, Frame, SockJsFrame, StompCommand, StompData, StompDecoder,
};

// ============================================================================
// Fixtures
// ============================================================================

const SAMPLE: &str = r#"{"vehicleId":7,"lat":"37.5","lon":"127.0","spd":"42","ang":"180"}"#;
const TRUNCATED: &str = r#"{"vehicleId":7,"lat":"37.5""#;

const BATCH_SIZES: &[usize] = &[1, 16, 256];

/// A SockJS array frame carrying `count` STOMP MESSAGE frames.
fn sockjs_batch(count: usize) -> String {
    let frames: Vec<String> = (0..count)
        .map(|i| {
            Frame::new(StompCommand::Message)
                .header("destination", "/topic/gps")
                .header("subscription", "sub-0")
                .header("message-id", i.to_string())
                .body(SAMPLE)
                .encode()
        })
        .collect();
    format!("a{}", serde_json::to_string(&frames).expect("encode batch"))
}

/// An event-stream body with `count` named events.
fn event_stream_body(count: usize) -> Vec<u8> {
    let mut body = String::new();
    for i in 0..count {
        body.push_str(&format!("id: {i}\nevent: gps\ndata: {SAMPLE}\n\n"));
    }
    body.into_bytes()
}

// ============================================================================
// Benchmark: Payload Decoding
// ============================================================================

fn bench_payload(c: &mut Criterion) {
    let mut group = c.benchmark_group("payload");

    group.bench_function("valid", |b| b.iter(|| decode(black_box(SAMPLE))));
    group.bench_function("truncated", |b| b.iter(|| decode(black_box(TRUNCATED))));

    group.finish();
}

// ============================================================================
// Benchmark: Broker Frames
// ============================================================================

fn bench_broker(c: &mut Criterion) {
    let mut group = c.benchmark_group("broker");

    for &count in BATCH_SIZES {
        let raw = sockjs_batch(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("unwrap", count), &raw, |b, raw| {
            b.iter(|| {
                let mut decoder = StompDecoder::new();
                let mut decoded = 0usize;
                if let Ok(SockJsFrame::Messages(messages)) = SockJsFrame::decode(black_box(raw)) {
                    for message in &messages {
                        for frame in decoder.push(message).into_iter().flatten() {
                            if let StompData::Frame(frame) = frame
                                && decode(&frame.body).is_ok()
                            {
                                decoded += 1;
                            }
                        }
                    }
                }
                decoded
            });
        });
    }

    group.finish();
}

// ============================================================================
// Benchmark: Event Stream
// ============================================================================

fn bench_event_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_stream");

    for &count in BATCH_SIZES {
        let body = event_stream_body(count);
        group.throughput(Throughput::Bytes(body.len() as u64));
        group.bench_with_input(BenchmarkId::new("parse", count), &body, |b, body| {
            b.iter(|| {
                let mut parser = EventStreamParser::new();
                // Feed in 512-byte chunks, as a network read would.
                body.chunks(512)
                    .flat_map(|chunk| parser.feed(black_box(chunk)).unwrap_or_default())
                    .filter(|event| decode(&event.data).is_ok())
                    .count()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_payload, bench_broker, bench_event_stream);
criterion_main!(benches);
