//! Event-stream transport against an in-process HTTP server.

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::collections::HashMap;

use anyhow::{Context, Result};
use gps_stream::{
    BearerToken, BindingChange, ConnectionState, LifecycleEvent, StreamConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use common::{SAMPLE, TRUNCATED, WAIT};

// ============================================================================
// Fake Server
// ============================================================================

const EVENT_STREAM_HEAD: &str = "HTTP/1.1 200 OK\r\n\
    Content-Type: text/event-stream\r\n\
    Cache-Control: no-cache\r\n\
    Connection: close\r\n\r\n";

/// One accepted request.
struct Request {
    stream: TcpStream,
    line: String,
    headers: HashMap<String, String>,
}

impl Request {
    async fn accept(listener: &TcpListener) -> Result<Self> {
        let (mut stream, _) = tokio::time::timeout(WAIT, listener.accept())
            .await
            .context("no request arrived")??;

        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                anyhow::bail!("client closed before sending headers");
            }
            head.extend_from_slice(&buf[..n]);
        }

        let text = String::from_utf8_lossy(&head).into_owned();
        let mut lines = text.split("\r\n");
        let line = lines.next().unwrap_or_default().to_string();
        let headers = lines
            .take_while(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();

        Ok(Self {
            stream,
            line,
            headers,
        })
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    async fn respond(&mut self, head: &str, body: &str) -> Result<()> {
        self.stream.write_all(head.as_bytes()).await?;
        self.stream.write_all(body.as_bytes()).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Writes the body and closes the connection.
    async fn finish(mut self, body: &str) -> Result<()> {
        self.respond(EVENT_STREAM_HEAD, body).await?;
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn fake_server(event_name: &str) -> Result<(TcpListener, StreamConfig)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let port = listener.local_addr()?.port();

    let config = StreamConfig::builder()
        .event_stream(format!("http://127.0.0.1:{port}/api/v1/sse/gps"), event_name)
        .reconnect_delay(std::time::Duration::from_millis(100))
        .build()?;

    Ok((listener, config))
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_filters_events_and_resumes_after_reconnect() -> Result<()> {
    common::init_tracing();
    let (listener, config) = fake_server("gps").await?;

    let registry = config.registry();
    let (callback, mut updates) = common::channel_callback();
    registry.register(config.default_topic(), callback);

    let supervisor = config.supervisor(registry);
    let mut events = supervisor.events();
    supervisor.activate(BearerToken::new("abc"))?;

    // First session: one good event, one foreign event, one truncated, then EOF.
    let first = Request::accept(&listener).await?;
    assert!(first.line.starts_with("GET /api/v1/sse/gps "));
    assert_eq!(first.header("accept"), Some("text/event-stream"));
    assert_eq!(first.header("authorization"), Some("Bearer abc"));
    assert_eq!(first.header("last-event-id"), None);
    let other = common::payload(99);
    first
        .finish(&format!(
            "retry: 50\n\
             id: 1\nevent: gps\ndata: {SAMPLE}\n\n\
             id: 2\nevent: other\ndata: {other}\n\n\
             id: 3\nevent: gps\ndata: {TRUNCATED}\n\n"
        ))
        .await?;

    let update = common::next_update(&mut updates).await;
    assert_eq!(update.vehicle_id.as_i64(), 7);

    let failed = common::next_event(&mut events, |e| {
        matches!(e, LifecycleEvent::DecodeFailed { .. })
    })
    .await;
    assert!(matches!(failed, LifecycleEvent::DecodeFailed { error, .. } if error.raw() == TRUNCATED));

    // Second session resumes after the last seen id.
    let mut second = Request::accept(&listener).await?;
    assert_eq!(second.header("last-event-id"), Some("3"));
    assert_eq!(second.header("authorization"), Some("Bearer abc"));
    let next = common::payload(8);
    second
        .respond(EVENT_STREAM_HEAD, &format!("id: 4\nevent: gps\ndata: {next}\n\n"))
        .await?;

    // Neither the foreign nor the truncated event produced a callback.
    let update = common::next_update(&mut updates).await;
    assert_eq!(update.vehicle_id.as_i64(), 8);
    assert_eq!(supervisor.state(), ConnectionState::Connected);

    supervisor.deactivate().await;
    Ok(())
}

#[tokio::test]
async fn test_rejected_request_schedules_reconnect() -> Result<()> {
    common::init_tracing();
    let (listener, config) = fake_server("gps").await?;

    let supervisor = config.supervisor(config.registry());
    let mut events = supervisor.events();
    supervisor.activate(None)?;

    let mut request = Request::accept(&listener).await?;
    request
        .respond(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            "",
        )
        .await?;

    let error = common::next_event(&mut events, |e| {
        matches!(e, LifecycleEvent::TransportError { .. })
    })
    .await;
    assert!(matches!(error, LifecycleEvent::TransportError { message } if message.contains("503")));
    supervisor
        .wait_for_state(ConnectionState::Reconnecting, WAIT)
        .await?;

    // The next attempt arrives after the reconnect delay.
    let retry = Request::accept(&listener).await?;
    assert!(retry.line.starts_with("GET "));

    supervisor.deactivate().await;
    Ok(())
}

#[tokio::test]
async fn test_unterminated_line_fails_session() -> Result<()> {
    common::init_tracing();
    let (listener, config) = fake_server("gps").await?;

    let supervisor = config.supervisor(config.registry());
    let mut events = supervisor.events();
    supervisor.activate(None)?;

    // Over a megabyte of data with no line terminator, connection left open.
    let mut request = Request::accept(&listener).await?;
    let flood = format!("data: {}", "x".repeat(1024 * 1024 + 1));
    request.respond(EVENT_STREAM_HEAD, &flood).await?;

    let error = common::next_event(&mut events, |e| {
        matches!(e, LifecycleEvent::TransportError { .. })
    })
    .await;
    assert!(
        matches!(&error, LifecycleEvent::TransportError { message } if message.contains("exceeds")),
        "unexpected event: {error:?}"
    );

    let retry = Request::accept(&listener).await?;
    assert!(retry.line.starts_with("GET "));

    supervisor.deactivate().await;
    Ok(())
}

#[tokio::test]
async fn test_binding_lifecycle() -> Result<()> {
    common::init_tracing();
    let (listener, config) = fake_server("gps").await?;

    let registry = config.registry();
    let (callback, mut updates) = common::channel_callback();
    let mut binding = config.mount(registry.clone(), callback, None)?;

    let mut request = Request::accept(&listener).await?;
    request
        .respond(EVENT_STREAM_HEAD, &format!("event: gps\ndata: {SAMPLE}\n\n"))
        .await?;
    common::next_update(&mut updates).await;

    let change = binding.update(binding.props().clone()).await?;
    assert_eq!(change, BindingChange::Unchanged);

    binding.unmount().await;
    assert!(registry.is_empty());

    // Unmount stopped the connection; no new request follows.
    let again = tokio::time::timeout(std::time::Duration::from_millis(300), listener.accept()).await;
    assert!(again.is_err());
    Ok(())
}
