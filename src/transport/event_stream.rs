//! Server-Sent Events adapter.
//!
//! Opens one long-lived `GET` and forwards events of the configured type.
//! The transport has no subscribe step: the endpoint and event name are
//! fixed when the factory is built.
//!
//! The EventSource auto-retry is not used. Every interruption is
//! reported as `TransportError` or `Closed` (with the server's `retry:` hint)
//! and the supervisor decides when to open the next stream. The last event
//! ID is shared by all adapters of one factory, so the next stream resumes
//! with `Last-Event-ID`.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, trace, warn};
use url::Url;

use crate::auth::ConnectHeaders;
use crate::config::EventStreamOptions;
use crate::error::{Error, Result};
use crate::identifiers::{SubscriptionId, Topic};
use crate::protocol::EventStreamParser;

use super::adapter::{AdapterFactory, AdapterPhase, TransportAdapter, TransportKind};
use super::event::{DisconnectReason, EventSink, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// MIME type required on the response.
const EVENT_STREAM_MIME: &str = "text/event-stream";

/// Request header carrying the resume position.
const LAST_EVENT_ID: &str = "Last-Event-ID";

/// Time given to the stream task to stop before it is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// ResumeState
// ============================================================================

/// Last event ID shared across adapter generations.
#[derive(Debug, Clone, Default)]
pub struct ResumeState(Arc<Mutex<Option<String>>>);

impl ResumeState {
    /// Creates empty resume state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last event ID seen.
    #[must_use]
    pub fn last_event_id(&self) -> Option<String> {
        self.0.lock().clone()
    }

    fn set(&self, id: Option<&str>) {
        let mut guard = self.0.lock();
        if guard.as_deref() != id {
            *guard = id.map(str::to_owned);
        }
    }
}

// ============================================================================
// EventStreamAdapter
// ============================================================================

/// Adapter for a `text/event-stream` endpoint.
pub struct EventStreamAdapter {
    options: Arc<EventStreamOptions>,
    client: reqwest::Client,
    sink: EventSink,
    resume: ResumeState,
    phase: AdapterPhase,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl EventStreamAdapter {
    /// Creates an adapter. Nothing happens until [`connect`](TransportAdapter::connect).
    pub fn new(
        options: Arc<EventStreamOptions>,
        client: reqwest::Client,
        sink: EventSink,
        resume: ResumeState,
    ) -> Self {
        Self {
            options,
            client,
            sink,
            resume,
            phase: AdapterPhase::New,
            cancel: None,
            task: None,
        }
    }

    /// Current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> AdapterPhase {
        self.phase
    }
}

#[async_trait]
impl TransportAdapter for EventStreamAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::EventStream
    }

    fn connect(&mut self, endpoint: &Url, headers: &ConnectHeaders) -> Result<()> {
        match self.phase {
            AdapterPhase::Active => {
                debug!(generation = %self.sink.generation(), "Event stream already open");
                return Ok(());
            }
            AdapterPhase::Stopped => return Err(Error::ConnectionClosed),
            AdapterPhase::New => {}
        }

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                endpoint.as_str(),
                "event stream endpoint must be http or https",
            ));
        }

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let stream = StreamTask {
            endpoint: endpoint.clone(),
            headers: headers.clone(),
            options: Arc::clone(&self.options),
            client: self.client.clone(),
            sink: self.sink.clone(),
            resume: self.resume.clone(),
        };

        self.task = Some(tokio::spawn(stream.run(cancel_rx)));
        self.cancel = Some(cancel_tx);
        self.phase = AdapterPhase::Active;
        Ok(())
    }

    fn subscribe(&mut self, topic: &Topic) -> Result<SubscriptionId> {
        if self.phase == AdapterPhase::Stopped {
            return Err(Error::ConnectionClosed);
        }
        if topic.as_str() != self.options.event_name {
            return Err(Error::protocol(format!(
                "event stream delivers '{}' only, cannot subscribe to '{topic}'",
                self.options.event_name
            )));
        }
        Ok(SubscriptionId::new(format!("event-{}", self.options.event_name)))
    }

    fn unsubscribe(&mut self, _topic: &Topic) -> Result<()> {
        if self.phase == AdapterPhase::Stopped {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.phase == AdapterPhase::Stopped {
            return;
        }
        self.phase = AdapterPhase::Stopped;
        self.sink.mute();
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }

        if let Some(mut task) = self.task.take()
            && timeout(SHUTDOWN_GRACE, &mut task).await.is_err()
        {
            warn!(generation = %self.sink.generation(), "Event stream did not stop in time, aborting");
            task.abort();
        }
    }
}

impl Drop for EventStreamAdapter {
    fn drop(&mut self) {
        self.sink.mute();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ============================================================================
// EventStreamFactory
// ============================================================================

/// Builds [`EventStreamAdapter`]s for one endpoint and event name.
#[derive(Debug, Clone)]
pub struct EventStreamFactory {
    endpoint: Url,
    options: Arc<EventStreamOptions>,
    client: reqwest::Client,
    resume: ResumeState,
}

impl EventStreamFactory {
    /// Creates a factory with fresh resume state.
    pub fn new(endpoint: Url, options: EventStreamOptions) -> Self {
        Self {
            endpoint,
            options: Arc::new(options),
            client: reqwest::Client::new(),
            resume: ResumeState::new(),
        }
    }

    /// Options adapters are created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &EventStreamOptions {
        &self.options
    }

    /// Resume state shared by this factory's adapters.
    #[inline]
    #[must_use]
    pub fn resume_state(&self) -> &ResumeState {
        &self.resume
    }
}

impl AdapterFactory for EventStreamFactory {
    fn kind(&self) -> TransportKind {
        TransportKind::EventStream
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn endpoint_key(&self) -> String {
        format!(
            "{}:{}#{}",
            self.kind(),
            self.endpoint,
            self.options.event_name
        )
    }

    fn create(&self, sink: EventSink) -> Box<dyn TransportAdapter> {
        Box::new(EventStreamAdapter::new(
            Arc::clone(&self.options),
            self.client.clone(),
            sink,
            self.resume.clone(),
        ))
    }
}

// ============================================================================
// Stream Task
// ============================================================================

struct StreamTask {
    endpoint: Url,
    headers: ConnectHeaders,
    options: Arc<EventStreamOptions>,
    client: reqwest::Client,
    sink: EventSink,
    resume: ResumeState,
}

impl StreamTask {
    async fn run(self, cancel_rx: oneshot::Receiver<()>) {
        let generation = self.sink.generation();

        tokio::select! {
            _ = cancel_rx => {
                trace!(%generation, "Event stream cancelled");
            }
            exit = self.pump() => {
                if let Some(event) = exit {
                    debug!(%generation, event = ?event, "Event stream interrupted");
                    self.sink.emit(event);
                }
            }
        }
    }

    /// Reads the stream until it ends. Returns the terminal event to report,
    /// or `None` once the sink is muted.
    async fn pump(&self) -> Option<TransportEvent> {
        let last_event_id = self.resume.last_event_id();

        let mut request = self
            .client
            .get(self.endpoint.clone())
            .header(ACCEPT, EVENT_STREAM_MIME)
            .header(CACHE_CONTROL, "no-cache");
        for (name, value) in self.headers.iter() {
            request = request.header(name, value);
        }
        if let Some(id) = &last_event_id {
            request = request.header(LAST_EVENT_ID, id.as_str());
        }

        let connect_timeout = self.options.connect_timeout;
        let response = match timeout(connect_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Some(failure(e.into())),
            Err(_) => {
                let ms = u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX);
                return Some(failure(Error::connection_timeout(ms)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Some(failure(Error::http(
                status.as_u16(),
                "event stream request rejected",
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if !is_event_stream(content_type) {
            return Some(failure(Error::connection(format!(
                "unexpected content type '{content_type}'"
            ))));
        }

        if !self.sink.emit(TransportEvent::Opened) {
            return None;
        }
        debug!(
            generation = %self.sink.generation(),
            resume = last_event_id.as_deref(),
            "Event stream open"
        );

        let topic = Topic::new(self.options.event_name.clone());
        let mut parser = EventStreamParser::resuming(last_event_id);
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => return Some(failure(e.into())),
            };

            let events = match parser.feed(&bytes) {
                Ok(events) => events,
                Err(e) => return Some(failure(e)),
            };
            for event in events {
                if event.event != self.options.event_name {
                    trace!(event = %event.event, "Ignoring event of another type");
                    continue;
                }
                let delivered = self.sink.emit(TransportEvent::Message {
                    topic: topic.clone(),
                    raw: event.data,
                });
                if !delivered {
                    return None;
                }
            }
            self.resume.set(parser.last_event_id());
        }

        Some(TransportEvent::Closed(
            DisconnectReason::new("event stream ended").with_retry(parser.retry()),
        ))
    }
}

fn failure(error: Error) -> TransportEvent {
    TransportEvent::transport_error(error.to_string())
}

fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(EVENT_STREAM_MIME))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::identifiers::Generation;

    fn factory() -> EventStreamFactory {
        EventStreamFactory::new(
            Url::parse("http://localhost:8080/api/v1/sse/gps").expect("url"),
            EventStreamOptions::new().with_event_name("gps"),
        )
    }

    #[test]
    fn test_content_type_check() {
        assert!(is_event_stream("text/event-stream"));
        assert!(is_event_stream("Text/Event-Stream; charset=utf-8"));
        assert!(!is_event_stream("application/json"));
        assert!(!is_event_stream(""));
    }

    #[test]
    fn test_subscribe_only_configured_event() {
        let (sink, _rx) = EventSink::channel(Generation::INITIAL);
        let mut adapter = factory().create(sink);

        let id = adapter.subscribe(&Topic::new("gps")).expect("subscribe");
        assert_eq!(id.as_str(), "event-gps");
        assert!(adapter.subscribe(&Topic::new("/topic/gps")).is_err());
        assert!(adapter.unsubscribe(&Topic::new("gps")).is_ok());
    }

    #[test]
    fn test_endpoint_key_includes_event_name() {
        let a = factory();
        let b = EventStreamFactory::new(
            a.endpoint().clone(),
            EventStreamOptions::new().with_event_name("other"),
        );
        assert_ne!(a.endpoint_key(), b.endpoint_key());
    }

    #[test]
    fn test_resume_state_shared_by_clones() {
        let state = ResumeState::new();
        let clone = state.clone();
        state.set(Some("42"));
        assert_eq!(clone.last_event_id().as_deref(), Some("42"));
        state.set(None);
        assert_eq!(clone.last_event_id(), None);
    }

    #[tokio::test]
    async fn test_disconnect_before_connect() {
        let (sink, mut rx) = EventSink::channel(Generation::INITIAL);
        let mut adapter = factory().create(sink);
        adapter.disconnect().await;
        adapter.disconnect().await;

        let endpoint = Url::parse("http://localhost:8080/").expect("url");
        assert!(matches!(
            adapter.connect(&endpoint, &ConnectHeaders::new()),
            Err(Error::ConnectionClosed)
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_refused_connection_reports_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        drop(listener);

        let (sink, mut rx) = EventSink::channel(Generation::INITIAL.next());
        let mut adapter = factory().create(sink);
        let endpoint = Url::parse(&format!("http://127.0.0.1:{port}/sse")).expect("url");
        adapter.connect(&endpoint, &ConnectHeaders::new()).expect("connect");

        let event = rx.recv().await.expect("event");
        assert_eq!(event.generation, Generation::INITIAL.next());
        assert!(matches!(event.event, TransportEvent::TransportError { .. }));
    }
}
