//! STOMP-over-SockJS adapter.
//!
//! # Session Flow
//!
//! ```text
//! SockJS "o"  ──►  CONNECT (accept-version, host, heart-beat, Authorization)
//! CONNECTED   ──►  Opened, pending SUBSCRIBE frames sent
//! MESSAGE     ──►  Message { topic: destination, raw: body }
//! ERROR       ──►  ProtocolError (session left as the broker left it)
//! c[code,..]  ──►  Closed
//! ```
//!
//! Outgoing heart-beats run at the negotiated interval. If nothing arrives
//! for twice the negotiated server interval the session is treated as dead.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until, timeout};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::auth::ConnectHeaders;
use crate::config::BrokerOptions;
use crate::error::{Error, Result};
use crate::identifiers::{SubscriptionId, Topic};
use crate::protocol::stomp::{Frame, HeartBeat, StompCommand, StompData, StompDecoder};
use crate::protocol::SockJsFrame;

use super::adapter::{AdapterFactory, AdapterPhase, TransportAdapter, TransportKind};
use super::event::{DisconnectReason, EventSink, TransportEvent};
use super::link::{LinkEvent, LinkSender, SockJsLink};

// ============================================================================
// Constants
// ============================================================================

/// Time given to the session task to send `DISCONNECT` before it is aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Receipt id requested with `DISCONNECT`.
const DISCONNECT_RECEIPT: &str = "disconnect-0";

// ============================================================================
// BrokerCommand
// ============================================================================

/// Commands from the adapter handle to its session task.
#[derive(Debug)]
enum BrokerCommand {
    Subscribe { id: SubscriptionId, destination: Topic },
    Unsubscribe { id: SubscriptionId },
    Shutdown,
}

// ============================================================================
// BrokerAdapter
// ============================================================================

/// Adapter for a STOMP broker behind a SockJS endpoint.
pub struct BrokerAdapter {
    options: Arc<BrokerOptions>,
    client: reqwest::Client,
    sink: EventSink,
    phase: AdapterPhase,
    command_tx: Option<mpsc::UnboundedSender<BrokerCommand>>,
    task: Option<JoinHandle<()>>,
    subscriptions: FxHashMap<Topic, SubscriptionId>,
    next_seq: u64,
}

impl BrokerAdapter {
    /// Creates an adapter. Nothing happens until [`connect`](TransportAdapter::connect).
    pub fn new(options: Arc<BrokerOptions>, client: reqwest::Client, sink: EventSink) -> Self {
        Self {
            options,
            client,
            sink,
            phase: AdapterPhase::New,
            command_tx: None,
            task: None,
            subscriptions: FxHashMap::default(),
            next_seq: 0,
        }
    }

    /// Current lifecycle phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> AdapterPhase {
        self.phase
    }

    fn send_command(&self, command: BrokerCommand) {
        if let Some(tx) = &self.command_tx {
            let _ = tx.send(command);
        }
    }
}

#[async_trait]
impl TransportAdapter for BrokerAdapter {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn connect(&mut self, endpoint: &Url, headers: &ConnectHeaders) -> Result<()> {
        match self.phase {
            AdapterPhase::Active => {
                debug!(generation = %self.sink.generation(), "Broker adapter already connecting");
                return Ok(());
            }
            AdapterPhase::Stopped => return Err(Error::ConnectionClosed),
            AdapterPhase::New => {}
        }

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::invalid_url(
                endpoint.as_str(),
                "SockJS endpoint must be http or https",
            ));
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        for (topic, id) in &self.subscriptions {
            let _ = command_tx.send(BrokerCommand::Subscribe {
                id: id.clone(),
                destination: topic.clone(),
            });
        }

        let session = Session {
            endpoint: endpoint.clone(),
            headers: headers.clone(),
            options: Arc::clone(&self.options),
            sink: self.sink.clone(),
            decoder: StompDecoder::new(),
            subscriptions: FxHashMap::default(),
            connected: false,
            last_inbound: Instant::now(),
            send_every: None,
            expect_every: None,
        };

        self.task = Some(tokio::spawn(run_session(
            session,
            self.client.clone(),
            command_rx,
        )));
        self.command_tx = Some(command_tx);
        self.phase = AdapterPhase::Active;
        Ok(())
    }

    fn subscribe(&mut self, topic: &Topic) -> Result<SubscriptionId> {
        if self.phase == AdapterPhase::Stopped {
            return Err(Error::ConnectionClosed);
        }
        if let Some(id) = self.subscriptions.get(topic) {
            return Ok(id.clone());
        }

        let id = SubscriptionId::from_seq(self.next_seq);
        self.next_seq += 1;
        self.subscriptions.insert(topic.clone(), id.clone());
        self.send_command(BrokerCommand::Subscribe {
            id: id.clone(),
            destination: topic.clone(),
        });
        Ok(id)
    }

    fn unsubscribe(&mut self, topic: &Topic) -> Result<()> {
        if self.phase == AdapterPhase::Stopped {
            return Err(Error::ConnectionClosed);
        }
        if let Some(id) = self.subscriptions.remove(topic) {
            self.send_command(BrokerCommand::Unsubscribe { id });
        }
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.phase == AdapterPhase::Stopped {
            return;
        }
        self.phase = AdapterPhase::Stopped;
        self.sink.mute();
        self.send_command(BrokerCommand::Shutdown);
        self.command_tx = None;

        if let Some(mut task) = self.task.take()
            && timeout(SHUTDOWN_GRACE, &mut task).await.is_err()
        {
            warn!(generation = %self.sink.generation(), "Broker session did not stop in time, aborting");
            task.abort();
        }
    }
}

impl Drop for BrokerAdapter {
    fn drop(&mut self) {
        if self.phase == AdapterPhase::Active {
            self.sink.mute();
            self.send_command(BrokerCommand::Shutdown);
        }
    }
}

// ============================================================================
// BrokerFactory
// ============================================================================

/// Builds [`BrokerAdapter`]s for one SockJS endpoint.
#[derive(Debug, Clone)]
pub struct BrokerFactory {
    endpoint: Url,
    options: Arc<BrokerOptions>,
    client: reqwest::Client,
}

impl BrokerFactory {
    /// Creates a factory. The HTTP client is shared by all adapters.
    pub fn new(endpoint: Url, options: BrokerOptions) -> Self {
        Self {
            endpoint,
            options: Arc::new(options),
            client: reqwest::Client::new(),
        }
    }

    /// Options adapters are created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BrokerOptions {
        &self.options
    }
}

impl AdapterFactory for BrokerFactory {
    fn kind(&self) -> TransportKind {
        TransportKind::Broker
    }

    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn create(&self, sink: EventSink) -> Box<dyn TransportAdapter> {
        Box::new(BrokerAdapter::new(
            Arc::clone(&self.options),
            self.client.clone(),
            sink,
        ))
    }
}

// ============================================================================
// Session Task
// ============================================================================

/// How a session ended.
enum Exit {
    Shutdown,
    Failed(String),
    Closed(DisconnectReason),
}

impl From<Error> for Exit {
    fn from(e: Error) -> Self {
        Self::Failed(e.to_string())
    }
}

type Step = std::result::Result<(), Exit>;

/// State owned by the session task.
struct Session {
    endpoint: Url,
    headers: ConnectHeaders,
    options: Arc<BrokerOptions>,
    sink: EventSink,
    decoder: StompDecoder,
    /// Active subscriptions by id.
    subscriptions: FxHashMap<SubscriptionId, Topic>,
    connected: bool,
    last_inbound: Instant,
    send_every: Option<Duration>,
    expect_every: Option<Duration>,
}

async fn run_session(
    mut session: Session,
    client: reqwest::Client,
    mut command_rx: mpsc::UnboundedReceiver<BrokerCommand>,
) {
    let generation = session.sink.generation();
    let connect_timeout = session.options.connect_timeout;
    let deadline = Instant::now() + connect_timeout;

    // Commands issued while the link opens are applied once it is up.
    let mut queued = Vec::new();
    let endpoint = session.endpoint.clone();
    let options = Arc::clone(&session.options);
    let open = timeout(connect_timeout, SockJsLink::open(&endpoint, &options, &client));
    tokio::pin!(open);

    let link = loop {
        tokio::select! {
            result = &mut open => match result {
                Ok(Ok(link)) => break link,
                Ok(Err(e)) => {
                    session.finish(Exit::from(e));
                    return;
                }
                Err(_) => {
                    session.finish(Exit::from(Error::connection_timeout(millis(connect_timeout))));
                    return;
                }
            },
            command = command_rx.recv() => match command {
                Some(BrokerCommand::Shutdown) | None => {
                    debug!(%generation, "Broker session cancelled while opening");
                    return;
                }
                Some(command) => queued.push(command),
            },
        }
    };

    debug!(%generation, mode = ?link.mode, "SockJS session open");
    for command in queued {
        session.apply_offline(command);
    }

    let SockJsLink {
        mut inbound,
        mut outbound,
        reader: _reader,
        ..
    } = link;

    let exit = session
        .drive(&mut inbound, &mut outbound, &mut command_rx, deadline)
        .await;

    if session.connected && matches!(exit, Exit::Shutdown) {
        let frame = Frame::disconnect(DISCONNECT_RECEIPT).encode();
        if let Err(e) = outbound.send(&[frame]).await {
            debug!(%generation, error = %e, "Failed to send DISCONNECT");
        }
    }
    outbound.close().await;
    session.finish(exit);
    trace!(%generation, "Broker session terminated");
}

impl Session {
    async fn drive(
        &mut self,
        inbound: &mut mpsc::UnboundedReceiver<LinkEvent>,
        outbound: &mut LinkSender,
        command_rx: &mut mpsc::UnboundedReceiver<BrokerCommand>,
        deadline: Instant,
    ) -> Exit {
        let mut send_ticker: Option<Interval> = None;
        let mut check_ticker: Option<Interval> = None;

        loop {
            let step = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(BrokerCommand::Shutdown) | None => return Exit::Shutdown,
                    Some(command) => self.apply(command, outbound).await,
                },

                event = inbound.recv() => match event {
                    Some(event) => {
                        let step = self.handle_link_event(event, outbound).await;
                        if self.connected && send_ticker.is_none() && check_ticker.is_none() {
                            send_ticker = self.send_every.map(ticker);
                            check_ticker = self.expect_every.map(ticker);
                        }
                        step
                    }
                    None => Err(Exit::Failed("SockJS link closed".into())),
                },

                _ = tick(&mut send_ticker) => {
                    trace!(generation = %self.sink.generation(), "Sending heart-beat");
                    outbound.send(&["\n".to_string()]).await.map_err(Exit::from)
                }

                _ = tick(&mut check_ticker) => self.check_liveness(),

                _ = sleep_until(deadline), if !self.connected => {
                    Err(Exit::from(Error::connection_timeout(millis(self.options.connect_timeout))))
                }
            };

            if let Err(exit) = step {
                return exit;
            }
        }
    }

    /// Records a command while the link is still opening.
    fn apply_offline(&mut self, command: BrokerCommand) {
        match command {
            BrokerCommand::Subscribe { id, destination } => {
                self.subscriptions.insert(id, destination);
            }
            BrokerCommand::Unsubscribe { id } => {
                self.subscriptions.remove(&id);
            }
            BrokerCommand::Shutdown => {}
        }
    }

    async fn apply(&mut self, command: BrokerCommand, outbound: &mut LinkSender) -> Step {
        match command {
            BrokerCommand::Subscribe { id, destination } => {
                let frame = Frame::subscribe(id.as_str(), destination.as_str());
                self.subscriptions.insert(id, destination);
                if self.connected {
                    outbound.send(&[frame.encode()]).await?;
                }
            }
            BrokerCommand::Unsubscribe { id } => {
                if self.subscriptions.remove(&id).is_some() && self.connected {
                    outbound
                        .send(&[Frame::unsubscribe(id.as_str()).encode()])
                        .await?;
                }
            }
            BrokerCommand::Shutdown => return Err(Exit::Shutdown),
        }
        Ok(())
    }

    async fn handle_link_event(&mut self, event: LinkEvent, outbound: &mut LinkSender) -> Step {
        self.last_inbound = Instant::now();

        match event {
            LinkEvent::Frame(SockJsFrame::Open) => {
                let frame = Frame::connect(self.host(), self.options.heart_beat, self.headers.iter());
                outbound.send(&[frame.encode()]).await?;
                trace!(generation = %self.sink.generation(), "CONNECT sent");
                Ok(())
            }
            LinkEvent::Frame(SockJsFrame::Heartbeat) => Ok(()),
            LinkEvent::Frame(SockJsFrame::Messages(messages)) => {
                for message in messages {
                    for item in self.decoder.push(&message) {
                        match item {
                            Ok(StompData::HeartBeat) => {}
                            Ok(StompData::Frame(frame)) => self.handle_frame(frame, outbound).await?,
                            Err(e) if e.is_transport_error() => return Err(Exit::from(e)),
                            Err(e) => self.protocol_error("Malformed STOMP frame", e.to_string()),
                        }
                    }
                }
                Ok(())
            }
            LinkEvent::Frame(SockJsFrame::Close { code, reason }) => {
                Err(Exit::Closed(DisconnectReason::new(reason).with_code(code)))
            }
            LinkEvent::Malformed(e) => {
                self.protocol_error("Malformed SockJS frame", e.to_string());
                Ok(())
            }
            LinkEvent::Failed(e) => Err(Exit::from(e)),
            LinkEvent::Ended(reason) => Err(Exit::Closed(DisconnectReason::new(reason))),
        }
    }

    async fn handle_frame(&mut self, frame: Frame, outbound: &mut LinkSender) -> Step {
        match frame.command {
            StompCommand::Connected => {
                if self.connected {
                    warn!(generation = %self.sink.generation(), "Duplicate CONNECTED ignored");
                    return Ok(());
                }
                let server = match frame.get("heart-beat") {
                    Some(value) => HeartBeat::parse(value).unwrap_or_else(|e| {
                        warn!(error = %e, "Ignoring server heart-beat");
                        HeartBeat::default()
                    }),
                    None => HeartBeat::default(),
                };
                (self.send_every, self.expect_every) = self.options.heart_beat.negotiate(&server);
                self.connected = true;

                info!(
                    generation = %self.sink.generation(),
                    version = frame.get("version").unwrap_or("1.0"),
                    send_every = ?self.send_every,
                    expect_every = ?self.expect_every,
                    "STOMP session connected"
                );
                self.sink.emit(TransportEvent::Opened);

                if !self.subscriptions.is_empty() {
                    let frames: Vec<String> = self
                        .subscriptions
                        .iter()
                        .map(|(id, topic)| Frame::subscribe(id.as_str(), topic.as_str()).encode())
                        .collect();
                    outbound.send(&frames).await?;
                }
            }

            StompCommand::Message => match frame.get("destination") {
                Some(destination) => {
                    let topic = Topic::new(destination);
                    self.sink.emit(TransportEvent::Message {
                        topic,
                        raw: frame.body,
                    });
                }
                None => self.protocol_error("MESSAGE without destination", frame.body),
            },

            StompCommand::Error => {
                let message = frame.get("message").unwrap_or("Broker error").to_string();
                self.protocol_error(&message, frame.body);
            }

            StompCommand::Receipt => {
                trace!(receipt = frame.get("receipt-id"), "Receipt received");
            }

            other => {
                debug!(command = other.as_str(), "Unexpected frame from broker");
            }
        }
        Ok(())
    }

    fn check_liveness(&self) -> Step {
        let Some(expect) = self.expect_every else {
            return Ok(());
        };
        if self.last_inbound.elapsed() > expect * 2 {
            return Err(Exit::Failed(format!(
                "No heart-beat from broker for {}ms",
                millis(self.last_inbound.elapsed())
            )));
        }
        Ok(())
    }

    fn protocol_error(&self, message: &str, detail: String) {
        warn!(generation = %self.sink.generation(), error = message, "Broker protocol error");
        self.sink.emit(TransportEvent::ProtocolError {
            message: message.to_string(),
            detail,
        });
    }

    fn host(&self) -> &str {
        self.endpoint.host_str().unwrap_or("localhost")
    }

    fn finish(&self, exit: Exit) {
        match exit {
            Exit::Shutdown => {}
            Exit::Failed(message) => {
                debug!(generation = %self.sink.generation(), error = %message, "Broker session failed");
                self.sink.emit(TransportEvent::TransportError { message });
            }
            Exit::Closed(reason) => {
                debug!(generation = %self.sink.generation(), reason = %reason, "Broker session closed");
                self.sink.emit(TransportEvent::Closed(reason));
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// ============================================================================
// Tests
// ============================================================================
