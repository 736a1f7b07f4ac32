//! Connection supervisor.
//!
//! Owns exactly one adapter at a time, drives the state machine, applies the
//! reconnect policy and routes payloads through the decoder to the registry.
//!
//! # Event Loop
//!
//! Activation spawns one tokio task that owns all connection state and
//! handles:
//!
//! - Adapter events, tagged with the adapter's generation
//! - Registry changes while connected (subscribe/unsubscribe diff)
//! - The reconnect timer
//! - Shutdown from [`ConnectionSupervisor::deactivate`] or drop
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `event` | Lifecycle events for observers |
//! | `policy` | Reconnect delay rule |
//! | `state` | Connection states and transitions |

// ============================================================================
// Submodules
// ============================================================================

/// Lifecycle events.
pub mod event;

/// Reconnect policy.
pub mod policy;

/// Connection states.
pub mod state;


// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use crate::auth::{BearerToken, ConnectHeaders};
use crate::decoder::decode;
use crate::error::{Error, Result};
use crate::identifiers::{Generation, Topic};
use crate::registry::SubscriptionRegistry;
use crate::transport::{AdapterEvent, AdapterFactory, EventSink, TransportAdapter, TransportEvent};

pub use event::LifecycleEvent;
pub use policy::{DEFAULT_RECONNECT_DELAY, MIN_SERVER_RETRY, ReconnectPolicy};
pub use state::ConnectionState;

// ============================================================================
// Constants
// ============================================================================

/// Capacity of the lifecycle broadcast channel.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// Types
// ============================================================================

/// Commands for the supervisor task.
enum SupervisorCommand {
    /// Disconnect and close.
    Shutdown,
}

/// State shared between the handle and its task.
struct Shared {
    /// Set synchronously by `deactivate`; checked before every event.
    closed: AtomicBool,
    /// Generation of the current adapter.
    generation: AtomicU64,
    /// Published connection state.
    state_tx: watch::Sender<ConnectionState>,
}

// ============================================================================
// ConnectionSupervisor
// ============================================================================

/// Supervises one logical connection across reconnects.
///
/// # Example
///
/// ```ignore
/// let registry = SubscriptionRegistry::new();
/// registry.register("/topic/gps", callback(|update| println!("{update:?}")));
///
/// let supervisor = ConnectionSupervisor::new(factory, registry, ReconnectPolicy::default());
/// supervisor.activate(None)?;
/// supervisor.wait_for_state(ConnectionState::Connected, Duration::from_secs(10)).await?;
/// // ...
/// supervisor.deactivate().await;
/// ```
pub struct ConnectionSupervisor {
    factory: Arc<dyn AdapterFactory>,
    registry: SubscriptionRegistry,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    command_tx: Mutex<Option<mpsc::UnboundedSender<SupervisorCommand>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    state_rx: watch::Receiver<ConnectionState>,
    events_tx: broadcast::Sender<LifecycleEvent>,
}

impl fmt::Debug for ConnectionSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("endpoint", &self.factory.endpoint().as_str())
            .field("state", &self.state())
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionSupervisor - Constructor
// ============================================================================

impl ConnectionSupervisor {
    /// Creates an idle supervisor.
    pub fn new(
        factory: Arc<dyn AdapterFactory>,
        registry: SubscriptionRegistry,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            factory,
            registry,
            policy,
            shared: Arc::new(Shared {
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(Generation::INITIAL.as_u64()),
                state_tx,
            }),
            command_tx: Mutex::new(None),
            task: Mutex::new(None),
            state_rx,
            events_tx,
        }
    }
}

// ============================================================================
// ConnectionSupervisor - Public API
// ============================================================================

impl ConnectionSupervisor {
    /// Starts connecting. Must be called inside a tokio runtime.
    ///
    /// The token is read on every attempt and never modified. Returns
    /// `Ok(false)` if already active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SupervisorClosed`] after [`deactivate`](Self::deactivate).
    pub fn activate(&self, token: Option<BearerToken>) -> Result<bool> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(Error::SupervisorClosed);
        }

        let mut task = self.task.lock();
        if task.is_some() {
            debug!("Supervisor already active");
            return Ok(false);
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let supervisor_task = SupervisorTask {
            factory: Arc::clone(&self.factory),
            registry: self.registry.clone(),
            policy: self.policy,
            headers: ConnectHeaders::from_token(token.as_ref()),
            shared: Arc::clone(&self.shared),
            events_tx: self.events_tx.clone(),
            event_tx,
            changes: self.registry.watch_changes(),
            state: ConnectionState::Idle,
            generation: Generation::INITIAL,
            adapter: None,
            subscribed: FxHashSet::default(),
            reconnect_at: None,
        };

        info!(
            endpoint = %self.factory.endpoint(),
            kind = %self.factory.kind(),
            authenticated = token.is_some(),
            "Activating supervisor"
        );

        *task = Some(tokio::spawn(supervisor_task.run(command_rx, event_rx)));
        *self.command_tx.lock() = Some(command_tx);

        // A concurrent deactivate may have missed the new task.
        if self.shared.closed.load(Ordering::SeqCst)
            && let Some(tx) = self.command_tx.lock().take()
        {
            let _ = tx.send(SupervisorCommand::Shutdown);
        }
        Ok(true)
    }

    /// Closes the supervisor. Safe in any state; the second call does nothing.
    ///
    /// Events already queued are discarded, the reconnect timer is cancelled
    /// and the adapter is disconnected. Registrations stay in the registry.
    pub async fn deactivate(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            trace!("Supervisor already closed");
            return;
        }

        if let Some(tx) = self.command_tx.lock().take() {
            let _ = tx.send(SupervisorCommand::Shutdown);
        }

        let task = self.task.lock().take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    warn!(error = %e, "Supervisor task failed");
                }
            }
            None => self.close_idle(),
        }
        info!("Supervisor deactivated");
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver following every state change.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Waits until the supervisor reaches `target`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if `target` is not reached in time
    /// - [`Error::SupervisorClosed`] if the supervisor closes first
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut rx = self.state_rx.clone();
        let reached = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state == target || state.is_closed()),
        )
        .await
        .map_err(|_| {
            Error::connection_timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX))
        })?
        .map(|state| *state)
        .map_err(|_| Error::SupervisorClosed)?;

        if reached == target {
            Ok(())
        } else {
            Err(Error::SupervisorClosed)
        }
    }

    /// Receiver of lifecycle events sent from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events_tx.subscribe()
    }

    /// Generation of the current (or last) adapter.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        Generation::from_u64(self.shared.generation.load(Ordering::SeqCst))
    }

    /// Registry this supervisor replays.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Factory adapters are built with.
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &Arc<dyn AdapterFactory> {
        &self.factory
    }

    /// Reconnect policy in effect.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// `Idle -> Closed` without a task.
    fn close_idle(&self) {
        let from = self.shared.state_tx.send_replace(ConnectionState::Closed);
        if from != ConnectionState::Closed {
            let _ = self.events_tx.send(LifecycleEvent::StateChanged {
                from,
                to: ConnectionState::Closed,
            });
        }
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        if let Some(tx) = self.command_tx.lock().take() {
            let _ = tx.send(SupervisorCommand::Shutdown);
        }
    }
}

// ============================================================================
// SupervisorTask
// ============================================================================

/// Connection state owned by the supervisor task.
struct SupervisorTask {
    factory: Arc<dyn AdapterFactory>,
    registry: SubscriptionRegistry,
    policy: ReconnectPolicy,
    headers: ConnectHeaders,
    shared: Arc<Shared>,
    events_tx: broadcast::Sender<LifecycleEvent>,
    /// Cloned into every adapter's sink.
    event_tx: mpsc::UnboundedSender<AdapterEvent>,
    changes: watch::Receiver<u64>,
    state: ConnectionState,
    generation: Generation,
    adapter: Option<Box<dyn TransportAdapter>>,
    /// Topics subscribed on the current adapter.
    subscribed: FxHashSet<Topic>,
    reconnect_at: Option<Instant>,
}

impl SupervisorTask {
    async fn run(
        mut self,
        mut command_rx: mpsc::UnboundedReceiver<SupervisorCommand>,
        mut event_rx: mpsc::UnboundedReceiver<AdapterEvent>,
    ) {
        self.start_attempt().await;

        loop {
            tokio::select! {
                biased;

                command = command_rx.recv() => match command {
                    Some(SupervisorCommand::Shutdown) | None => break,
                },

                Some(event) = event_rx.recv() => self.handle_event(event).await,

                changed = self.changes.changed(), if self.state == ConnectionState::Connected => {
                    if changed.is_ok() {
                        self.sync_subscriptions();
                    }
                }

                _ = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.start_attempt().await;
                }
            }
        }

        self.shutdown().await;
        debug!("Supervisor task terminated");
    }

    // ------------------------------------------------------------------------
    // Attempts
    // ------------------------------------------------------------------------

    async fn start_attempt(&mut self) {
        if self.is_closed() {
            return;
        }

        self.generation = self.generation.next();
        self.shared
            .generation
            .store(self.generation.as_u64(), Ordering::SeqCst);

        let sink = EventSink::new(self.generation, self.event_tx.clone());
        let mut adapter = self.factory.create(sink);
        self.subscribed.clear();
        self.transition(ConnectionState::Connecting);

        let result = adapter.connect(self.factory.endpoint(), &self.headers);
        self.adapter = Some(adapter);

        if let Err(e) = result {
            warn!(generation = %self.generation, error = %e, "Connection attempt could not start");
            self.broadcast(LifecycleEvent::TransportError {
                message: e.to_string(),
            });
            self.schedule_reconnect(None).await;
        }
    }

    async fn schedule_reconnect(&mut self, hint: Option<Duration>) {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return;
        }

        self.disconnect_adapter().await;
        self.transition(ConnectionState::Reconnecting);

        let delay = self.policy.delay_for(hint);
        self.reconnect_at = Some(Instant::now() + delay);
        info!(
            generation = %self.generation,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnect scheduled"
        );
    }

    async fn disconnect_adapter(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.disconnect().await;
        }
        self.subscribed.clear();
    }

    async fn shutdown(&mut self) {
        self.reconnect_at = None;
        self.disconnect_adapter().await;
        self.transition(ConnectionState::Closed);
    }

    // ------------------------------------------------------------------------
    // Adapter Events
    // ------------------------------------------------------------------------

    async fn handle_event(&mut self, AdapterEvent { generation, event }: AdapterEvent) {
        if self.is_closed() {
            trace!(%generation, "Discarding event after deactivate");
            return;
        }
        if generation != self.generation {
            trace!(%generation, current = %self.generation, "Discarding stale event");
            return;
        }

        let terminal = event.is_terminal();
        let mut retry_hint = None;

        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!(state = %self.state, "Ignoring Opened");
                    return;
                }
                self.transition(ConnectionState::Connected);
                self.replay();
            }

            TransportEvent::Message { topic, raw } => self.deliver(&topic, &raw),

            TransportEvent::ProtocolError { message, detail } => {
                warn!(generation = %generation, error = %message, detail = %detail, "Protocol error");
                self.broadcast(LifecycleEvent::ProtocolError { message, detail });
            }

            TransportEvent::TransportError { message } => {
                warn!(generation = %generation, error = %message, "Transport error");
                self.broadcast(LifecycleEvent::TransportError { message });
            }

            TransportEvent::Closed(reason) => {
                info!(generation = %generation, reason = %reason, "Transport closed");
                retry_hint = reason.retry_after;
                self.broadcast(LifecycleEvent::Disconnected { reason });
            }
        }

        if terminal {
            self.schedule_reconnect(retry_hint).await;
        }
    }

    /// Decodes and dispatches one payload. Only while connected.
    fn deliver(&mut self, topic: &Topic, raw: &str) {
        if self.state != ConnectionState::Connected {
            trace!(topic = %topic, state = %self.state, "Dropping message outside Connected");
            return;
        }

        match decode(raw) {
            Ok(update) => {
                if !self.registry.dispatch(topic, update) {
                    trace!(topic = %topic, "Message for unregistered topic");
                }
            }
            Err(error) => {
                warn!(topic = %topic, error = %error, "Dropping undecodable payload");
                self.broadcast(LifecycleEvent::DecodeFailed {
                    topic: topic.clone(),
                    error,
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    /// Subscribes every registered topic on the new adapter.
    fn replay(&mut self) {
        self.changes.borrow_and_update();
        self.subscribed.clear();
        for topic in self.registry.topics() {
            self.subscribe(topic);
        }
        debug!(
            generation = %self.generation,
            topics = self.subscribed.len(),
            "Subscriptions replayed"
        );
    }

    /// Applies registry changes to the open session.
    fn sync_subscriptions(&mut self) {
        self.changes.borrow_and_update();
        let wanted: FxHashSet<Topic> = self.registry.topics().into_iter().collect();

        let removed: Vec<Topic> = self.subscribed.difference(&wanted).cloned().collect();
        for topic in removed {
            self.subscribed.remove(&topic);
            if let Some(adapter) = self.adapter.as_mut()
                && let Err(e) = adapter.unsubscribe(&topic)
            {
                warn!(topic = %topic, error = %e, "Unsubscribe failed");
            }
        }

        let added: Vec<Topic> = wanted.difference(&self.subscribed).cloned().collect();
        for topic in added {
            self.subscribe(topic);
        }
    }

    fn subscribe(&mut self, topic: Topic) {
        let Some(adapter) = self.adapter.as_mut() else {
            return;
        };
        match adapter.subscribe(&topic) {
            Ok(id) => {
                debug!(topic = %topic, id = %id, "Subscribed");
                self.subscribed.insert(topic.clone());
                self.broadcast(LifecycleEvent::Subscribed { topic });
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "Subscribe failed");
                self.broadcast(LifecycleEvent::ProtocolError {
                    message: format!("cannot subscribe to {topic}"),
                    detail: e.to_string(),
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn transition(&mut self, to: ConnectionState) {
        let from = self.state;
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            warn!(from = %from, to = %to, "Unexpected state transition");
        }

        self.state = to;
        self.shared.state_tx.send_replace(to);
        info!(generation = %self.generation, from = %from, to = %to, "State changed");
        self.broadcast(LifecycleEvent::StateChanged { from, to });
    }

    fn broadcast(&self, event: LifecycleEvent) {
        // No receivers is fine.
        let _ = self.events_tx.send(event);
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Sleeps until `deadline`, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
