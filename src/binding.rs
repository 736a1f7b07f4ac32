//! Consumer lifetime binding.
//!
//! A [`ConsumerBinding`] ties one supervisor and one registration to a
//! consumer component: mount activates once, unmount (or drop) deactivates
//! once, and updates in between only touch what actually changed.
//!
//! | Change in props | Effect |
//! |-----------------|--------|
//! | Nothing | None |
//! | Callback identity | Registry entry replaced, connection kept |
//! | Topic | Old topic unregistered, new one registered, connection kept |
//! | Endpoint | Supervisor rebuilt and reactivated |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::BearerToken;
use crate::error::Result;
use crate::identifiers::Topic;
use crate::registry::{Callback, SubscriptionHandle, SubscriptionRegistry};
use crate::supervisor::{ConnectionSupervisor, ReconnectPolicy};
use crate::transport::AdapterFactory;

// ============================================================================
// BindingProps
// ============================================================================

/// Inputs a consumer renders with.
#[derive(Clone)]
pub struct BindingProps {
    /// Transport and endpoint.
    pub factory: Arc<dyn AdapterFactory>,
    /// Reconnect policy for the supervisor.
    pub policy: ReconnectPolicy,
    /// Topic to receive.
    pub topic: Topic,
    /// Consumer callback. Compared by identity.
    pub callback: Callback,
    /// Token read when the supervisor activates.
    pub token: Option<BearerToken>,
}

impl fmt::Debug for BindingProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingProps")
            .field("endpoint", &self.factory.endpoint_key())
            .field("policy", &self.policy)
            .field("topic", &self.topic)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

impl BindingProps {
    fn same_endpoint(&self, other: &Self) -> bool {
        self.factory.endpoint_key() == other.factory.endpoint_key()
    }

    fn same_callback(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

// ============================================================================
// BindingChange
// ============================================================================

/// What [`ConsumerBinding::update`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingChange {
    /// Props were equivalent.
    Unchanged,
    /// Registry entry swapped to the new callback.
    CallbackReplaced,
    /// Registration moved to the new topic.
    TopicChanged,
    /// Supervisor rebuilt for a new endpoint.
    Reconnected,
}

// ============================================================================
// ConsumerBinding
// ============================================================================

/// A mounted consumer.
pub struct ConsumerBinding {
    registry: SubscriptionRegistry,
    props: BindingProps,
    handle: SubscriptionHandle,
    supervisor: ConnectionSupervisor,
    unmounted: bool,
}

impl fmt::Debug for ConsumerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerBinding")
            .field("props", &self.props)
            .field("supervisor", &self.supervisor)
            .field("unmounted", &self.unmounted)
            .finish_non_exhaustive()
    }
}

impl ConsumerBinding {
    /// Registers the callback and activates a new supervisor.
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Propagates activation errors.
    pub fn mount(registry: SubscriptionRegistry, props: BindingProps) -> Result<Self> {
        let handle = registry.register(props.topic.clone(), Arc::clone(&props.callback));
        let supervisor = ConnectionSupervisor::new(
            Arc::clone(&props.factory),
            registry.clone(),
            props.policy,
        );
        supervisor.activate(props.token.clone())?;

        info!(endpoint = %props.factory.endpoint(), topic = %props.topic, "Consumer mounted");

        Ok(Self {
            registry,
            props,
            handle,
            supervisor,
            unmounted: false,
        })
    }

    /// Applies new props.
    ///
    /// # Errors
    ///
    /// Propagates activation errors when the endpoint changed.
    pub async fn update(&mut self, props: BindingProps) -> Result<BindingChange> {
        let endpoint_changed = !self.props.same_endpoint(&props);
        let topic_changed = self.props.topic != props.topic;
        let callback_changed = !self.props.same_callback(&props);

        if topic_changed {
            self.registry.release(&self.handle);
            self.handle = self
                .registry
                .register(props.topic.clone(), Arc::clone(&props.callback));
        } else if callback_changed {
            self.handle = self
                .registry
                .register(props.topic.clone(), Arc::clone(&props.callback));
        }

        let change = if endpoint_changed {
            let fresh = ConnectionSupervisor::new(
                Arc::clone(&props.factory),
                self.registry.clone(),
                props.policy,
            );
            let previous = std::mem::replace(&mut self.supervisor, fresh);
            previous.deactivate().await;
            self.supervisor.activate(props.token.clone())?;
            info!(endpoint = %props.factory.endpoint(), "Consumer reconnected to new endpoint");
            BindingChange::Reconnected
        } else if topic_changed {
            BindingChange::TopicChanged
        } else if callback_changed {
            BindingChange::CallbackReplaced
        } else {
            BindingChange::Unchanged
        };

        debug!(change = ?change, topic = %props.topic, "Consumer updated");
        self.props = props;
        Ok(change)
    }

    /// Unregisters the callback and deactivates the supervisor.
    pub async fn unmount(mut self) {
        self.unmounted = true;
        self.registry.release(&self.handle);
        self.supervisor.deactivate().await;
        info!(topic = %self.props.topic, "Consumer unmounted");
    }

    /// Supervisor of the current endpoint.
    #[inline]
    #[must_use]
    pub fn supervisor(&self) -> &ConnectionSupervisor {
        &self.supervisor
    }

    /// Current props.
    #[inline]
    #[must_use]
    pub fn props(&self) -> &BindingProps {
        &self.props
    }
}

impl Drop for ConsumerBinding {
    fn drop(&mut self) {
        if !self.unmounted {
            // The supervisor's own drop stops its task.
            self.registry.release(&self.handle);
            debug!(topic = %self.props.topic, "Consumer dropped without unmount");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::sync::mpsc;

    use crate::protocol::GpsUpdate;
    use crate::registry::callback;
    use crate::supervisor::ConnectionState;
    use crate::transport::TransportEvent;
    use crate::transport::mock::{MockCall, MockFactory};

    const SAMPLE: &str = r#"{"vehicleId":7,"lat":"37.5","lon":"127.0","spd":"42","ang":"180"}"#;
    const WAIT: Duration = Duration::from_secs(30);

    fn props(factory: &MockFactory, topic: &str, callback: Callback) -> BindingProps {
        BindingProps {
            factory: Arc::new(factory.clone()),
            policy: ReconnectPolicy::default(),
            topic: Topic::new(topic),
            callback,
            token: None,
        }
    }

    fn channel_callback() -> (Callback, mpsc::UnboundedReceiver<GpsUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let callback = callback(move |update| {
            let _ = tx.send(update);
        });
        (callback, rx)
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    fn connects(factory: &MockFactory) -> usize {
        factory
            .calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Connect { .. }))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_mount_activates_once() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let registry = SubscriptionRegistry::new();
        let (cb, _rx) = channel_callback();

        let binding = ConsumerBinding::mount(registry.clone(), props(&factory, "/topic/gps", cb))
            .expect("mount");
        settle().await;

        assert_eq!(connects(&factory), 1);
        assert!(registry.contains(&Topic::new("/topic/gps")));
        binding.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerender_with_same_props_is_unchanged() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let (cb, _rx) = channel_callback();
        let props = props(&factory, "/topic/gps", cb);
        let mut binding = ConsumerBinding::mount(SubscriptionRegistry::new(), props.clone())
            .expect("mount");

        for _ in 0..5 {
            let change = binding.update(props.clone()).await.expect("update");
            assert_eq!(change, BindingChange::Unchanged);
        }
        settle().await;
        assert_eq!(factory.created(), 1);
        binding.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_callback_change_keeps_connection() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let (first, mut first_rx) = channel_callback();
        let (second, mut second_rx) = channel_callback();
        let mut binding =
            ConsumerBinding::mount(SubscriptionRegistry::new(), props(&factory, "/topic/gps", first))
                .expect("mount");
        settle().await;
        assert!(factory.latest().emit(TransportEvent::Opened));
        binding
            .supervisor()
            .wait_for_state(ConnectionState::Connected, WAIT)
            .await
            .expect("connected");

        let change = binding
            .update(props(&factory, "/topic/gps", second))
            .await
            .expect("update");
        assert_eq!(change, BindingChange::CallbackReplaced);
        assert_eq!(factory.created(), 1);

        assert!(factory.latest().emit(TransportEvent::Message {
            topic: Topic::new("/topic/gps"),
            raw: SAMPLE.into(),
        }));
        tokio::time::timeout(WAIT, second_rx.recv())
            .await
            .expect("delivered")
            .expect("open");
        assert!(first_rx.try_recv().is_err());
        binding.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_change_moves_registration() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let registry = SubscriptionRegistry::new();
        let (cb, _rx) = channel_callback();
        let mut binding =
            ConsumerBinding::mount(registry.clone(), props(&factory, "/topic/gps", cb.clone()))
                .expect("mount");
        settle().await;

        let change = binding
            .update(props(&factory, "/topic/fleet", cb))
            .await
            .expect("update");
        settle().await;

        assert_eq!(change, BindingChange::TopicChanged);
        assert_eq!(registry.topics(), vec![Topic::new("/topic/fleet")]);
        assert_eq!(factory.created(), 1);
        binding.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_endpoint_change_rebuilds_supervisor() {
        let old = MockFactory::new("http://localhost:8090/ws");
        let new = MockFactory::new("http://backup:8090/ws");
        let (cb, _rx) = channel_callback();
        let mut binding =
            ConsumerBinding::mount(SubscriptionRegistry::new(), props(&old, "/topic/gps", cb.clone()))
                .expect("mount");
        settle().await;

        let change = binding
            .update(props(&new, "/topic/gps", cb))
            .await
            .expect("update");
        assert_eq!(change, BindingChange::Reconnected);
        settle().await;

        assert!(old.latest().is_muted());
        assert_eq!(new.created(), 1);
        assert_eq!(binding.supervisor().state(), ConnectionState::Connecting);
        binding.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmount_deactivates_once_and_unregisters() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let registry = SubscriptionRegistry::new();
        let (cb, _rx) = channel_callback();
        let binding = ConsumerBinding::mount(registry.clone(), props(&factory, "/topic/gps", cb))
            .expect("mount");
        settle().await;

        binding.unmount().await;
        let disconnects = factory
            .calls()
            .iter()
            .filter(|call| matches!(call, MockCall::Disconnect { .. }))
            .count();
        assert_eq!(disconnects, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let factory = MockFactory::new("http://localhost:8090/ws");
        let registry = SubscriptionRegistry::new();
        let (cb, _rx) = channel_callback();
        let binding = ConsumerBinding::mount(registry.clone(), props(&factory, "/topic/gps", cb))
            .expect("mount");
        settle().await;

        drop(binding);
        settle().await;
        assert!(registry.is_empty());
        assert!(factory.latest().is_muted());
    }
}
