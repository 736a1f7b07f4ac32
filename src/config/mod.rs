//! Stream configuration.
//!
//! [`StreamBuilder`] validates endpoint and options and produces a
//! [`StreamConfig`], which hands out registries, supervisors and bindings
//! that share one adapter factory.
//!
//! # Example
//!
//! ```no_run
//! use gps_stream::{StreamConfig, callback};
//!
//! # async fn example() -> gps_stream::Result<()> {
//! let config = StreamConfig::builder()
//!     .event_stream("http://localhost:8080/api/v1/sse/gps", "gps")
//!     .build()?;
//!
//! let registry = config.registry();
//! let binding = config.mount(registry, callback(|update| println!("{update:?}")), None)?;
//! // ...
//! binding.unmount().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | Fluent, validating [`StreamBuilder`] |
//! | `options` | Transport options and defaults |

// ============================================================================
// Submodules
// ============================================================================

/// Configuration builder.
pub mod builder;

/// Transport options.
pub mod options;

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use url::Url;

use crate::auth::BearerToken;
use crate::binding::{BindingProps, ConsumerBinding};
use crate::error::Result;
use crate::identifiers::Topic;
use crate::registry::{Callback, SubscriptionRegistry};
use crate::supervisor::{ConnectionSupervisor, ReconnectPolicy};
use crate::transport::{AdapterFactory, BrokerFactory, EventStreamFactory};

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::StreamBuilder;
pub use options::{
    BrokerOptions, DEFAULT_BROKER_ENDPOINT, DEFAULT_BROKER_TOPIC, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_EVENT_STREAM_ENDPOINT, DEFAULT_HEART_BEAT, EventStreamOptions, TransportOptions,
};

// ============================================================================
// StreamConfig
// ============================================================================

/// Validated stream configuration.
///
/// Cloning is cheap; clones share the adapter factory, so event-stream
/// resume state is shared too.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    endpoint: Url,
    transport: TransportOptions,
    policy: ReconnectPolicy,
    factory: Arc<dyn AdapterFactory>,
}

impl StreamConfig {
    /// Creates a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> StreamBuilder {
        StreamBuilder::new()
    }

    pub(crate) fn new(endpoint: Url, transport: TransportOptions, policy: ReconnectPolicy) -> Self {
        let factory: Arc<dyn AdapterFactory> = match &transport {
            TransportOptions::Broker(options) => {
                Arc::new(BrokerFactory::new(endpoint.clone(), options.clone()))
            }
            TransportOptions::EventStream(options) => {
                Arc::new(EventStreamFactory::new(endpoint.clone(), options.clone()))
            }
        };

        Self {
            endpoint,
            transport,
            policy,
            factory,
        }
    }

    /// Endpoint URL.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Transport options.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    /// Reconnect policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Topic consumers receive unless they pick another.
    #[inline]
    #[must_use]
    pub fn default_topic(&self) -> Topic {
        self.transport.default_topic()
    }

    /// Shared adapter factory.
    #[inline]
    #[must_use]
    pub fn factory(&self) -> Arc<dyn AdapterFactory> {
        Arc::clone(&self.factory)
    }

    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> SubscriptionRegistry {
        SubscriptionRegistry::new()
    }

    /// Creates an idle supervisor replaying `registry`.
    #[must_use]
    pub fn supervisor(&self, registry: SubscriptionRegistry) -> ConnectionSupervisor {
        ConnectionSupervisor::new(self.factory(), registry, self.policy)
    }

    /// Props for a consumer of the default topic.
    #[must_use]
    pub fn binding_props(&self, callback: Callback, token: Option<BearerToken>) -> BindingProps {
        BindingProps {
            factory: self.factory(),
            policy: self.policy,
            topic: self.default_topic(),
            callback,
            token,
        }
    }

    /// Mounts a consumer of the default topic.
    ///
    /// # Errors
    ///
    /// Propagates activation errors.
    pub fn mount(
        &self,
        registry: SubscriptionRegistry,
        callback: Callback,
        token: Option<BearerToken>,
    ) -> Result<ConsumerBinding> {
        ConsumerBinding::mount(registry, self.binding_props(callback, token))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::registry::callback;

    #[test]
    fn test_clones_share_factory() {
        let config = StreamConfig::builder().build().expect("valid");
        let copy = config.clone();
        assert!(Arc::ptr_eq(&config.factory(), &copy.factory()));
    }

    #[test]
    fn test_binding_props_use_default_topic() {
        let config = StreamConfig::builder()
            .topic("/topic/fleet")
            .build()
            .expect("valid");
        let props = config.binding_props(callback(|_| {}), BearerToken::new("abc"));
        assert_eq!(props.topic.as_str(), "/topic/fleet");
        assert_eq!(props.factory.endpoint_key(), config.factory().endpoint_key());
        assert!(props.token.is_some());
    }

    #[tokio::test]
    async fn test_supervisor_starts_idle() {
        let config = StreamConfig::builder().build().expect("valid");
        let supervisor = config.supervisor(config.registry());
        assert_eq!(supervisor.state(), crate::supervisor::ConnectionState::Idle);
        assert_eq!(supervisor.policy(), config.policy());
    }
}
