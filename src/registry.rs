//! Topic to callback registry.
//!
//! One callback per topic; registering again replaces it. The registry is the
//! only state shared between consumers and supervisors, and is mutated only
//! by [`register`](SubscriptionRegistry::register) and
//! [`unregister`](SubscriptionRegistry::unregister).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────┐
//! │         SubscriptionRegistry          │
//! │  ┌─────────────────────────────────┐  │
//! │  │ /topic/gps   → callback A       │  │
//! │  │ /topic/fleet → callback B       │  │
//! │  └─────────────────────────────────┘  │
//! │  version ──watch──► supervisors       │
//! └───────────────────────────────────────┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::identifiers::Topic;
use crate::protocol::GpsUpdate;

// ============================================================================
// Types
// ============================================================================

/// Consumer callback.
///
/// Called synchronously on the supervisor task; it should return quickly.
pub type Callback = Arc<dyn Fn(GpsUpdate) + Send + Sync>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(GpsUpdate) + Send + Sync + 'static,
{
    Arc::new(f)
}

struct Entry {
    callback: Callback,
    token: u64,
}

struct Inner {
    entries: RwLock<FxHashMap<Topic, Entry>>,
    next_token: AtomicU64,
    version: watch::Sender<u64>,
}

// ============================================================================
// SubscriptionHandle
// ============================================================================

/// Proof of a registration.
///
/// Releasing a handle only removes its own registration; if the topic was
/// registered again since, the newer callback stays.
#[derive(Clone)]
pub struct SubscriptionHandle {
    topic: Topic,
    callback: Callback,
    token: u64,
}

impl SubscriptionHandle {
    /// Registered topic.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Registered callback.
    #[inline]
    #[must_use]
    pub fn callback(&self) -> &Callback {
        &self.callback
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("topic", &self.topic)
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Shared topic to callback map.
///
/// Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<Inner>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                entries: RwLock::new(FxHashMap::default()),
                next_token: AtomicU64::new(1),
                version,
            }),
        }
    }

    /// Registers `callback` for `topic`, replacing any previous callback.
    ///
    /// The swap happens under the write lock, so each dispatched update goes
    /// to exactly one of the two callbacks.
    pub fn register(&self, topic: impl Into<Topic>, callback: Callback) -> SubscriptionHandle {
        let topic = topic.into();
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);

        let replaced = self
            .inner
            .entries
            .write()
            .insert(
                topic.clone(),
                Entry {
                    callback: Arc::clone(&callback),
                    token,
                },
            )
            .is_some();

        debug!(topic = %topic, replaced, "Callback registered");
        self.bump();

        SubscriptionHandle {
            topic,
            callback,
            token,
        }
    }

    /// Removes the callback for `topic`. Returns `false` if none was registered.
    pub fn unregister(&self, topic: &Topic) -> bool {
        let removed = self.inner.entries.write().remove(topic).is_some();
        if removed {
            debug!(topic = %topic, "Callback unregistered");
            self.bump();
        }
        removed
    }

    /// Removes the registration `handle` refers to, if it is still current.
    pub fn release(&self, handle: &SubscriptionHandle) -> bool {
        let removed = {
            let mut entries = self.inner.entries.write();
            match entries.get(&handle.topic) {
                Some(entry) if entry.token == handle.token => {
                    entries.remove(&handle.topic);
                    true
                }
                _ => false,
            }
        };
        if removed {
            debug!(topic = %handle.topic, "Subscription released");
            self.bump();
        }
        removed
    }

    /// Invokes the callback for `topic`.
    ///
    /// Returns `false` (and does nothing) if no callback is registered; a
    /// message racing an unregister is expected. The callback runs outside
    /// the lock so it may register or unregister itself.
    pub fn dispatch(&self, topic: &Topic, update: GpsUpdate) -> bool {
        let callback = self
            .inner
            .entries
            .read()
            .get(topic)
            .map(|entry| Arc::clone(&entry.callback));

        match callback {
            Some(callback) => {
                callback(update);
                true
            }
            None => {
                trace!(topic = %topic, "No callback for topic");
                false
            }
        }
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.inner.entries.read().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Returns `true` if `topic` has a callback.
    #[must_use]
    pub fn contains(&self, topic: &Topic) -> bool {
        self.inner.entries.read().contains_key(topic)
    }

    /// Number of registered topics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    /// Receiver notified after every mutation.
    #[must_use]
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.inner.version.subscribe()
    }

    fn bump(&self) {
        self.inner.version.send_modify(|version| *version += 1);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use crate::decoder::decode;

    const SAMPLE: &str = r#"{"vehicleId":7,"lat":"37.5","lon":"127.0","spd":"42","ang":"180"}"#;

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        let callback = callback(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (count, callback)
    }

    fn update() -> GpsUpdate {
        decode(SAMPLE).expect("sample decodes")
    }

    #[test]
    fn test_dispatch_to_registered_topic() {
        let registry = SubscriptionRegistry::new();
        let (count, callback) = counter();
        registry.register("/topic/gps", callback);

        assert!(registry.dispatch(&Topic::new("/topic/gps"), update()));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_unknown_topic_is_noop() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.dispatch(&Topic::new("/topic/none"), update()));
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = SubscriptionRegistry::new();
        let (first, first_cb) = counter();
        let (second, second_cb) = counter();
        registry.register("/topic/gps", first_cb);
        registry.register("/topic/gps", second_cb);

        registry.dispatch(&Topic::new("/topic/gps"), update());
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_handle_release_keeps_newer_registration() {
        let registry = SubscriptionRegistry::new();
        let (_, first_cb) = counter();
        let (_, second_cb) = counter();
        let old = registry.register("/topic/gps", first_cb);
        let new = registry.register("/topic/gps", second_cb);

        assert!(!registry.release(&old));
        assert!(registry.contains(new.topic()));
        assert!(registry.release(&new));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister() {
        let registry = SubscriptionRegistry::new();
        let (count, callback) = counter();
        registry.register("/topic/gps", callback);

        assert!(registry.unregister(&Topic::new("/topic/gps")));
        assert!(!registry.unregister(&Topic::new("/topic/gps")));
        assert!(!registry.dispatch(&Topic::new("/topic/gps"), update()));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_topics_sorted() {
        let registry = SubscriptionRegistry::new();
        registry.register("b", counter().1);
        registry.register("a", counter().1);
        assert_eq!(registry.topics(), vec![Topic::new("a"), Topic::new("b")]);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SubscriptionRegistry::new();
        let clone = registry.clone();
        registry.register("/topic/gps", counter().1);
        assert!(clone.contains(&Topic::new("/topic/gps")));
    }

    #[test]
    fn test_version_bumps_on_mutation() {
        let registry = SubscriptionRegistry::new();
        let mut changes = registry.watch_changes();
        assert!(!changes.has_changed().expect("sender alive"));

        registry.register("/topic/gps", counter().1);
        assert!(changes.has_changed().expect("sender alive"));
        assert_eq!(*changes.borrow_and_update(), 1);

        registry.unregister(&Topic::new("/topic/missing"));
        assert!(!changes.has_changed().expect("sender alive"));
    }

    #[test]
    fn test_callback_may_unregister_itself() {
        let registry = SubscriptionRegistry::new();
        let inner = registry.clone();
        registry.register(
            "/topic/gps",
            callback(move |_| {
                inner.unregister(&Topic::new("/topic/gps"));
            }),
        );

        assert!(registry.dispatch(&Topic::new("/topic/gps"), update()));
        assert!(registry.is_empty());
    }
}
