//! Type-safe identifiers.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Wraps | Meaning |
//! |------|-------|---------|
//! | [`VehicleId`] | `i64` | Vehicle reporting a fix |
//! | [`Topic`] | `String` | Broker destination or event-stream event name |
//! | [`SubscriptionId`] | `String` | Broker-side subscription handle (`sub-N`) |
//! | [`Generation`] | `u64` | Connection attempt counter |

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// VehicleId
// ============================================================================

/// Identifier of the vehicle a [`GpsUpdate`](crate::GpsUpdate) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VehicleId(i64);

impl VehicleId {
    /// Creates a vehicle ID.
    #[inline]
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for VehicleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Topic
// ============================================================================

/// Named channel a consumer subscribes to.
///
/// For the broker transport this is a destination such as `/topic/gps`;
/// for the event stream it is the event name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    /// Creates a topic from any string-like value.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the topic name.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the name is empty or whitespace.
    #[inline]
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Topic {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Subscription handle assigned by an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Creates a subscription ID from a sequence number (`sub-N`).
    #[inline]
    #[must_use]
    pub fn from_seq(seq: u64) -> Self {
        Self(format!("sub-{seq}"))
    }

    /// Wraps an existing ID string.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as sent on the wire.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Generation
// ============================================================================

/// Connection attempt counter.
///
/// Each adapter instance is created for exactly one generation, and every
/// event it emits carries that generation. Events from any other generation
/// are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Generation(u64);

impl Generation {
    /// Generation before the first connection attempt.
    pub const INITIAL: Self = Self(0);

    /// Wraps a raw counter.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the following generation.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw counter.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_id_serde_transparent() {
        let id: VehicleId = serde_json::from_str("7").expect("parse");
        assert_eq!(id, VehicleId::new(7));
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "7");
    }

    #[test]
    fn test_topic_blank() {
        assert!(Topic::new("  ").is_blank());
        assert!(!Topic::from("/topic/gps").is_blank());
    }

    #[test]
    fn test_subscription_id_format() {
        assert_eq!(SubscriptionId::from_seq(3).as_str(), "sub-3");
    }

    #[test]
    fn test_generation_ordering() {
        let first = Generation::INITIAL.next();
        let second = first.next();
        assert!(second > first);
        assert_eq!(second.as_u64(), 2);
        assert_eq!(second.to_string(), "#2");
    }
}
