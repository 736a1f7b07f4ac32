//! GPS update record.
//!
//! # Format
//!
//! ```json
//! {
//!   "vehicleId": 7,
//!   "lat": "37.5",
//!   "lon": "127.0",
//!   "spd": "42",
//!   "ang": "180"
//! }
//! ```
//!
//! Coordinates, speed and heading arrive either as JSON strings or JSON
//! numbers depending on the backend; both are kept exactly as received.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::identifiers::VehicleId;

// ============================================================================
// FieldValue
// ============================================================================

/// A numeric-looking field held in its wire representation.
///
/// Text is never coerced to a number, so formatting downstream sees the
/// exact characters the backend sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Value sent as a JSON string.
    Text(String),
    /// Value sent as a JSON number.
    Number(Number),
}

impl FieldValue {
    /// Parses the value as `f64`, if it is numeric.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(text) => text.trim().parse().ok(),
            Self::Number(number) => number.as_f64(),
        }
    }

    /// Returns the text if the value was sent as a string.
    #[inline]
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ============================================================================
// GpsUpdate
// ============================================================================

/// A single GPS fix for one vehicle.
///
/// Produced by [`decode`](crate::decoder::decode) and handed to the
/// registered callback by value; the client keeps no copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsUpdate {
    /// Reporting vehicle.
    pub vehicle_id: VehicleId,
    /// Latitude.
    pub lat: FieldValue,
    /// Longitude.
    pub lon: FieldValue,
    /// Speed.
    pub spd: FieldValue,
    /// Heading angle.
    pub ang: FieldValue,
}

impl GpsUpdate {
    /// Returns `(lat, lon)` as floating point, if both are numeric.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        Some((self.lat.as_f64()?, self.lon.as_f64()?))
    }
}

// ============================================================================
// Tests
// ============================================================================
