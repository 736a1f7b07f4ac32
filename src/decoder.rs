//! Payload decoding.
//!
//! Turns the raw text body of a broker message or event-stream event into a
//! validated [`GpsUpdate`]. Failures are values, not panics: the caller
//! drops the payload and carries on.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::error::Category;
use thiserror::Error;

use crate::protocol::GpsUpdate;

// ============================================================================
// DecodeErrorKind
// ============================================================================

/// Why a payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Not valid JSON (syntax error or truncated input).
    Malformed,
    /// Valid JSON that does not match the GPS update schema.
    Schema,
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => f.write_str("malformed"),
            Self::Schema => f.write_str("schema"),
        }
    }
}

// ============================================================================
// DecodeError
// ============================================================================

/// A payload that failed to decode.
///
/// Carries the offending raw text so observers can record it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Decode failed ({kind}): {message}")]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
    raw: String,
}

impl DecodeError {
    /// Returns the failure kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Returns the parser message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the payload exactly as received.
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

// ============================================================================
// decode
// ============================================================================

/// Decodes a raw payload into a [`GpsUpdate`].
///
/// All of `vehicleId`, `lat`, `lon`, `spd` and `ang` must be present.
/// Numeric fields may be strings or numbers and are kept as sent; unknown
/// fields are ignored.
///
/// # Errors
///
/// - [`DecodeErrorKind::Malformed`] for invalid or truncated JSON
/// - [`DecodeErrorKind::Schema`] for missing, `null` or mistyped fields
pub fn decode(raw: &str) -> Result<GpsUpdate, DecodeError> {
    serde_json::from_str(raw).map_err(|e| {
        let kind = match e.classify() {
            Category::Data => DecodeErrorKind::Schema,
            Category::Syntax | Category::Eof | Category::Io => DecodeErrorKind::Malformed,
        };
        DecodeError {
            kind,
            message: e.to_string(),
            raw: raw.to_string(),
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
