//! Bearer token and connect headers.
//!
//! The client never looks a token up on its own; the caller hands one to
//! [`ConnectionSupervisor::activate`](crate::ConnectionSupervisor::activate)
//! and it is read on every connection attempt.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// BearerToken
// ============================================================================

/// An access token sent as `Authorization: Bearer <token>`.
///
/// `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wraps a token. Returns `None` for an empty or blank string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        (!token.trim().is_empty()).then_some(Self(token))
    }

    /// Returns the raw token.
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the `Authorization` header value.
    #[inline]
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(***)")
    }
}

// ============================================================================
// ConnectHeaders
// ============================================================================

/// Headers sent with every connection attempt, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectHeaders(Vec<(String, String)>);

impl ConnectHeaders {
    /// Creates an empty header set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the header set for an optional token.
    ///
    /// No token means no headers; connecting unauthenticated is allowed.
    #[must_use]
    pub fn from_token(token: Option<&BearerToken>) -> Self {
        let mut headers = Self::new();
        if let Some(token) = token {
            headers.insert("Authorization", token.authorization());
        }
        headers
    }

    /// Sets a header, replacing an existing one with the same name
    /// (case-insensitive).
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .0
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    /// Returns a header value (case-insensitive).
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Iterates `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Returns `true` if no headers are set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_token_means_no_headers() {
        assert!(ConnectHeaders::from_token(None).is_empty());
    }

    #[test]
    fn test_token_header() {
        let token = BearerToken::new("abc").expect("token");
        let headers = ConnectHeaders::from_token(Some(&token));
        assert_eq!(headers.get("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_blank_token_rejected() {
        assert!(BearerToken::new("  ").is_none());
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = BearerToken::new("secret").expect("token");
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[test]
    fn test_insert_replaces_case_insensitively() {
        let mut headers = ConnectHeaders::new();
        headers.insert("X-Client", "a");
        headers.insert("x-client", "b");
        assert_eq!(headers.iter().count(), 1);
        assert_eq!(headers.get("X-CLIENT"), Some("b"));
    }
}
