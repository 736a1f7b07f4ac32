//! SockJS session framing.
//!
//! The broker endpoint speaks SockJS: every transport (WebSocket or XHR
//! polling) carries the same small set of frames, and STOMP travels inside
//! the string payloads of `a` and `m` frames.
//!
//! | Frame | Meaning |
//! |-------|---------|
//! | `o` | Session open |
//! | `h` | Heartbeat |
//! | `a["m1","m2"]` | Array of messages |
//! | `m"m1"` | Single message |
//! | `c[3000,"Go away!"]` | Session closed |
//!
//! Session URLs take the form `{base}/{server}/{session}/{transport}`.

// ============================================================================
// Imports
// ============================================================================

use serde::Deserialize;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

// ============================================================================
// SockJsFrame
// ============================================================================

/// A decoded SockJS frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    /// Session opened.
    Open,
    /// Server heartbeat.
    Heartbeat,
    /// One or more application messages.
    Messages(Vec<String>),
    /// Session closed by the server.
    Close {
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
}

impl SockJsFrame {
    /// Decodes one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] for an empty frame, an unknown frame type, or
    /// a payload that is not the expected JSON shape.
    pub fn decode(text: &str) -> Result<Self> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| Error::frame("sockjs", "empty frame"))?;
        let payload = chars.as_str();

        let invalid = |e: serde_json::Error| Error::frame("sockjs", format!("{kind} frame: {e}"));

        match kind {
            'o' => Ok(Self::Open),
            'h' => Ok(Self::Heartbeat),
            'a' => serde_json::from_str(payload)
                .map(Self::Messages)
                .map_err(invalid),
            'm' => serde_json::from_str(payload)
                .map(|message| Self::Messages(vec![message]))
                .map_err(invalid),
            'c' => serde_json::from_str::<(u16, String)>(payload)
                .map(|(code, reason)| Self::Close { code, reason })
                .map_err(invalid),
            other => Err(Error::frame(
                "sockjs",
                format!("unknown frame type '{other}'"),
            )),
        }
    }

    /// Decodes a newline-separated XHR response body.
    ///
    /// Blank lines are skipped. Each line decodes independently.
    pub fn decode_lines(body: &str) -> Vec<Result<Self>> {
        body.lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::decode)
            .collect()
    }
}

/// Encodes outgoing messages as a SockJS send payload (JSON string array).
///
/// # Errors
///
/// Returns [`Error::Json`] if serialization fails.
pub fn encode_messages(messages: &[String]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

// ============================================================================
// SockJsInfo
// ============================================================================

/// Response of the `{base}/info` probe.
#[derive(Debug, Clone, Deserialize)]
pub struct SockJsInfo {
    /// Whether the server accepts WebSocket sessions.
    #[serde(default = "default_true")]
    pub websocket: bool,
    /// Whether the server requires sticky sessions.
    #[serde(default)]
    pub cookie_needed: bool,
}

const fn default_true() -> bool {
    true
}

// ============================================================================
// SessionPath
// ============================================================================

/// Server and session segments identifying one SockJS session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPath {
    server: String,
    session: String,
}

impl SessionPath {
    /// Generates a random session path.
    ///
    /// Server is three digits, session is eight hex characters.
    #[must_use]
    pub fn generate() -> Self {
        let id = Uuid::new_v4();
        let bytes = id.as_bytes();
        let server = u16::from_be_bytes([bytes[0], bytes[1]]) % 1000;
        let session = id.simple().to_string()[..8].to_string();
        Self {
            server: format!("{server:03}"),
            session,
        }
    }

    /// Creates a path from explicit segments.
    #[must_use]
    pub fn new(server: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            session: session.into(),
        }
    }

    /// Returns the session segment.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &str {
        &self.session
    }

    /// WebSocket URL (`ws`/`wss` scheme).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `base` is not http(s).
    pub fn websocket_url(&self, base: &Url) -> Result<Url> {
        let mut url = self.join(base, "websocket")?;
        let scheme = match base.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::invalid_url(base.as_str(), "cannot switch to WebSocket scheme"))?;
        Ok(url)
    }

    /// XHR receive URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `base` is not http(s).
    pub fn xhr_url(&self, base: &Url) -> Result<Url> {
        self.join(base, "xhr")
    }

    /// XHR send URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `base` is not http(s).
    pub fn xhr_send_url(&self, base: &Url) -> Result<Url> {
        self.join(base, "xhr_send")
    }

    fn join(&self, base: &Url, transport: &str) -> Result<Url> {
        append_segments(base, &[&self.server, &self.session, transport])
    }
}

/// `{base}/info` URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] if `base` cannot carry a path.
pub fn info_url(base: &Url) -> Result<Url> {
    append_segments(base, &["info"])
}

fn append_segments(base: &Url, segments: &[&str]) -> Result<Url> {
    if !matches!(base.scheme(), "http" | "https") {
        return Err(Error::invalid_url(base.as_str(), "expected http or https"));
    }
    let mut url = base.clone();
    url.set_fragment(None);
    url.path_segments_mut()
        .map_err(|()| Error::invalid_url(base.as_str(), "URL cannot be a base"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

// ============================================================================
// Tests
// ============================================================================
