//! STOMP frame codec.
//!
//! Implements the client side of STOMP 1.0–1.2 as used by message brokers
//! behind a SockJS endpoint.
//!
//! # Frame Layout
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! A bare `\n` (or `\r\n`) between frames is a heart-beat.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Versions offered in `CONNECT`.
pub const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// Largest frame, in bytes, the decoder will buffer.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame terminator.
const NUL: char = '\0';

// ============================================================================
// StompCommand
// ============================================================================

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    // Client frames
    Connect,
    Stomp,
    Subscribe,
    Unsubscribe,
    Send,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    // Server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Stomp => "STOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Send => "SEND",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::Begin => "BEGIN",
            Self::Commit => "COMMIT",
            Self::Abort => "ABORT",
            Self::Disconnect => "DISCONNECT",
            Self::Connected => "CONNECTED",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
        }
    }

    /// Parses a wire name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        let command = match name {
            "CONNECT" => Self::Connect,
            "STOMP" => Self::Stomp,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "SEND" => Self::Send,
            "ACK" => Self::Ack,
            "NACK" => Self::Nack,
            "BEGIN" => Self::Begin,
            "COMMIT" => Self::Commit,
            "ABORT" => Self::Abort,
            "DISCONNECT" => Self::Disconnect,
            "CONNECTED" => Self::Connected,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            _ => return None,
        };
        Some(command)
    }

    /// `CONNECT`/`CONNECTED` headers are never escaped.
    #[inline]
    const fn escapes_headers(&self) -> bool {
        !matches!(self, Self::Connect | Self::Stomp | Self::Connected)
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// HeartBeat
// ============================================================================

/// Heart-beat intervals as carried in the `heart-beat` header.
///
/// `outgoing` is how often the sender promises to beat, `incoming` how often
/// it wants to receive beats. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Interval the sender can guarantee.
    pub outgoing: Duration,
    /// Interval the sender would like to receive.
    pub incoming: Duration,
}

impl HeartBeat {
    /// Creates heart-beat settings.
    #[inline]
    #[must_use]
    pub const fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Formats as `cx,cy` in milliseconds.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Parses a `sx,sy` header value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Frame`] if the value is not two integers.
    pub fn parse(value: &str) -> Result<Self> {
        let (out, inc) = value
            .split_once(',')
            .ok_or_else(|| Error::frame("stomp", format!("bad heart-beat '{value}'")))?;
        let parse_ms = |part: &str| {
            part.trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|_| Error::frame("stomp", format!("bad heart-beat '{value}'")))
        };
        Ok(Self::new(parse_ms(out)?, parse_ms(inc)?))
    }

    /// Negotiates client settings against the server's `CONNECTED` header.
    ///
    /// Returns `(send_every, expect_every)`; `None` disables a direction.
    #[must_use]
    pub fn negotiate(&self, server: &HeartBeat) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: Duration, theirs: Duration| {
            (!ours.is_zero() && !theirs.is_zero()).then(|| ours.max(theirs))
        };
        (
            pick(self.outgoing, server.incoming),
            pick(self.incoming, server.outgoing),
        )
    }
}

// ============================================================================
// Frame
// ============================================================================

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame command.
    pub command: StompCommand,
    /// Headers in wire order. Repeated names keep the first value.
    pub headers: Vec<(String, String)>,
    /// Frame body.
    pub body: String,
}

impl Frame {
    /// Creates a frame with no headers and an empty body.
    #[inline]
    #[must_use]
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Appends a header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the first value of a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Builds a `CONNECT` frame.
    ///
    /// `extra` is appended after the protocol headers (e.g. `Authorization`).
    #[must_use]
    pub fn connect<'a>(
        host: &str,
        heart_beat: HeartBeat,
        extra: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut frame = Self::new(StompCommand::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", heart_beat.header_value());
        for (name, value) in extra {
            frame = frame.header(name, value);
        }
        frame
    }

    /// Builds a `SUBSCRIBE` frame.
    #[must_use]
    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
    }

    /// Builds an `UNSUBSCRIBE` frame.
    #[must_use]
    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    /// Builds a `DISCONNECT` frame requesting a receipt.
    #[must_use]
    pub fn disconnect(receipt: &str) -> Self {
        Self::new(StompCommand::Disconnect).header("receipt", receipt)
    }

    /// Serializes the frame including the NUL terminator.
    #[must_use]
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }
}

// ============================================================================
// StompData
// ============================================================================

/// Item produced by [`StompDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompData {
    /// Bare end-of-line between frames.
    HeartBeat,
    /// A complete frame.
    Frame(Frame),
}

// ============================================================================
// StompDecoder
// ============================================================================

/// Incremental decoder.
///
/// SockJS may split one frame across several messages or pack several frames
/// into one; the decoder buffers until a frame is complete.
#[derive(Debug, Default)]
pub struct StompDecoder {
    buffer: String,
}

impl StompDecoder {
    /// Creates an empty decoder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of buffered, not yet decoded bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds a chunk and returns every item it completes, in order.
    ///
    /// A frame with an unknown command, a header line with no colon, a bad
    /// escape, or a body that overruns its `content-length` yields an
    /// [`Error::Frame`] entry; that frame is discarded and decoding carries
    /// on with the next one.
    ///
    /// Input that grows past [`MAX_FRAME_SIZE`] without completing a frame,
    /// or a `content-length` above it, yields [`Error::FrameTooLarge`] and
    /// clears the buffer. The stream cannot be resynchronised after that.
    pub fn push(&mut self, chunk: &str) -> Vec<Result<StompData>> {
        self.buffer.push_str(chunk);
        let mut items = Vec::new();

        loop {
            let eol = if self.buffer.starts_with("\r\n") {
                2
            } else if self.buffer.starts_with('\n') {
                1
            } else {
                0
            };
            if eol > 0 {
                self.buffer.drain(..eol);
                items.push(Ok(StompData::HeartBeat));
                continue;
            }
            if self.buffer.is_empty() {
                break;
            }

            match self.take_frame() {
                Ok(Some(frame)) => items.push(Ok(StompData::Frame(frame))),
                Ok(None) => {
                    if self.buffer.len() > MAX_FRAME_SIZE {
                        self.buffer.clear();
                        items.push(Err(Error::frame_too_large("stomp", MAX_FRAME_SIZE)));
                    }
                    break;
                }
                Err(e) => items.push(Err(e)),
            }
        }

        items
    }

    /// Removes and parses one frame from the front of the buffer.
    ///
    /// Returns `Ok(None)` when the frame is not complete yet.
    fn take_frame(&mut self) -> Result<Option<Frame>> {
        let Some((head_len, body_start)) = find_head_end(&self.buffer) else {
            return Ok(None);
        };

        let (command, headers) = match parse_head(&self.buffer[..head_len]) {
            Ok(head) => head,
            Err(e) => {
                self.discard_through_nul(body_start);
                return Err(e);
            }
        };

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.trim().parse::<usize>().ok());

        let (body, consumed) = match content_length {
            Some(len) => {
                let end = match body_start.checked_add(len) {
                    Some(end) if len <= MAX_FRAME_SIZE => end,
                    _ => {
                        self.buffer.clear();
                        return Err(Error::frame_too_large("stomp", MAX_FRAME_SIZE));
                    }
                };
                if self.buffer.len() <= end {
                    return Ok(None);
                }
                let terminated = self
                    .buffer
                    .get(end..)
                    .is_some_and(|rest| rest.starts_with(NUL));
                match self.buffer.get(body_start..end) {
                    Some(body) if terminated => (body.to_string(), end + 1),
                    _ => {
                        self.discard_through_nul(body_start);
                        return Err(Error::frame(
                            "stomp",
                            format!("body does not end at content-length {len}"),
                        ));
                    }
                }
            }
            None => match self.buffer[body_start..].find(NUL) {
                Some(offset) => (
                    self.buffer[body_start..body_start + offset].to_string(),
                    body_start + offset + 1,
                ),
                None => return Ok(None),
            },
        };

        self.buffer.drain(..consumed);

        Ok(Some(Frame {
            command,
            headers,
            body,
        }))
    }

    /// Drops buffered input up to and including the next NUL after `from`.
    fn discard_through_nul(&mut self, from: usize) {
        match self.buffer[from..].find(NUL) {
            Some(offset) => {
                self.buffer.drain(..from + offset + 1);
            }
            None => self.buffer.clear(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Finds the blank line ending the header block.
///
/// Returns `(head_len, body_start)`.
fn find_head_end(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|i| (i, i + 2));
    let crlf = buffer.find("\r\n\r\n").map(|i| (i, i + 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// Parses the command line and header lines of one frame.
fn parse_head(head: &str) -> Result<(StompCommand, Vec<(String, String)>)> {
    let mut lines = head
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let name = lines.next().unwrap_or_default();
    let command = StompCommand::parse(name)
        .ok_or_else(|| Error::frame("stomp", format!("unknown command '{name}'")))?;

    let mut headers = Vec::new();
    for line in lines {
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| Error::frame("stomp", format!("header without colon '{line}'")))?;
        if command.escapes_headers() {
            headers.push((unescape_header(key)?, unescape_header(value)?));
        } else {
            headers.push((key.to_string(), value.to_string()));
        }
    }

    Ok((command, headers))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(Error::frame(
                    "stomp",
                    format!("undefined header escape '\\{}'", other.unwrap_or(' ')),
                ));
            }
        }
    }
    Ok(out)
}

// ============================================================================
// Tests
// ============================================================================
