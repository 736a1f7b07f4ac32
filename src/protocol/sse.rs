//! Server-Sent Events parser.
//!
//! Incremental parser for `text/event-stream` bodies. Chunks may split lines
//! (and UTF-8 sequences) anywhere; only complete lines are interpreted.
//!
//! # Format
//!
//! ```text
//! event: gps
//! id: 42
//! data: {"vehicleId":7,...}
//!
//! ```
//!
//! Lines end with `\r\n`, `\n` or `\r`. A blank line dispatches the event.
//! Lines starting with `:` are comments.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Event type used when an event has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Largest line or event body, in bytes, the parser will buffer.
pub const MAX_EVENT_SIZE: usize = 1024 * 1024;

const BOM: &[u8] = b"\xEF\xBB\xBF";

// ============================================================================
// SseEvent
// ============================================================================

/// A dispatched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` when unnamed).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event ID in effect when the event was dispatched.
    pub id: Option<String>,
}

// ============================================================================
// EventStreamParser
// ============================================================================

/// Incremental `text/event-stream` parser.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    pending: Vec<u8>,
    started: bool,
    event: Option<String>,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl EventStreamParser {
    /// Creates a parser with no resume state.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a parser resuming from a previous last event ID.
    #[must_use]
    pub fn resuming(last_event_id: Option<String>) -> Self {
        Self {
            last_event_id,
            ..Self::default()
        }
    }

    /// Last event ID seen so far.
    #[inline]
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnection time announced by the server.
    #[inline]
    #[must_use]
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feeds raw bytes and returns every event they complete.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameTooLarge`] when an unterminated line or an
    /// undispatched event grows past [`MAX_EVENT_SIZE`]. Buffered input and
    /// the event being built are discarded; resume state is kept.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>> {
        self.pending.extend_from_slice(chunk);

        if !self.started {
            if self.pending.len() < BOM.len() && BOM.starts_with(&self.pending) {
                return Ok(Vec::new());
            }
            if self.pending.starts_with(BOM) {
                self.pending.drain(..BOM.len());
            }
            self.started = true;
        }

        let mut events = Vec::new();
        let mut start = 0;
        let mut i = 0;

        while i < self.pending.len() {
            let end_len = match self.pending[i] {
                b'\n' => 1,
                b'\r' => match self.pending.get(i + 1) {
                    Some(b'\n') => 2,
                    Some(_) => 1,
                    // CR at the end of the chunk may be the first half of CRLF.
                    None => break,
                },
                _ => {
                    i += 1;
                    continue;
                }
            };

            let line = String::from_utf8_lossy(&self.pending[start..i]).into_owned();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
            i += end_len;
            start = i;
        }

        self.pending.drain(..start);

        if self.pending.len() > MAX_EVENT_SIZE || self.data.len() > MAX_EVENT_SIZE {
            self.pending.clear();
            self.event = None;
            self.data.clear();
            self.has_data = false;
            return Err(Error::frame_too_large("sse", MAX_EVENT_SIZE));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_string());
            }
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseEvent {
            event: event
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data,
            id: self.last_event_id.clone(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    const STREAM: &str = "retry: 2500\n\
                          : keep-alive\n\
                          event: gps\n\
                          id: 1\n\
                          data: {\"vehicleId\":7}\n\
                          \n\
                          data: first\n\
                          data: second\n\
                          \n\
                          event: other\n\
                          data: x\n\
                          \n";

    #[test]
    fn test_named_event() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(STREAM.as_bytes()).expect("feed");

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].event, "gps");
        assert_eq!(events[0].data, "{\"vehicleId\":7}");
        assert_eq!(events[0].id.as_deref(), Some("1"));
        assert_eq!(parser.retry(), Some(Duration::from_millis(2500)));
    }

    #[test]
    fn test_multiline_data_default_event() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(STREAM.as_bytes()).expect("feed");
        assert_eq!(events[1].event, DEFAULT_EVENT);
        assert_eq!(events[1].data, "first\nsecond");
        assert_eq!(events[1].id.as_deref(), Some("1"));
    }

    #[test]
    fn test_event_without_data_is_not_dispatched() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"event: gps\n\ndata: y\n\n").expect("feed");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, DEFAULT_EVENT);
    }

    #[test]
    fn test_crlf_and_cr_line_endings() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"data: a\r\n\r\ndata: b\r\rdata: c\n\n").expect("feed");
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].data, "b");
        assert_eq!(events[2].data, "c");
    }

    #[test]
    fn test_cr_split_across_chunks() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"data: a\r").expect("feed").is_empty());
        let events = parser.feed(b"\n\r\n").expect("feed");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "a");
    }

    #[test]
    fn test_bom_stripped() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"\xEF\xBB").expect("feed").is_empty());
        let events = parser.feed(b"\xBFdata: z\n\n").expect("feed");
        assert_eq!(events[0].data, "z");
    }

    #[test]
    fn test_field_without_colon_and_no_space() {
        let mut parser = EventStreamParser::new();
        let events = parser.feed(b"data\ndata:x\n\n").expect("feed");
        assert_eq!(events[0].data, "\nx");
    }

    #[test]
    fn test_invalid_retry_ignored() {
        let mut parser = EventStreamParser::new();
        parser.feed(b"retry: soon\n\n").expect("feed");
        assert_eq!(parser.retry(), None);
    }

    #[test]
    fn test_empty_id_resets() {
        let mut parser = EventStreamParser::resuming(Some("9".into()));
        assert_eq!(parser.last_event_id(), Some("9"));
        parser.feed(b"id\n\n").expect("feed");
        assert_eq!(parser.last_event_id(), None);
    }

    #[test]
    fn test_incomplete_event_held_back() {
        let mut parser = EventStreamParser::new();
        assert!(parser.feed(b"data: partial").expect("feed").is_empty());
        assert!(parser.feed(b"\n").expect("feed").is_empty());
        assert_eq!(parser.feed(b"\n").expect("feed").len(), 1);
    }

    #[test]
    fn test_unterminated_line_is_capped() {
        let mut parser = EventStreamParser::resuming(Some("4".into()));
        assert!(parser.feed(b"data: ").expect("feed").is_empty());

        let err = parser.feed(&vec![b'x'; MAX_EVENT_SIZE]).unwrap_err();
        assert!(matches!(err, Error::FrameTooLarge { codec: "sse", .. }));
        assert!(err.is_transport_error());

        // Resume state survives, and the parser keeps working.
        assert_eq!(parser.last_event_id(), Some("4"));
        let events = parser.feed(b"data: ok\n\n").expect("feed");
        assert_eq!(events[0].data, "ok");
    }

    #[test]
    fn test_undispatched_event_is_capped() {
        let mut parser = EventStreamParser::new();
        let line = format!("data: {}\n", "y".repeat(1024));
        let mut result = Ok(Vec::new());
        for _ in 0..=MAX_EVENT_SIZE / 1024 {
            result = parser.feed(line.as_bytes());
            if result.is_err() {
                break;
            }
        }
        assert!(result.is_err_and(|e| e.is_transport_error()));
    }

    proptest! {
        #[test]
        fn prop_chunking_does_not_change_events(split in proptest::collection::vec(0usize..STREAM.len(), 0..6)) {
            let bytes = STREAM.as_bytes();
            let mut whole = EventStreamParser::new();
            let expected = whole.feed(bytes).expect("feed");

            let mut cuts = split;
            cuts.sort_unstable();
            let mut parser = EventStreamParser::new();
            let mut events = Vec::new();
            let mut last = 0;
            for cut in cuts {
                events.extend(parser.feed(&bytes[last..cut]).expect("feed"));
                last = cut;
            }
            events.extend(parser.feed(&bytes[last..]).expect("feed"));

            prop_assert_eq!(events, expected);
        }
    }
}
