//! Incremental `text/event-stream` parser.
//!
//! The parser consumes one decoded line at a time (terminators already
//! stripped by the transport) and accumulates fields until a blank line closes
//! the frame:
//!
//! - `data: <value>` - appended to the pending data, joined with `\n`
//! - `event: <name>` - event type of the pending frame (default `message`)
//! - `id: <value>` - last event id, kept across frames until overwritten
//! - `retry: <millis>` - reconnection delay update, digits only
//! - `:<comment>` - ignored
//!
//! Malformed fields never fail the stream; they are ignored.

use std::time::Duration;

use tracing::{debug, trace};

use crate::event::{DEFAULT_EVENT_TYPE, MessageEvent};

/// Output produced by [`EventStreamParser::line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserOutput {
    /// A complete event frame.
    Event {
        /// The frame's `event` field, or `message`
        event_type: String,
        /// The dispatched event
        event: MessageEvent,
    },
    /// A `retry` field with a valid millisecond value.
    Retry(Duration),
}

/// Stateful SSE line parser for a single connection.
///
/// Not shared between threads; the connection task owns it.
#[derive(Debug, Clone)]
pub struct EventStreamParser {
    origin: String,
    /// `Some` once a `data` field has been seen since the last dispatch
    pending_data: Option<Vec<String>>,
    pending_event_type: Option<String>,
    last_event_id: Option<String>,
}

impl EventStreamParser {
    /// Creates a parser whose events carry `origin`.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            pending_data: None,
            pending_event_type: None,
            last_event_id: None,
        }
    }

    /// Creates a parser that continues from a previously seen event id.
    pub fn with_last_event_id(origin: impl Into<String>, last_event_id: Option<String>) -> Self {
        Self {
            last_event_id,
            ..Self::new(origin)
        }
    }

    /// The origin attached to every event.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// The id that the next dispatched event will carry.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feeds one line and returns what it completed, if anything.
    pub fn line(&mut self, line: &str) -> Option<ParserOutput> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!("Ignoring SSE comment line");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.pending_data
                    .get_or_insert_with(Vec::new)
                    .push(value.to_string());
                None
            }
            "event" => {
                self.pending_event_type = Some(value.to_string());
                None
            }
            "id" => {
                self.last_event_id = Some(value.to_string());
                None
            }
            "retry" => parse_retry(value).map(ParserOutput::Retry),
            _ => {
                debug!("Ignoring unknown SSE field: {}", field);
                None
            }
        }
    }

    /// Splits `text` on line terminators and feeds every line.
    ///
    /// Intended for tests and offline processing of captured streams.
    pub fn lines(&mut self, text: &str) -> Vec<ParserOutput> {
        text.lines().filter_map(|line| self.line(line)).collect()
    }

    /// Drops the pending frame. The last event id is kept.
    pub fn reset(&mut self) {
        self.pending_data = None;
        self.pending_event_type = None;
    }

    fn dispatch(&mut self) -> Option<ParserOutput> {
        let data = self.pending_data.take()?;
        let event_type = self
            .pending_event_type
            .take()
            .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());

        let event = MessageEvent::new(data.join("\n"), self.last_event_id.clone(), &*self.origin);
        Some(ParserOutput::Event { event_type, event })
    }
}

/// Accepts a retry value only when it is made entirely of ASCII digits.
fn parse_retry(value: &str) -> Option<Duration> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        debug!("Ignoring malformed retry value: {:?}", value);
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_millis)
}
