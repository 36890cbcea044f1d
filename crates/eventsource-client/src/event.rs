//! Parsed event values.

use serde::{Deserialize, Serialize};

/// Event type used when a frame carries no `event` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched Server-Sent Event.
///
/// Values are immutable once the parser has built them; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageEvent {
    data: String,
    last_event_id: Option<String>,
    origin: String,
}

impl MessageEvent {
    /// Creates a new event.
    pub fn new(
        data: impl Into<String>,
        last_event_id: Option<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            data: data.into(),
            last_event_id,
            origin: origin.into(),
        }
    }

    /// The `data` lines of the frame joined with `\n`.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// The most recent `id` seen on the stream when this event was dispatched.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// The request URI of the connection that produced this event.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Consumes the event and returns its data.
    pub fn into_data(self) -> String {
        self.data
    }
}
