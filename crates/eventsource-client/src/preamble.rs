//! HTTP response preamble validation.
//!
//! A connection only becomes an event stream after the status line and
//! headers have been accepted. The validator is fed the response lines in
//! order and settles exactly once.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::error::ProtocolError;

static STATUS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^HTTP/\d(?:\.\d)? (\d{3})(?: .*)?$").expect("status line pattern is valid")
});

static EVENT_STREAM_CONTENT_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^content-type:[ \t]*text/event-stream[ \t]*(?:;.*)?$")
        .expect("content type pattern is valid")
});

/// Result of feeding one line to a [`PreambleValidator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreambleStatus {
    /// More lines are needed.
    Pending,
    /// The blank line after the headers was seen and everything checked out.
    Complete,
    /// The response is not an acceptable event stream.
    Failed(ProtocolError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    StatusLine,
    Headers { event_stream: bool },
}

/// Validates the status line and headers of an SSE response.
#[derive(Debug, Clone)]
pub struct PreambleValidator {
    uri: String,
    stage: Stage,
    settled: Option<PreambleStatus>,
}

impl PreambleValidator {
    /// Creates a validator for a response to a request sent to `uri`.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stage: Stage::StatusLine,
            settled: None,
        }
    }

    /// `true` once the validator has completed or failed.
    pub fn is_settled(&self) -> bool {
        self.settled.is_some()
    }

    /// Feeds one response line.
    pub fn line(&mut self, line: &str) -> PreambleStatus {
        if let Some(settled) = &self.settled {
            return settled.clone();
        }

        let status = match self.stage {
            Stage::StatusLine => self.status_line(line),
            Stage::Headers { event_stream } => self.header_line(line, event_stream),
        };

        if status != PreambleStatus::Pending {
            self.settled = Some(status.clone());
        }
        status
    }

    fn status_line(&mut self, line: &str) -> PreambleStatus {
        let Some(captures) = STATUS_LINE.captures(line) else {
            return PreambleStatus::Failed(ProtocolError::NotHttp {
                uri: self.uri.clone(),
                line: line.to_string(),
            });
        };

        // Three ASCII digits always fit
        let status = captures[1].parse::<u16>().unwrap_or_default();
        if status != 200 {
            return PreambleStatus::Failed(ProtocolError::BadStatus {
                uri: self.uri.clone(),
                status,
            });
        }

        debug!("Status line accepted from {}: {}", self.uri, line);
        self.stage = Stage::Headers {
            event_stream: false,
        };
        PreambleStatus::Pending
    }

    fn header_line(&mut self, line: &str, event_stream: bool) -> PreambleStatus {
        if line.is_empty() {
            return if event_stream {
                PreambleStatus::Complete
            } else {
                PreambleStatus::Failed(ProtocolError::NotEventStream {
                    uri: self.uri.clone(),
                })
            };
        }

        trace!("Response header: {}", line);
        if !event_stream && EVENT_STREAM_CONTENT_TYPE.is_match(line) {
            self.stage = Stage::Headers { event_stream: true };
        }
        PreambleStatus::Pending
    }
}
