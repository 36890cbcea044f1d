//! Error types for the event source engine.

use eventsource_transport::TransportError;
use thiserror::Error;

/// A specialized `Result` type for event source operations.
pub type EventSourceResult<T> = std::result::Result<T, EventSourceError>;

/// Result returned by user handler callbacks.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Structural failures of the HTTP response preamble.
///
/// Each one fails the current connection attempt and triggers a reconnect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProtocolError {
    /// The first response line is not an HTTP status line.
    #[error("Not HTTP? {uri}: {line}")]
    NotHttp {
        /// The request URI
        uri: String,
        /// The offending first line
        line: String,
    },

    /// The server answered with a status other than 200.
    #[error("Bad status from {uri}: {status}")]
    BadStatus {
        /// The request URI
        uri: String,
        /// The numeric HTTP status
        status: u16,
    },

    /// The response headers ended without `Content-Type: text/event-stream`.
    #[error("Not event stream: {uri} (expected Content-Type: text/event-stream)")]
    NotEventStream {
        /// The request URI
        uri: String,
    },
}

/// Errors raised by user handler callbacks.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HandlerError {
    /// Generic handler error
    #[error("Handler error: {message}")]
    Generic {
        /// Description of the failure
        message: String,
    },

    /// The handler panicked; the payload is rendered as text when possible
    #[error("Handler panicked in {callback}: {message}")]
    Panicked {
        /// The callback that panicked
        callback: &'static str,
        /// The panic payload
        message: String,
    },

    /// External system error raised from inside a handler
    #[error("External system error: {source}")]
    External {
        /// The underlying error
        #[from]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl HandlerError {
    /// Creates a [`HandlerError::Generic`] from any message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }
}

/// Everything that can go wrong while running an event source.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EventSourceError {
    /// The response preamble was rejected.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The transport could not establish a connection.
    #[error("Failed to connect to {uri}: {source}")]
    ConnectFailed {
        /// The request URI
        uri: String,
        /// The transport failure
        #[source]
        source: TransportError,
    },

    /// An established connection failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A user callback failed or panicked.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The configured URI cannot be used.
    #[error("Invalid URI {uri}: {reason}")]
    InvalidUri {
        /// The rejected URI
        uri: String,
        /// Why it was rejected
        reason: String,
    },

    /// The event source was configured with invalid parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `connect()` was called on an event source that is already running.
    #[error("Event source is already connected")]
    AlreadyConnected,

    /// The event source has been closed and cannot be used again.
    #[error("Event source is closed")]
    Closed,
}
