//! Transport error types.

use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Represents errors that can occur while connecting to, writing to, or reading
/// lines from a remote endpoint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportError {
    /// Failed to establish a connection.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection establishment timed out.
    #[error(
        "Connection to {endpoint} timed out after {timeout:?}. \
         If this is expected, increase the timeout with \
         `TcpConfig {{ connect_timeout: Duration::from_secs({}) }}`",
        timeout.as_secs() * 2
    )]
    ConnectionTimeout {
        /// The endpoint that did not answer in time
        endpoint: String,
        /// The timeout duration that was exceeded
        timeout: Duration,
    },

    /// An established connection was lost.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// Failed to write to the connection.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Failed to read a line from the connection.
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A single line exceeded the configured maximum length.
    #[error(
        "Line exceeds maximum allowed length ({max} bytes). \
         If this is expected, raise the limit with \
         `TcpConfig {{ max_line_length: Some(..) }}`"
    )]
    LineTooLong {
        /// The maximum allowed line length in bytes
        max: usize,
    },

    /// The requested endpoint cannot be served by this transport.
    #[error("Transport not available: {0}")]
    NotAvailable(String),

    /// An underlying I/O error occurred.
    #[error("IO error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns `true` if the error happened before a connection existed.
    pub fn is_connect_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed(_) | Self::ConnectionTimeout { .. } | Self::NotAvailable(_)
        )
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
