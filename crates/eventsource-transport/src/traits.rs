//! Core transport traits.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::TransportResult;
use crate::metrics::TransportMetrics;
use crate::types::Endpoint;

/// Opens line-oriented connections to remote endpoints.
///
/// A single transport may be shared by many event sources; every call to
/// [`connect`](LineTransport::connect) produces an independent connection.
#[async_trait]
pub trait LineTransport: Send + Sync + std::fmt::Debug {
    /// Establishes a new connection to `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn LineConnection>>;

    /// Returns a snapshot of the transport's counters.
    fn metrics(&self) -> TransportMetrics {
        TransportMetrics::default()
    }
}

/// One established connection that yields decoded text lines.
#[async_trait]
pub trait LineConnection: Send + std::fmt::Debug {
    /// Writes raw text (request line and headers) to the remote side.
    async fn write(&mut self, data: &str) -> TransportResult<()>;

    /// Returns the next line without its terminator, or `None` once the remote
    /// side has closed the stream.
    async fn next_line(&mut self) -> TransportResult<Option<String>>;

    /// Closes the connection. Calling it more than once is allowed.
    async fn close(&mut self) -> TransportResult<()>;

    /// The remote socket address, if known.
    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }
}
