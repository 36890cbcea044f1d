//! TCP line transport implementation

use async_trait::async_trait;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use crate::config::TcpConfig;
use crate::error::{TransportError, TransportResult};
use crate::metrics::{AtomicMetrics, TransportMetrics};
use crate::traits::{LineConnection, LineTransport};
use crate::types::Endpoint;

/// Plain TCP transport that frames the inbound byte stream into lines.
///
/// Lines are split on `\n` with an optional preceding `\r` and decoded as
/// UTF-8. TLS endpoints are rejected with [`TransportError::NotAvailable`].
#[derive(Debug, Clone)]
pub struct TcpLineTransport {
    config: TcpConfig,
    /// Transport metrics (lock-free atomic, shared with every connection)
    metrics: Arc<AtomicMetrics>,
}

impl TcpLineTransport {
    /// Create a new TCP transport with the given configuration
    #[must_use]
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(AtomicMetrics::default()),
        }
    }

    /// The configuration this transport was built with
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }

    fn codec(&self) -> LinesCodec {
        match self.config.max_line_length {
            Some(max) => LinesCodec::new_with_max_length(max),
            None => LinesCodec::new(),
        }
    }
}

impl Default for TcpLineTransport {
    fn default() -> Self {
        Self::new(TcpConfig::default())
    }
}

#[async_trait]
impl LineTransport for TcpLineTransport {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn LineConnection>> {
        if endpoint.secure {
            return Err(TransportError::NotAvailable(format!(
                "TLS is not supported by the TCP line transport ({endpoint})"
            )));
        }

        info!("Connecting to TCP endpoint {}", endpoint);
        self.metrics.connections.fetch_add(1, Ordering::Relaxed);

        let connect = TcpStream::connect((endpoint.host.as_str(), endpoint.port));
        let stream = match tokio::time::timeout(self.config.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                self.metrics
                    .failed_connections
                    .fetch_add(1, Ordering::Relaxed);
                return Err(TransportError::ConnectionFailed(format!(
                    "Failed to connect to {endpoint}: {e}"
                )));
            }
            Err(_) => {
                self.metrics
                    .failed_connections
                    .fetch_add(1, Ordering::Relaxed);
                return Err(TransportError::ConnectionTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.config.connect_timeout,
                });
            }
        };

        if self.config.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!("Failed to set TCP_NODELAY for {}: {}", endpoint, e);
        }

        let peer = stream.peer_addr().ok();
        let (read_half, write_half) = stream.into_split();
        self.metrics
            .active_connections
            .fetch_add(1, Ordering::Relaxed);
        debug!("TCP connection to {} established (peer {:?})", endpoint, peer);

        Ok(Box::new(TcpLineConnection {
            reader: FramedRead::new(read_half, self.codec()),
            writer: Some(write_half),
            peer,
            max_line_length: self.config.max_line_length,
            metrics: Arc::clone(&self.metrics),
        }))
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }
}

/// A single TCP connection produced by [`TcpLineTransport`]
struct TcpLineConnection {
    reader: FramedRead<OwnedReadHalf, LinesCodec>,
    /// `None` once the connection has been closed locally
    writer: Option<OwnedWriteHalf>,
    peer: Option<SocketAddr>,
    max_line_length: Option<usize>,
    metrics: Arc<AtomicMetrics>,
}

impl std::fmt::Debug for TcpLineConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpLineConnection")
            .field("peer", &self.peer)
            .field("open", &self.writer.is_some())
            .finish()
    }
}

#[async_trait]
impl LineConnection for TcpLineConnection {
    async fn write(&mut self, data: &str) -> TransportResult<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TransportError::SendFailed("connection already closed".into()))?;

        writer
            .write_all(data.as_bytes())
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        self.metrics
            .bytes_sent
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn next_line(&mut self) -> TransportResult<Option<String>> {
        if self.writer.is_none() {
            return Ok(None);
        }

        match self.reader.next().await {
            Some(Ok(line)) => {
                self.metrics.record_line(line.len());
                Ok(Some(line))
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => Err(TransportError::LineTooLong {
                max: self.max_line_length.unwrap_or(usize::MAX),
            }),
            Some(Err(LinesCodecError::Io(e))) => Err(TransportError::ReceiveFailed(e.to_string())),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        if let Some(mut writer) = self.writer.take() {
            self.metrics.connection_closed();
            if let Err(e) = writer.shutdown().await {
                // The peer may already be gone; closing is still complete.
                debug!("TCP shutdown for {:?} reported: {}", self.peer, e);
            }
        }
        Ok(())
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }
}

impl Drop for TcpLineConnection {
    fn drop(&mut self) {
        if self.writer.take().is_some() {
            self.metrics.connection_closed();
        }
    }
}

/// TCP line transport builder
#[derive(Debug)]
pub struct TcpLineTransportBuilder {
    config: TcpConfig,
}

impl TcpLineTransportBuilder {
    /// Create a new TCP transport builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: TcpConfig::default(),
        }
    }

    /// Set connection timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the maximum decoded line length (`None` = unlimited)
    #[must_use]
    pub const fn max_line_length(mut self, max: Option<usize>) -> Self {
        self.config.max_line_length = max;
        self
    }

    /// Enable or disable `TCP_NODELAY`
    #[must_use]
    pub const fn nodelay(mut self, enabled: bool) -> Self {
        self.config.nodelay = enabled;
        self
    }

    /// Build the TCP transport
    #[must_use]
    pub fn build(self) -> TcpLineTransport {
        TcpLineTransport::new(self.config)
    }
}

impl Default for TcpLineTransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
