//! Transport metrics types.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// A serializable snapshot of a transport's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportMetrics {
    /// Total number of bytes written.
    pub bytes_sent: u64,

    /// Total number of bytes received, counted per decoded line.
    pub bytes_received: u64,

    /// Total number of decoded lines received.
    pub lines_received: u64,

    /// Total number of connection attempts.
    pub connections: u64,

    /// Total number of failed connection attempts.
    pub failed_connections: u64,

    /// The current number of open connections.
    pub active_connections: u64,
}

/// Lock-free counters shared between a transport and the connections it creates.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    /// Total bytes written (atomic counter).
    pub bytes_sent: AtomicU64,

    /// Total bytes received (atomic counter).
    pub bytes_received: AtomicU64,

    /// Total lines received (atomic counter).
    pub lines_received: AtomicU64,

    /// Total connection attempts (atomic counter).
    pub connections: AtomicU64,

    /// Failed connection attempts (atomic counter).
    pub failed_connections: AtomicU64,

    /// Currently open connections (atomic counter).
    pub active_connections: AtomicU64,
}

impl AtomicMetrics {
    /// Creates a new `AtomicMetrics` instance with all counters initialized to zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one received line of `len` bytes.
    pub fn record_line(&self, len: usize) {
        self.lines_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    /// Decrements the open connection gauge without wrapping below zero.
    pub fn connection_closed(&self) {
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Creates a serializable `TransportMetrics` snapshot from the current atomic values.
    pub fn snapshot(&self) -> TransportMetrics {
        TransportMetrics {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            lines_received: self.lines_received.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
            failed_connections: self.failed_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_metrics_default() {
        let metrics = AtomicMetrics::new();
        assert_eq!(metrics.snapshot(), TransportMetrics::default());
    }

    #[test]
    fn test_record_line() {
        let metrics = AtomicMetrics::new();
        metrics.record_line(11);
        metrics.record_line(0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.lines_received, 2);
        assert_eq!(snapshot.bytes_received, 11);
    }

    #[test]
    fn test_connection_gauge_never_wraps() {
        let metrics = AtomicMetrics::new();
        metrics.connection_closed();
        assert_eq!(metrics.snapshot().active_connections, 0);

        metrics.active_connections.fetch_add(1, Ordering::Relaxed);
        metrics.connection_closed();
        assert_eq!(metrics.snapshot().active_connections, 0);
    }
}
