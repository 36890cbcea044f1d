//! Connection lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of an [`EventSource`](crate::EventSource).
///
/// `Closed` is terminal and only reachable through `close()`. Every other
/// failure leads to `ReconnectScheduled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Built but `connect()` has not been called yet
    Idle,
    /// Waiting for the transport to establish a connection
    Connecting,
    /// Request sent, validating the response status line and headers
    AwaitingPreamble,
    /// Receiving events
    Open,
    /// The connection was lost and a reconnect timer is armed
    ReconnectScheduled,
    /// Permanently closed
    Closed,
}

impl ConnectionState {
    /// `true` once `close()` has been called.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingPreamble => "awaiting_preamble",
            Self::Open => "open",
            Self::ReconnectScheduled => "reconnect_scheduled",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}
