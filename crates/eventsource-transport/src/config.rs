//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`TcpLineTransport`](crate::TcpLineTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpConfig {
    /// Connection establishment timeout.
    pub connect_timeout: Duration,

    /// Maximum length of a single decoded line in bytes.
    /// `None` = unlimited
    pub max_line_length: Option<usize>,

    /// Whether to set `TCP_NODELAY` on new sockets.
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            max_line_length: Some(1024 * 1024), // 1MB
            nodelay: true,
        }
    }
}
