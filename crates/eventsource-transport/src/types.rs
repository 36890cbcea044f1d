//! Core transport types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A remote address the engine wants a line stream from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or IP literal, without brackets.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Whether the connection must be wrapped in TLS.
    pub secure: bool,
}

impl Endpoint {
    /// Creates a new endpoint.
    pub fn new(host: impl Into<String>, port: u16, secure: bool) -> Self {
        Self {
            host: host.into(),
            port,
            secure,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
