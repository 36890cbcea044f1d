//! Event source configuration and builder.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eventsource_transport::{LineTransport, TcpLineTransportBuilder};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::error::{EventSourceError, EventSourceResult};
use crate::handler::EventSourceHandler;
use crate::request::validate_header;
use crate::source::EventSource;

/// Default delay before reconnecting after a lost connection.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(2000);

/// Default bound on connection establishment.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of callbacks that may wait in the dispatch queue.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 1024;

/// Static configuration of an [`EventSource`].
///
/// The reconnect delay here is only the initial value; servers may change
/// the live delay with `retry` fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSourceConfig {
    /// The stream URI, used verbatim as the origin of every event
    pub uri: String,

    /// Initial reconnect delay
    pub reconnect_delay: Duration,

    /// Connection establishment timeout
    pub connect_timeout: Duration,

    /// Extra request headers
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Bound of the dispatch queue
    pub dispatch_capacity: usize,
}

impl EventSourceConfig {
    /// Creates a configuration with defaults for everything but the URI.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            headers: HashMap::new(),
            dispatch_capacity: DEFAULT_DISPATCH_CAPACITY,
        }
    }

    /// Checks the values the engine cannot work with.
    pub fn validate(&self) -> EventSourceResult<()> {
        if self.dispatch_capacity == 0 {
            return Err(EventSourceError::Configuration(
                "dispatch_capacity must be greater than zero".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(EventSourceError::Configuration(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }
        for (name, value) in &self.headers {
            validate_header(name, value)?;
        }
        Ok(())
    }
}

/// Builder for [`EventSource`].
pub struct EventSourceBuilder {
    config: EventSourceConfig,
    transport: Option<Arc<dyn LineTransport>>,
    runtime: Option<Handle>,
}

impl fmt::Debug for EventSourceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSourceBuilder")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("runtime", &self.runtime.is_some())
            .finish()
    }
}

impl EventSourceBuilder {
    /// Create a builder for `uri`
    #[must_use]
    pub fn new(uri: impl Into<String>) -> Self {
        Self::from_config(EventSourceConfig::new(uri))
    }

    /// Start from an existing configuration
    #[must_use]
    pub fn from_config(config: EventSourceConfig) -> Self {
        Self {
            config,
            transport: None,
            runtime: None,
        }
    }

    /// Set the initial reconnect delay
    #[must_use]
    pub const fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    /// Set connection timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the dispatch queue bound
    #[must_use]
    pub const fn dispatch_capacity(mut self, capacity: usize) -> Self {
        self.config.dispatch_capacity = capacity;
        self
    }

    /// Add a request header sent on every connection attempt
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Use a custom transport instead of plain TCP
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn LineTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Run connection, timer and dispatch tasks on `handle`
    ///
    /// Defaults to the runtime `build` is called from.
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// The configuration built so far.
    pub fn config(&self) -> &EventSourceConfig {
        &self.config
    }

    /// Build the event source. Nothing is connected until
    /// [`EventSource::connect`] is called.
    pub fn build<H>(self, handler: H) -> EventSourceResult<EventSource>
    where
        H: EventSourceHandler,
    {
        self.config.validate()?;

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| {
                EventSourceError::Configuration(
                    "no Tokio runtime available; build inside a runtime or pass one with runtime()"
                        .to_string(),
                )
            })?,
        };

        let transport = self.transport.unwrap_or_else(|| {
            Arc::new(
                TcpLineTransportBuilder::new()
                    .connect_timeout(self.config.connect_timeout)
                    .build(),
            )
        });

        EventSource::from_parts(self.config, transport, runtime, Box::new(handler))
    }
}
