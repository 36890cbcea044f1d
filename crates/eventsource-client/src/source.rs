//! The connection manager.
//!
//! An [`EventSource`] owns one logical subscription. Each connection attempt
//! runs on its own task: connect, send the request, validate the response
//! preamble, then parse lines until the stream ends. When an attempt ends for
//! any reason other than [`EventSource::close`], a single reconnect timer is
//! armed with the current delay.
//!
//! All mutable state sits behind one mutex. Attempt ids make tasks belonging
//! to an older connection inert once a newer one has started.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use eventsource_transport::{LineConnection, LineTransport, TransportError, TransportMetrics};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EventSourceBuilder, EventSourceConfig};
use crate::dispatcher::{AsyncDispatcher, Dispatch};
use crate::error::{EventSourceError, EventSourceResult};
use crate::handler::EventSourceHandler;
use crate::parser::{EventStreamParser, ParserOutput};
use crate::preamble::{PreambleStatus, PreambleValidator};
use crate::request::RequestTarget;
use crate::state::ConnectionState;

/// A Server-Sent Events subscription with automatic reconnection.
///
/// # Example
///
/// ```rust,no_run
/// use eventsource_client::{EventSource, MessageEvent, handler_fn};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let source = EventSource::new(
///         "http://localhost:8080/events",
///         handler_fn(|event_type: &str, event: MessageEvent| {
///             println!("{event_type}: {}", event.data());
///         }),
///     )?;
///
///     source.connect()?.established().await?;
///     tokio::signal::ctrl_c().await?;
///     source.shutdown(std::time::Duration::from_secs(1)).await;
///     Ok(())
/// }
/// ```
pub struct EventSource {
    inner: Arc<Inner>,
}

/// Resolves with the outcome of the first transport connection attempt.
#[derive(Debug)]
pub struct ConnectHandle {
    established: oneshot::Receiver<EventSourceResult<()>>,
}

impl ConnectHandle {
    /// Waits until the first connection attempt has either connected or
    /// failed. A failure has already been reported to the handler and a
    /// reconnect is scheduled.
    pub async fn established(self) -> EventSourceResult<()> {
        self.established
            .await
            .unwrap_or(Err(EventSourceError::Closed))
    }
}

struct Inner {
    config: EventSourceConfig,
    target: RequestTarget,
    transport: Arc<dyn LineTransport>,
    runtime: Handle,
    dispatcher: AsyncDispatcher,
    shared: Mutex<Shared>,
}

#[derive(Debug)]
struct Shared {
    state: ConnectionState,
    reconnect_delay: Duration,
    last_event_id: Option<String>,
    attempt: u64,
    active: Option<ActiveConnection>,
    timer: Option<JoinHandle<()>>,
}

impl Shared {
    /// `true` while attempt `id` is the latest and the source is not closed.
    fn is_current(&self, id: u64) -> bool {
        self.attempt == id && !self.state.is_closed()
    }
}

/// Cancellation handles of the most recent connection task.
#[derive(Debug, Clone)]
struct ActiveConnection {
    shutdown: CancellationToken,
    finished: CancellationToken,
}

/// Everything a connection task needs, captured under the state lock.
#[derive(Debug)]
struct Attempt {
    id: u64,
    shutdown: CancellationToken,
    finished: CancellationToken,
    request: String,
}

enum Phase {
    Preamble(PreambleValidator),
    Streaming(EventStreamParser),
}

impl EventSource {
    /// Starts building an event source for `uri`.
    pub fn builder(uri: impl Into<String>) -> EventSourceBuilder {
        EventSourceBuilder::new(uri)
    }

    /// Creates an event source with the default TCP transport and settings.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<H>(uri: impl Into<String>, handler: H) -> EventSourceResult<Self>
    where
        H: EventSourceHandler,
    {
        EventSourceBuilder::new(uri).build(handler)
    }

    pub(crate) fn from_parts(
        config: EventSourceConfig,
        transport: Arc<dyn LineTransport>,
        runtime: Handle,
        handler: Box<dyn EventSourceHandler>,
    ) -> EventSourceResult<Self> {
        let target = RequestTarget::parse(&config.uri)?;
        let dispatcher = AsyncDispatcher::spawn(handler, config.dispatch_capacity, &runtime);
        let shared = Shared {
            state: ConnectionState::Idle,
            reconnect_delay: config.reconnect_delay,
            last_event_id: None,
            attempt: 0,
            active: None,
            timer: None,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                target,
                transport,
                runtime,
                dispatcher,
                shared: Mutex::new(shared),
            }),
        })
    }

    /// Starts the first connection attempt.
    ///
    /// Fails with [`EventSourceError::AlreadyConnected`] if called twice and
    /// with [`EventSourceError::Closed`] after [`close`](Self::close).
    pub fn connect(&self) -> EventSourceResult<ConnectHandle> {
        let (tx, rx) = oneshot::channel();
        let attempt = {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                ConnectionState::Idle => {}
                ConnectionState::Closed => return Err(EventSourceError::Closed),
                _ => return Err(EventSourceError::AlreadyConnected),
            }
            self.inner.register_attempt(&mut shared)
        };

        self.inner.launch(attempt, Some(tx));
        Ok(ConnectHandle { established: rx })
    }

    /// Closes the event source for good.
    ///
    /// Cancels any pending reconnect and the active connection. An open
    /// connection reports `on_closed(false)`. Callbacks already queued are
    /// still delivered. Safe to call from any thread, any number of times.
    pub fn close(&self) {
        self.inner.close();
    }

    /// Waits until the current transport connection, if any, has fully closed.
    pub async fn join(&self) {
        let finished = self
            .inner
            .shared
            .lock()
            .active
            .as_ref()
            .map(|active| active.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    /// Closes the event source and waits up to `timeout` for every queued
    /// callback to be delivered. Returns `true` if the queue drained in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.close();
        let drained = tokio::time::timeout(timeout, self.inner.dispatcher.drained())
            .await
            .is_ok();
        if !drained {
            warn!(
                "Event source {} did not drain within {:?}",
                self.inner.target.uri(),
                timeout
            );
        }
        drained
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// `true` while a connection is open and streaming.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// The URI events are attributed to.
    pub fn origin(&self) -> &str {
        self.inner.target.uri()
    }

    /// The delay the next reconnect will wait for.
    pub fn reconnect_delay(&self) -> Duration {
        self.inner.shared.lock().reconnect_delay
    }

    /// The id sent as `Last-Event-ID` on the next reconnect.
    pub fn last_event_id(&self) -> Option<String> {
        self.inner.shared.lock().last_event_id.clone()
    }

    /// Counters of the underlying transport.
    pub fn transport_metrics(&self) -> TransportMetrics {
        self.inner.transport.metrics()
    }

    /// The configuration this event source was built with.
    pub fn config(&self) -> &EventSourceConfig {
        &self.inner.config
    }
}

impl fmt::Debug for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shared = self.inner.shared.lock();
        f.debug_struct("EventSource")
            .field("uri", &self.inner.target.uri())
            .field("state", &shared.state)
            .field("reconnect_delay", &shared.reconnect_delay)
            .field("last_event_id", &shared.last_event_id)
            .finish_non_exhaustive()
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        self.inner.close();
    }
}

impl Inner {
    /// Moves to `Connecting` and registers a new active connection.
    /// Caller holds the state lock and has checked the current state.
    fn register_attempt(&self, shared: &mut Shared) -> Attempt {
        shared.attempt += 1;
        shared.state = ConnectionState::Connecting;

        let active = ActiveConnection {
            shutdown: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        shared.active = Some(active.clone());

        Attempt {
            id: shared.attempt,
            shutdown: active.shutdown,
            finished: active.finished,
            request: self
                .target
                .render(shared.last_event_id.as_deref(), &self.config.headers),
        }
    }

    fn launch(
        self: &Arc<Self>,
        attempt: Attempt,
        handshake: Option<oneshot::Sender<EventSourceResult<()>>>,
    ) {
        let inner = Arc::clone(self);
        self.runtime
            .spawn(async move { inner.run_connection(attempt, handshake).await });
    }

    async fn run_connection(
        self: Arc<Self>,
        attempt: Attempt,
        handshake: Option<oneshot::Sender<EventSourceResult<()>>>,
    ) {
        let Attempt {
            id,
            shutdown,
            finished,
            request,
        } = attempt;
        let uri = self.target.uri();
        let endpoint = self.target.endpoint();
        debug!("Connecting to {} via {} (attempt {})", uri, endpoint, id);

        let connecting = tokio::time::timeout(
            self.config.connect_timeout,
            self.transport.connect(endpoint),
        );
        let connected = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                debug!("Connection attempt {} to {} cancelled", id, uri);
                finished.cancel();
                return;
            }
            result = connecting => result.unwrap_or_else(|_| {
                Err(TransportError::ConnectionTimeout {
                    endpoint: endpoint.to_string(),
                    timeout: self.config.connect_timeout,
                })
            }),
        };

        let mut connection = match connected {
            Ok(connection) => connection,
            Err(source) => {
                warn!("Failed to connect to {}: {}", uri, source);
                if let Some(tx) = handshake {
                    let _ = tx.send(Err(EventSourceError::ConnectFailed {
                        uri: uri.to_string(),
                        source: source.clone(),
                    }));
                }
                self.report(
                    id,
                    EventSourceError::ConnectFailed {
                        uri: uri.to_string(),
                        source,
                    },
                )
                .await;
                self.connection_lost(id).await;
                finished.cancel();
                return;
            }
        };
        if let Some(tx) = handshake {
            let _ = tx.send(Ok(()));
        }

        let lost = tokio::select! {
            biased;
            () = shutdown.cancelled() => false,
            () = self.stream(id, connection.as_mut(), &request) => true,
        };

        if let Err(e) = connection.close().await {
            debug!("Error closing connection to {}: {}", uri, e);
        }
        if lost {
            self.connection_lost(id).await;
        } else {
            debug!("Connection {} to {} cancelled", id, uri);
        }
        finished.cancel();
    }

    /// Drives one connection until it ends. Every failure has been reported
    /// by the time this returns.
    async fn stream(&self, id: u64, connection: &mut dyn LineConnection, request: &str) {
        let uri = self.target.uri();

        if let Err(e) = connection.write(request).await {
            self.report(id, e.into()).await;
            return;
        }
        if !self.transition(id, ConnectionState::Connecting, ConnectionState::AwaitingPreamble) {
            return;
        }

        let mut phase = Phase::Preamble(PreambleValidator::new(uri));
        loop {
            let line = match connection.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) if matches!(phase, Phase::Preamble(_)) => {
                    warn!("Connection to {} closed before the response preamble", uri);
                    let lost = TransportError::ConnectionLost(
                        "stream ended before the response preamble".to_string(),
                    );
                    self.report(id, lost.into()).await;
                    return;
                }
                Ok(None) => {
                    info!("Stream from {} ended", uri);
                    return;
                }
                Err(e) => {
                    warn!("Connection to {} failed: {}", uri, e);
                    self.report(id, e.into()).await;
                    return;
                }
            };

            match &mut phase {
                Phase::Preamble(validator) => match validator.line(&line) {
                    PreambleStatus::Pending => {}
                    PreambleStatus::Complete => {
                        let slot = self.dispatcher.reserve().await;
                        let last_event_id = {
                            let mut shared = self.shared.lock();
                            if shared.attempt != id
                                || shared.state != ConnectionState::AwaitingPreamble
                            {
                                debug!("Attempt {} superseded while {}", id, shared.state);
                                return;
                            }
                            // close() must never see Open without Connect queued
                            shared.state = ConnectionState::Open;
                            if let Some(slot) = slot {
                                slot.send(Dispatch::Connect);
                            }
                            shared.last_event_id.clone()
                        };
                        info!("Event stream open: {}", uri);
                        phase = Phase::Streaming(EventStreamParser::with_last_event_id(
                            uri,
                            last_event_id,
                        ));
                    }
                    PreambleStatus::Failed(error) => {
                        warn!("Rejected response from {}: {}", uri, error);
                        self.report(id, error.into()).await;
                        return;
                    }
                },
                Phase::Streaming(parser) => match parser.line(&line) {
                    None => {}
                    Some(ParserOutput::Event { event_type, event }) => {
                        debug!("Event '{}' from {}", event_type, uri);
                        let slot = self.dispatcher.reserve().await;
                        let mut shared = self.shared.lock();
                        if !shared.is_current(id) {
                            return;
                        }
                        if let Some(last_event_id) = event.last_event_id() {
                            shared.last_event_id = Some(last_event_id.to_string());
                        }
                        if let Some(slot) = slot {
                            slot.send(Dispatch::Message { event_type, event });
                        }
                    }
                    Some(ParserOutput::Retry(delay)) => {
                        debug!("Server set reconnect delay to {:?}", delay);
                        self.shared.lock().reconnect_delay = delay;
                    }
                },
            }
        }
    }

    /// Performs `from -> to` if attempt `id` is still current.
    fn transition(&self, id: u64, from: ConnectionState, to: ConnectionState) -> bool {
        let mut shared = self.shared.lock();
        if shared.attempt != id || shared.state != from {
            debug!("Attempt {} superseded while {}", id, shared.state);
            return false;
        }
        shared.state = to;
        true
    }

    /// Dispatches `error` unless attempt `id` is stale or the source is closed.
    async fn report(&self, id: u64, error: EventSourceError) {
        let slot = self.dispatcher.reserve().await;
        let shared = self.shared.lock();
        match slot {
            Some(slot) if shared.is_current(id) => slot.send(Dispatch::Error(error)),
            _ => debug!("Suppressing error from stale attempt {}: {}", id, error),
        }
    }

    async fn connection_lost(self: &Arc<Self>, id: u64) {
        let slot = self.dispatcher.reserve().await;
        {
            let mut shared = self.shared.lock();
            if !shared.is_current(id) {
                return;
            }
            if shared.state == ConnectionState::Open
                && let Some(slot) = slot
            {
                slot.send(Dispatch::Closed {
                    will_reconnect: true,
                });
            }
            shared.state = ConnectionState::ReconnectScheduled;
        }
        self.schedule_reconnect(id);
    }

    /// Arms the reconnect timer. At most one timer is outstanding.
    fn schedule_reconnect(self: &Arc<Self>, id: u64) {
        let mut shared = self.shared.lock();
        if shared.attempt != id
            || shared.state != ConnectionState::ReconnectScheduled
            || shared.timer.is_some()
        {
            return;
        }

        let delay = shared.reconnect_delay;
        warn!("Reconnecting to {} in {:?}", self.target.uri(), delay);
        let inner = Arc::clone(self);
        shared.timer = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            inner.fire_reconnect(id);
        }));
    }

    fn fire_reconnect(self: &Arc<Self>, id: u64) {
        let attempt = {
            let mut shared = self.shared.lock();
            shared.timer = None;
            if shared.attempt != id || shared.state != ConnectionState::ReconnectScheduled {
                return;
            }
            self.register_attempt(&mut shared)
        };
        self.launch(attempt, None);
    }

    fn close(&self) {
        let (was_open, active, timer) = {
            let mut shared = self.shared.lock();
            if shared.state.is_closed() {
                return;
            }
            let was_open = shared.state == ConnectionState::Open;
            shared.state = ConnectionState::Closed;
            (was_open, shared.active.clone(), shared.timer.take())
        };

        info!("Closing event source {}", self.target.uri());
        if let Some(timer) = timer {
            timer.abort();
        }
        if let Some(active) = active {
            active.shutdown.cancel();
        }
        if was_open {
            self.dispatcher.submit_now(Dispatch::Closed {
                will_reconnect: false,
            });
        }
        self.dispatcher.shutdown();
    }
}
