//! Shared fixtures for event source integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use eventsource_client::transport::{
    Endpoint, LineConnection, LineTransport, TransportError, TransportResult,
};
use eventsource_client::{EventSourceError, EventSourceHandler, HandlerError, HandlerResult, MessageEvent};
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// What the next connection attempt to a [`ScriptedTransport`] does.
#[derive(Debug, Clone)]
pub enum Script {
    /// Fail the connect
    Refuse,
    /// Deliver the lines, then end the stream
    Lines(Vec<String>),
    /// Deliver the lines, then stay open until closed
    Hold(Vec<String>),
}

/// In-memory transport that plays one script per connection attempt.
///
/// Once the scripts run out every further attempt is refused.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Arc<Mutex<Vec<String>>>,
    connects: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        })
    }

    /// Requests written by the engine, one per successful connect.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// Number of connect calls so far, refused ones included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LineTransport for ScriptedTransport {
    async fn connect(&self, endpoint: &Endpoint) -> TransportResult<Box<dyn LineConnection>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let script = self.scripts.lock().pop_front().unwrap_or(Script::Refuse);

        let (lines, hold) = match script {
            Script::Refuse => {
                return Err(TransportError::ConnectionFailed(format!(
                    "{endpoint}: connection refused"
                )));
            }
            Script::Lines(lines) => (lines, false),
            Script::Hold(lines) => (lines, true),
        };

        Ok(Box::new(ScriptedConnection {
            lines: lines.into(),
            hold,
            closed: false,
            requests: Arc::clone(&self.requests),
        }))
    }
}

#[derive(Debug)]
struct ScriptedConnection {
    lines: VecDeque<String>,
    hold: bool,
    closed: bool,
    requests: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl LineConnection for ScriptedConnection {
    async fn write(&mut self, data: &str) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::SendFailed("closed".into()));
        }
        self.requests.lock().push(data.to_string());
        Ok(())
    }

    async fn next_line(&mut self) -> TransportResult<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        if let Some(line) = self.lines.pop_front() {
            return Ok(Some(line));
        }
        if self.hold {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        Ok(())
    }
}

/// A successful SSE response preamble followed by `body`.
pub fn sse_response(body: &[&str]) -> Vec<String> {
    let mut lines = vec![
        "HTTP/1.1 200 OK".to_string(),
        "Content-Type: text/event-stream".to_string(),
        String::new(),
    ];
    lines.extend(body.iter().map(|line| (*line).to_string()));
    lines
}

pub fn raw(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| (*line).to_string()).collect()
}

/// A callback as seen by [`ChannelHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observed {
    Connect,
    Message { event_type: String, event: MessageEvent },
    Error(String),
    Closed(bool),
}

impl Observed {
    pub fn message(event_type: &str, data: &str, last_event_id: Option<&str>, origin: &str) -> Self {
        Self::Message {
            event_type: event_type.to_string(),
            event: MessageEvent::new(data, last_event_id.map(String::from), origin),
        }
    }
}

/// Forwards every callback to a channel. Messages whose data is `fail` are
/// rejected with a handler error.
#[derive(Debug)]
pub struct ChannelHandler {
    tx: UnboundedSender<Observed>,
}

impl ChannelHandler {
    pub fn new() -> (Self, UnboundedReceiver<Observed>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSourceHandler for ChannelHandler {
    async fn on_connect(&mut self) -> HandlerResult {
        let _ = self.tx.send(Observed::Connect);
        Ok(())
    }

    async fn on_message(&mut self, event_type: &str, event: MessageEvent) -> HandlerResult {
        if event.data() == "fail" {
            return Err(HandlerError::msg("rejected"));
        }
        let _ = self.tx.send(Observed::Message {
            event_type: event_type.to_string(),
            event,
        });
        Ok(())
    }

    async fn on_error(&mut self, error: EventSourceError) {
        let _ = self.tx.send(Observed::Error(error.to_string()));
    }

    async fn on_closed(&mut self, will_reconnect: bool) -> HandlerResult {
        let _ = self.tx.send(Observed::Closed(will_reconnect));
        Ok(())
    }
}

/// Receives the next callback or panics after five seconds.
pub async fn next(rx: &mut UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a callback")
        .expect("handler dropped")
}

/// Asserts that no callback arrives within `window`.
pub async fn assert_quiet(rx: &mut UnboundedReceiver<Observed>, window: Duration) {
    if let Ok(Some(observed)) = tokio::time::timeout(window, rx.recv()).await {
        panic!("unexpected callback: {observed:?}");
    }
}

/// Installs a test subscriber; repeated calls are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}
