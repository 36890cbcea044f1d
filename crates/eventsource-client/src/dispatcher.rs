//! Ordered delivery of callbacks to the user handler.
//!
//! The connection task never calls the handler directly. It queues
//! [`Dispatch`] items on a bounded channel that a single task drains, so
//! callbacks are serialized in queue order and a slow or failing handler
//! cannot corrupt connection state.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{EventSourceError, HandlerError, HandlerResult};
use crate::event::MessageEvent;
use crate::handler::EventSourceHandler;

/// One callback invocation waiting to be delivered.
#[derive(Debug)]
pub(crate) enum Dispatch {
    Connect,
    Message {
        event_type: String,
        event: MessageEvent,
    },
    Error(EventSourceError),
    Closed {
        will_reconnect: bool,
    },
}

impl Dispatch {
    fn name(&self) -> &'static str {
        match self {
            Self::Connect => "on_connect",
            Self::Message { .. } => "on_message",
            Self::Error(_) => "on_error",
            Self::Closed { .. } => "on_closed",
        }
    }
}

/// A reserved place in the dispatch queue.
#[derive(Debug)]
pub(crate) struct DispatchSlot {
    permit: mpsc::OwnedPermit<Dispatch>,
}

impl DispatchSlot {
    /// Queues `item` in the reserved place. Never waits.
    pub(crate) fn send(self, item: Dispatch) {
        self.permit.send(item);
    }
}

/// Single-consumer callback queue owning the user handler.
pub(crate) struct AsyncDispatcher {
    sender: Mutex<Option<mpsc::Sender<Dispatch>>>,
    drained: CancellationToken,
    runtime: Handle,
}

impl fmt::Debug for AsyncDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncDispatcher")
            .field("accepting", &self.sender.lock().is_some())
            .field("drained", &self.drained.is_cancelled())
            .finish()
    }
}

impl AsyncDispatcher {
    /// Spawns the delivery task on `runtime`.
    pub(crate) fn spawn(
        handler: Box<dyn EventSourceHandler>,
        capacity: usize,
        runtime: &Handle,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let drained = CancellationToken::new();
        runtime.spawn(deliver_all(handler, receiver, drained.clone()));

        Self {
            sender: Mutex::new(Some(sender)),
            drained,
            runtime: runtime.clone(),
        }
    }

    /// Reserves room for one item, waiting while the queue is full.
    ///
    /// The connection task sends through the slot while holding the state
    /// lock, so queue order follows the order of state changes. Returns
    /// `None` once the dispatcher has been shut down.
    pub(crate) async fn reserve(&self) -> Option<DispatchSlot> {
        let Some(sender) = self.sender.lock().clone() else {
            debug!("Dispatcher shut down, no slot reserved");
            return None;
        };
        match sender.reserve_owned().await {
            Ok(permit) => Some(DispatchSlot { permit }),
            Err(_) => {
                debug!("Dispatcher task gone, no slot reserved");
                None
            }
        }
    }

    /// Queues `item` without waiting. Used from synchronous code.
    ///
    /// When the queue is full the send completes on a spawned task, so the
    /// item still lands after everything accepted before this call. Two such
    /// sends racing for space may land in either order, so `close()` is the
    /// only caller and submits a single final item.
    pub(crate) fn submit_now(&self, item: Dispatch) -> bool {
        let Some(sender) = self.sender.lock().clone() else {
            debug!("Dispatcher shut down, dropping {}", item.name());
            return false;
        };
        match sender.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(item)) => {
                self.runtime.spawn(async move {
                    let _ = sender.send(item).await;
                });
                true
            }
            Err(TrySendError::Closed(item)) => {
                debug!("Dispatcher task gone, dropping {}", item.name());
                false
            }
        }
    }

    /// Stops accepting new items. Items already accepted are still delivered.
    pub(crate) fn shutdown(&self) {
        if self.sender.lock().take().is_some() {
            debug!("Dispatcher queue closed");
        }
    }

    /// Resolves once the delivery task has finished every accepted item.
    pub(crate) async fn drained(&self) {
        self.drained.cancelled().await;
    }
}

async fn deliver_all(
    mut handler: Box<dyn EventSourceHandler>,
    mut receiver: mpsc::Receiver<Dispatch>,
    drained: CancellationToken,
) {
    while let Some(item) = receiver.recv().await {
        deliver(handler.as_mut(), item).await;
    }
    debug!("Dispatcher drained");
    drained.cancel();
}

async fn deliver(handler: &mut dyn EventSourceHandler, item: Dispatch) {
    let callback = item.name();
    let outcome = match item {
        Dispatch::Connect => AssertUnwindSafe(handler.on_connect()).catch_unwind().await,
        Dispatch::Message { event_type, event } => {
            AssertUnwindSafe(handler.on_message(&event_type, event))
                .catch_unwind()
                .await
        }
        Dispatch::Closed { will_reconnect } => {
            AssertUnwindSafe(handler.on_closed(will_reconnect))
                .catch_unwind()
                .await
        }
        Dispatch::Error(error) => {
            report(handler, error).await;
            return;
        }
    };

    if let Some(failure) = handler_failure(callback, outcome) {
        warn!("Handler failed in {}: {}", callback, failure);
        report(handler, EventSourceError::Handler(failure)).await;
    }
}

fn handler_failure(
    callback: &'static str,
    outcome: Result<HandlerResult, Box<dyn Any + Send>>,
) -> Option<HandlerError> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(error)) => Some(error),
        Err(payload) => Some(HandlerError::Panicked {
            callback,
            message: panic_message(payload.as_ref()),
        }),
    }
}

async fn report(handler: &mut dyn EventSourceHandler, error: EventSourceError) {
    if let Err(payload) = AssertUnwindSafe(handler.on_error(error))
        .catch_unwind()
        .await
    {
        error!(
            "Handler panicked in on_error: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
