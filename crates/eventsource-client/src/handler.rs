//! Application callback interface.

use std::fmt;

use async_trait::async_trait;
use tracing::error;

use crate::error::{EventSourceError, HandlerResult};
use crate::event::MessageEvent;

/// Receives the lifecycle and events of an [`EventSource`](crate::EventSource).
///
/// All callbacks run in order on a single dispatcher task, never on the
/// connection task, so a slow handler delays delivery but not I/O.
///
/// Returning `Err` (or panicking) from any callback other than
/// [`on_error`](Self::on_error) is reported back through `on_error` as
/// [`EventSourceError::Handler`].
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use eventsource_client::{EventSourceError, EventSourceHandler, HandlerResult, MessageEvent};
///
/// #[derive(Debug, Default)]
/// struct Printer;
///
/// #[async_trait]
/// impl EventSourceHandler for Printer {
///     async fn on_message(&mut self, event_type: &str, event: MessageEvent) -> HandlerResult {
///         println!("{event_type}: {}", event.data());
///         Ok(())
///     }
///
///     async fn on_error(&mut self, error: EventSourceError) {
///         eprintln!("stream error: {error}");
///     }
/// }
/// ```
#[async_trait]
pub trait EventSourceHandler: Send + 'static {
    /// The response preamble was accepted and events will follow.
    async fn on_connect(&mut self) -> HandlerResult {
        Ok(())
    }

    /// A complete event arrived.
    async fn on_message(&mut self, event_type: &str, event: MessageEvent) -> HandlerResult;

    /// Something went wrong. Connection failures are followed by a reconnect
    /// unless the source has been closed.
    async fn on_error(&mut self, error: EventSourceError);

    /// An open connection ended.
    async fn on_closed(&mut self, will_reconnect: bool) -> HandlerResult {
        let _ = will_reconnect;
        Ok(())
    }
}

/// Adapts a message-only closure into a full handler.
///
/// Errors are logged through `tracing`.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&str, MessageEvent) + Send + 'static,
{
    FnHandler { f }
}

/// Handler returned by [`handler_fn`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> EventSourceHandler for FnHandler<F>
where
    F: FnMut(&str, MessageEvent) + Send + 'static,
{
    async fn on_message(&mut self, event_type: &str, event: MessageEvent) -> HandlerResult {
        (self.f)(event_type, event);
        Ok(())
    }

    async fn on_error(&mut self, error: EventSourceError) {
        error!("Event source error: {}", error);
    }
}
