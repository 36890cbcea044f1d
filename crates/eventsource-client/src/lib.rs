//! # eventsource-client
//!
//! A Server-Sent Events client: it opens a long-lived HTTP connection,
//! validates the response preamble, parses the `text/event-stream` grammar
//! incrementally and delivers events to an [`EventSourceHandler`] in order,
//! reconnecting on failure with `Last-Event-ID` replay and a
//! server-adjustable retry delay.
//!
//! ## Overview
//!
//! - **Connection manager**: [`EventSource`], built with [`EventSourceBuilder`]
//! - **Callbacks**: [`EventSourceHandler`], [`handler_fn`]
//! - **Events**: [`MessageEvent`]
//! - **Protocol pieces**: [`EventStreamParser`], [`PreambleValidator`]
//! - **State**: [`ConnectionState`]
//! - **Errors**: [`EventSourceError`], [`ProtocolError`], [`HandlerError`]
//!
//! Sockets are provided by a [`LineTransport`](eventsource_transport::LineTransport);
//! plain TCP is used unless another transport is passed to the builder.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use eventsource_client::{
//!     EventSource, EventSourceError, EventSourceHandler, HandlerResult, MessageEvent,
//! };
//!
//! #[derive(Debug)]
//! struct Logger;
//!
//! #[async_trait]
//! impl EventSourceHandler for Logger {
//!     async fn on_connect(&mut self) -> HandlerResult {
//!         println!("connected");
//!         Ok(())
//!     }
//!
//!     async fn on_message(&mut self, event_type: &str, event: MessageEvent) -> HandlerResult {
//!         println!("{event_type} {:?}: {}", event.last_event_id(), event.data());
//!         Ok(())
//!     }
//!
//!     async fn on_error(&mut self, error: EventSourceError) {
//!         eprintln!("{error}");
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = EventSource::builder("http://localhost:8080/events")
//!         .reconnect_delay(Duration::from_secs(1))
//!         .header("Authorization", "Bearer token")
//!         .build(Logger)?;
//!
//!     source.connect()?;
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     source.shutdown(Duration::from_secs(1)).await;
//!     Ok(())
//! }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    clippy::all
)]
#![deny(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::must_use_candidate
)]

mod config;
mod dispatcher;
mod error;
mod event;
mod handler;
mod parser;
mod preamble;
mod request;
mod source;
mod state;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DISPATCH_CAPACITY, DEFAULT_RECONNECT_DELAY,
    EventSourceBuilder, EventSourceConfig,
};
pub use error::{EventSourceError, EventSourceResult, HandlerError, HandlerResult, ProtocolError};
pub use event::{DEFAULT_EVENT_TYPE, MessageEvent};
pub use handler::{EventSourceHandler, FnHandler, handler_fn};
pub use parser::{EventStreamParser, ParserOutput};
pub use preamble::{PreambleStatus, PreambleValidator};
pub use source::{ConnectHandle, EventSource};
pub use state::ConnectionState;

/// Re-exported transport layer.
pub use eventsource_transport as transport;
