//! # eventsource-transport
//!
//! Line-oriented transport layer for the `eventsource-client` SSE engine.
//!
//! The engine never touches sockets directly. It asks a [`LineTransport`] for a
//! connection to an [`Endpoint`], writes the HTTP request through the returned
//! [`LineConnection`], and then pulls decoded text lines until the stream ends.
//!
//! ## Overview
//!
//! This crate defines:
//! - **Traits**: [`LineTransport`], [`LineConnection`]
//! - **Types**: [`Endpoint`]
//! - **Errors**: [`TransportError`], [`TransportResult`]
//! - **Config**: [`TcpConfig`]
//! - **Metrics**: [`TransportMetrics`], [`AtomicMetrics`]
//! - **Implementation**: [`TcpLineTransport`], built with [`TcpLineTransportBuilder`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use eventsource_transport::{Endpoint, LineTransport, TcpLineTransportBuilder};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = TcpLineTransportBuilder::new()
//!         .connect_timeout(Duration::from_secs(5))
//!         .build();
//!
//!     let endpoint = Endpoint::new("localhost", 8080, false);
//!     let mut connection = transport.connect(&endpoint).await?;
//!     connection.write("GET /events HTTP/1.1\r\nHost: localhost\r\n\r\n").await?;
//!
//!     while let Some(line) = connection.next_line().await? {
//!         println!("{line}");
//!     }
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
mod error;
mod metrics;
mod tcp;
mod traits;
mod types;

pub use config::TcpConfig;
pub use error::{TransportError, TransportResult};
pub use metrics::{AtomicMetrics, TransportMetrics};
pub use tcp::{TcpLineTransport, TcpLineTransportBuilder};
pub use traits::{LineConnection, LineTransport};
pub use types::Endpoint;
