//! Asynchronous connection-level I/O for an HTTP server
//!
//! This crate is the layer that turns a raw asynchronous byte stream into a
//! stream of parsed HTTP request lines, optionally wrapped in a TLS record
//! tunnel, and optionally handed off to a framed protocol after an HTTP
//! upgrade. It sits below header parsing and above the socket.
//!
//! # Features
//!
//! - Plain and TLS-secured channels behind one [`channel::Channel`] type
//! - A TLS handshake engine driven as an explicit state machine, with a
//!   production adapter over rustls
//! - Fill-on-demand request-line parsing over a fixed-capacity byte window
//! - Blocking and non-blocking read disciplines, with single-flight
//!   enforcement for dispatched reads
//! - A WebSocket-style upgrade bridge reattaching the byte stream to a
//!   frame-oriented listener pair
//!
//!
//! # Example
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use tracing::{error, info, warn, Level};
//! use tracing_subscriber::FmtSubscriber;
//! use micro_conn::channel::ChannelFactory;
//! use micro_conn::config::ConnConfig;
//! use micro_conn::parser::InputBuffer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subscriber = FmtSubscriber::builder()
//!         .with_max_level(Level::INFO)
//!         .finish();
//!     tracing::subscriber::set_global_default(subscriber)
//!         .expect("setting default subscriber failed");
//!
//!     info!(port = 8080, "start listening");
//!     let tcp_listener = match TcpListener::bind("127.0.0.1:8080").await {
//!         Ok(tcp_listener) => tcp_listener,
//!         Err(e) => {
//!             error!(cause = %e, "bind server error");
//!             return;
//!         }
//!     };
//!
//!     let factory = ChannelFactory::new(ConnConfig::new());
//!
//!     loop {
//!         let (tcp_stream, _remote_addr) = match tcp_listener.accept().await {
//!             Ok(stream_and_addr) => stream_and_addr,
//!             Err(e) => {
//!                 warn!(cause = %e, "failed to accept");
//!                 continue;
//!             }
//!         };
//!
//!         let factory = factory.clone();
//!
//!         tokio::spawn(async move {
//!             let config = factory.config().clone();
//!             let channel = match factory.channel(tcp_stream) {
//!                 Ok(channel) => channel,
//!                 Err(e) => {
//!                     error!(cause = %e, "failed to build channel");
//!                     return;
//!                 }
//!             };
//!             let mut input = InputBuffer::new(channel, &config);
//!             match input.parse_request_line(false).await {
//!                 Ok(Some(line)) => {
//!                     info!(method = ?line.method(), uri = ?line.uri(), "parsed request line");
//!                 }
//!                 Ok(None) => {}
//!                 Err(e) => {
//!                     error!(cause = %e, "request line parse failed");
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```
//!
//!
//! # Architecture
//!
//! The crate is organized into several key modules:
//!
//! - [`channel`]: The asynchronous channel over a socket-like transport and
//!   its cloneable factory
//! - [`tls`]: The handshake engine abstraction, the session state machine
//!   driving it, and the rustls adapter
//! - [`parser`]: The request-line tokenizer, the fill-on-demand input buffer
//!   and the single-flight read gate
//! - [`upgrade`]: The post-upgrade bridge to a framed protocol
//! - [`buffer`]: The shared fixed-capacity byte window
//!
//! Data flow: socket bytes → [`channel::Channel`] (optionally TLS-unwrapped)
//! → [`parser::InputBuffer`] fills its window → request-line tokens are
//! emitted → body reads continue through the same path, or an upgrade occurs
//! and bytes instead flow through [`upgrade::UpgradeBridge`] into a frame
//! decoder.
//!
//! # Concurrency
//!
//! Each connection is single-writer: the [`parser::ReadFlowGate`] guarantees
//! at most one asynchronous read is in flight per connection, so the byte
//! window is never filled concurrently. Blocking operations suspend the
//! calling task under a timeout; non-blocking parsing never waits and hands
//! resumption to the read task's completion.
//!
//! # Error Handling
//!
//! The crate uses custom error types that implement `std::error::Error`:
//!
//! - [`error::ConnError`]: Top-level error type
//! - [`error::ChannelError`]: Channel transfer errors
//! - [`error::TlsError`]: Handshake and record transform errors
//! - [`error::ParseError`]: Request-line parsing errors
//! - [`error::UpgradeError`]: Upgrade bridge errors
//!
//! Timeouts are distinguished from connection closure throughout: a timed
//! out socket may still be usable, a closed one never is.
//!
//! # Limitations
//!
//! - Request-line tokenization only; header fields, chunked transfer
//!   decoding and keep-alive pooling policy live in the layers above
//! - Frame decoding/encoding for upgraded connections is delegated through
//!   the [`upgrade::FrameHandler`] / [`upgrade::FrameWriter`] seams
//! - The header buffer never grows; an oversized request line is fatal for
//!   the connection

pub mod buffer;
pub mod channel;
pub mod config;
pub mod error;
pub mod parser;
pub mod tls;
pub mod upgrade;

mod utils;
pub(crate) use utils::ensure;
