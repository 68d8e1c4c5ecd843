//! Asynchronous channel handling module.
//!
//! This module provides the channel abstraction the rest of the core reads
//! and writes through:
//!
//! - [`Channel`]: tagged union over the plain and TLS-secured transports,
//!   offering timed reads/writes and idempotent close
//! - [`ChannelFactory`]: clone-per-use construction of either variant from a
//!   `secure` flag and an optional TLS server config
//!
//! # Features
//!
//! - Blocking-with-timeout reads and writes over any `AsyncRead + AsyncWrite`
//!   transport
//! - TLS handshake gating: application data never crosses an incomplete
//!   handshake
//! - Orderly TLS close (close-notify before transport shutdown)
//! - Timeout failures kept distinct from connection-closed failures

mod async_channel;
mod factory;

pub use async_channel::Channel;
pub use factory::ChannelFactory;
