//! TLS record-protocol layer.
//!
//! This module hosts the security half of the channel abstraction:
//!
//! - [`TlsEngine`]: the sans-io engine seam ([`engine`])
//! - [`TlsSession`]: the handshake state machine and the steady-state
//!   wrap/unwrap transforms ([`session`])
//! - [`RustlsEngine`]: the production engine over `rustls`
//!
//! # Handshake state machine
//!
//! The session drives the engine through `{NeedUnwrap, NeedWrap, NeedTask,
//! NotHandshaking, Finished}` until the completion flag is set. Each phase is
//! handled by a dedicated step function; `NotHandshaking` during an active
//! handshake is a sequencing violation and fails the channel. No application
//! data crosses the session boundary while the handshake is incomplete.

mod engine;
mod rustls_engine;
mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{EngineResult, HandshakePhase, TlsEngine, TransferStatus};
pub use rustls_engine::RustlsEngine;
pub use session::{AppTransfer, TlsSession, MIN_BUFFER_SIZE};
