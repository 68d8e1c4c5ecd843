//! The TLS engine seam.
//!
//! [`TlsEngine`] abstracts a sans-io record-protocol engine: it consumes and
//! produces raw bytes through `wrap` (encrypt-and-frame) and `unwrap`
//! (decrypt-and-unframe) and reports what the handshake needs next through
//! [`HandshakePhase`]. The session driver in [`super::TlsSession`] owns the
//! network buffers and the socket I/O; the engine never touches a socket.
//!
//! The production implementation is [`super::RustlsEngine`]. Tests drive the
//! session with deterministic engines, which is why every transition of the
//! handshake state machine is expressed through this trait rather than a
//! concrete TLS library type.

use bytes::Bytes;

use crate::error::TlsError;

/// What the engine needs next during a handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// The engine needs inbound network data to make progress.
    NeedUnwrap,
    /// The engine has outbound handshake records to emit.
    NeedWrap,
    /// The engine has delegated CPU-bound tasks to run.
    NeedTask,
    /// No handshake is in progress.
    NotHandshaking,
    /// The handshake just completed.
    Finished,
}

/// Outcome classification of a single wrap/unwrap call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Bytes were consumed and/or produced.
    Ok,
    /// Not enough inbound network data to decode a whole record.
    BufferUnderflow,
    /// The destination budget can't hold what the engine would produce.
    BufferOverflow,
    /// The engine is closed in this direction; no further transfer possible.
    Closed,
}

/// Result of one wrap or unwrap call.
#[derive(Debug)]
pub struct EngineResult {
    pub status: TransferStatus,
    /// The handshake phase reported alongside this result.
    pub phase: HandshakePhase,
    /// Bytes consumed from the source slice.
    pub consumed: usize,
    /// Bytes produced by the transform.
    pub data: Bytes,
}

impl EngineResult {
    pub fn new(status: TransferStatus, phase: HandshakePhase, consumed: usize, data: Bytes) -> Self {
        Self { status, phase, consumed, data }
    }

    /// A result that moved nothing.
    pub fn empty(status: TransferStatus, phase: HandshakePhase) -> Self {
        Self { status, phase, consumed: 0, data: Bytes::new() }
    }
}

/// A sans-io TLS record engine.
///
/// Contract notes:
/// - `wrap`/`unwrap` must not produce more than `room` bytes; when they
///   can't fit a whole record they return `BufferOverflow` and move nothing.
/// - `unwrap` returns `BufferUnderflow` when `src` does not hold a complete
///   record; the caller is expected to read more network data and retry.
/// - `run_delegated_tasks` executes every pending task synchronously; the
///   caller re-queries `handshake_phase` afterwards.
pub trait TlsEngine: Send {
    /// Signals the engine that a (re)handshake begins.
    fn begin_handshake(&mut self) -> Result<(), TlsError>;

    /// The phase the engine currently reports.
    fn handshake_phase(&self) -> HandshakePhase;

    /// Encrypts application bytes from `src` into at most `room` network bytes.
    fn wrap(&mut self, src: &[u8], room: usize) -> Result<EngineResult, TlsError>;

    /// Decrypts network bytes from `src` into at most `room` application bytes.
    fn unwrap(&mut self, src: &[u8], room: usize) -> Result<EngineResult, TlsError>;

    /// Runs every pending delegated task to completion, synchronously.
    fn run_delegated_tasks(&mut self);

    /// The negotiated record (packet) size the network buffers are sized from.
    fn record_size(&self) -> usize;

    /// Starts an orderly outbound close (queues the close-notify record).
    fn close_outbound(&mut self);

    /// Whether the outbound side is fully closed and flushed.
    fn is_outbound_done(&self) -> bool;

    /// Client-authentication negotiation flags, consulted on re-handshake.
    fn want_client_auth(&self) -> bool;

    fn need_client_auth(&self) -> bool;

    fn set_need_client_auth(&mut self, need: bool);
}
