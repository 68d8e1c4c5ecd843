//! Error types for the connection core.
//!
//! One enum per area, all deriving `std::error::Error` through `thiserror`:
//!
//! - [`ChannelError`]: channel level transfer failures (closed, timeout, TLS)
//! - [`TlsError`]: TLS handshake sequencing and record transform failures
//! - [`ParseError`]: request-line parsing and input buffer failures
//! - [`UpgradeError`]: websocket upgrade bridge failures
//! - [`ConnError`]: top-level error aggregating the above
//!
//! Error handling policy: transfer and parse errors are fatal for the current
//! request and propagate with `?`; teardown-path errors are logged by the
//! caller and swallowed, never re-thrown.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnError {
    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("parse error: {source}")]
    Parse {
        #[from]
        source: ParseError,
    },

    #[error("upgrade error: {source}")]
    Upgrade {
        #[from]
        source: UpgradeError,
    },
}

/// Channel-level failures observed by either side of a transfer.
///
/// Timeouts are distinguished from `ConnectionClosed`: a timed-out socket may
/// still be usable, a closed one never is.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection closed by peer or locally")]
    ConnectionClosed,

    #[error("read timed out after {millis}ms")]
    ReadTimeout { millis: u64 },

    #[error("write timed out after {millis}ms")]
    WriteTimeout { millis: u64 },

    #[error("tls handshake has not completed, application data transfer refused")]
    HandshakeIncomplete,

    #[error("tls error: {source}")]
    Tls {
        #[from]
        source: TlsError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn read_timeout(timeout: std::time::Duration) -> Self {
        Self::ReadTimeout { millis: timeout.as_millis() as u64 }
    }

    pub fn write_timeout(timeout: std::time::Duration) -> Self {
        Self::WriteTimeout { millis: timeout.as_millis() as u64 }
    }
}

/// TLS protocol-sequencing and record transform failures.
///
/// `EncodeOverflow` and `Protocol` indicate a buffer-sizing assumption was
/// violated after buffers were sized from negotiated session parameters, so
/// they are fatal and never retried.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("tls handshake failed: {reason}")]
    HandshakeFailed { reason: String },

    #[error("engine is not handshaking while a handshake is being driven")]
    NotHandshaking,

    #[error("encode overflow: network output buffer can't hold a wrapped record")]
    EncodeOverflow,

    #[error("tls protocol error: {reason}")]
    Protocol { reason: String },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl TlsError {
    pub fn handshake_failed<S: ToString>(reason: S) -> Self {
        Self::HandshakeFailed { reason: reason.to_string() }
    }

    pub fn protocol<S: ToString>(reason: S) -> Self {
        Self::Protocol { reason: reason.to_string() }
    }
}

/// Request-line parsing and input buffer failures.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unexpected eof while reading a request line")]
    UnexpectedEof,

    #[error("request header too large, buffer capacity {capacity} exhausted")]
    RequestHeaderTooLarge { capacity: usize },

    #[error("read timed out after {millis}ms with no data")]
    ReadTimeout { millis: u64 },

    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl ParseError {
    pub fn too_large_header(capacity: usize) -> Self {
        Self::RequestHeaderTooLarge { capacity }
    }

    pub fn read_timeout(timeout: std::time::Duration) -> Self {
        Self::ReadTimeout { millis: timeout.as_millis() as u64 }
    }
}

/// Upgrade bridge failures surfaced to the endpoint's error callback.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("frame protocol violation: {reason} (close code {code})")]
    FrameProtocol { code: u16, reason: String },

    #[error("end of stream on upgraded connection")]
    Eof,

    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}
