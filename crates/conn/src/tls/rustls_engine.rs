//! `rustls` adapter for the [`TlsEngine`] seam.
//!
//! `rustls::ServerConnection` is already a sans-io engine: `read_tls` feeds
//! network bytes in, `process_new_packets` runs the protocol, `reader`/
//! `writer` move plaintext and `write_tls` drains the records to send. This
//! adapter maps that surface onto the wrap/unwrap contract the session driver
//! expects.
//!
//! Differences from the generic contract, by construction of rustls:
//! - Delegated tasks never occur; crypto runs inline, so `NeedTask` is never
//!   reported.
//! - Client authentication is fixed by the `ServerConfig` used to build the
//!   connection; it cannot be escalated mid-session, so `set_need_client_auth`
//!   only logs.

use std::io::{Read, Write};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use rustls::{ServerConfig, ServerConnection};
use tracing::warn;

use crate::error::TlsError;
use crate::tls::{EngineResult, HandshakePhase, TlsEngine, TransferStatus};

/// A TLS 1.2/1.3 record is at most 16KB of payload plus per-record overhead.
const TLS_RECORD_SIZE: usize = 18 * 1024;

/// [`TlsEngine`] implementation over a `rustls` server connection.
pub struct RustlsEngine {
    conn: ServerConnection,
    close_notify_queued: bool,
}

impl std::fmt::Debug for RustlsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RustlsEngine").field("handshaking", &self.conn.is_handshaking()).finish()
    }
}

impl RustlsEngine {
    pub fn new(config: Arc<ServerConfig>) -> Result<Self, TlsError> {
        let conn = ServerConnection::new(config).map_err(|e| TlsError::handshake_failed(e.to_string()))?;
        Ok(Self { conn, close_notify_queued: false })
    }

    /// Drains pending records out of the connection into an owned buffer.
    fn drain_records(&mut self) -> Result<Bytes, TlsError> {
        let mut out = Vec::new();
        while self.conn.wants_write() {
            self.conn.write_tls(&mut out)?;
        }
        Ok(out.into())
    }
}

impl TlsEngine for RustlsEngine {
    fn begin_handshake(&mut self) -> Result<(), TlsError> {
        // rustls begins handshaking implicitly on construction
        Ok(())
    }

    fn handshake_phase(&self) -> HandshakePhase {
        if self.conn.is_handshaking() {
            if self.conn.wants_write() { HandshakePhase::NeedWrap } else { HandshakePhase::NeedUnwrap }
        } else {
            HandshakePhase::Finished
        }
    }

    fn wrap(&mut self, src: &[u8], _room: usize) -> Result<EngineResult, TlsError> {
        if self.close_notify_queued && !self.conn.wants_write() {
            return Ok(EngineResult::empty(TransferStatus::Closed, self.handshake_phase()));
        }

        let consumed = if src.is_empty() {
            0
        } else {
            self.conn.writer().write(src).map_err(|e| TlsError::protocol(e.to_string()))?
        };

        // the session flushes its output buffer fully before every wrap call,
        // so emitting whole pending flights here never piles up
        let data = self.drain_records()?;
        Ok(EngineResult::new(TransferStatus::Ok, self.handshake_phase(), consumed, data))
    }

    fn unwrap(&mut self, src: &[u8], room: usize) -> Result<EngineResult, TlsError> {
        let mut cursor = src;
        let consumed = self.conn.read_tls(&mut cursor)?;

        let state = self.conn.process_new_packets().map_err(|e| TlsError::protocol(e.to_string()))?;

        let mut data = BytesMut::new();
        let mut want = state.plaintext_bytes_to_read().min(room);
        while want > 0 {
            let start = data.len();
            data.resize(start + want, 0);
            match self.conn.reader().read(&mut data[start..]) {
                Ok(n) => {
                    data.truncate(start + n);
                    if n == 0 {
                        break;
                    }
                    want -= n;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    data.truncate(start);
                    break;
                }
                Err(e) => return Err(TlsError::protocol(e.to_string())),
            }
        }

        let status = if state.peer_has_closed() && data.is_empty() {
            TransferStatus::Closed
        } else if state.plaintext_bytes_to_read() > room && room > 0 && data.is_empty() {
            TransferStatus::BufferOverflow
        } else if consumed == 0 && data.is_empty() {
            TransferStatus::BufferUnderflow
        } else {
            TransferStatus::Ok
        };

        Ok(EngineResult::new(status, self.handshake_phase(), consumed, data.freeze()))
    }

    fn run_delegated_tasks(&mut self) {
        // rustls runs all crypto inline, there is never a pending task
    }

    fn record_size(&self) -> usize {
        TLS_RECORD_SIZE
    }

    fn close_outbound(&mut self) {
        if !self.close_notify_queued {
            self.conn.send_close_notify();
            self.close_notify_queued = true;
        }
    }

    fn is_outbound_done(&self) -> bool {
        self.close_notify_queued && !self.conn.wants_write()
    }

    fn want_client_auth(&self) -> bool {
        false
    }

    fn need_client_auth(&self) -> bool {
        false
    }

    fn set_need_client_auth(&mut self, _need: bool) {
        warn!("client auth is fixed by the server config, rehandshake escalation ignored");
    }
}
