//! Deterministic engines for exercising the session driver and the secure
//! channel without real cryptography.

use bytes::Bytes;

use crate::error::TlsError;
use crate::tls::{EngineResult, HandshakePhase, TlsEngine, TransferStatus};

/// The close-notify record emitted by [`FrameEngine`].
pub(crate) const CLOSE_RECORD: &[u8] = b"\x00\x02CN";

/// A paired-engine cipher: records are `[len_hi, len_lo, payload...]`,
/// payload passed through unchanged. Handshakes complete immediately.
pub(crate) struct FrameEngine {
    outbound_closed: bool,
    close_sent: bool,
    /// When set, the next wrap reports overflow once (forces budget grow).
    pub(crate) overflow_once: bool,
}

impl FrameEngine {
    pub(crate) fn new() -> Self {
        Self { outbound_closed: false, close_sent: false, overflow_once: false }
    }
}

impl TlsEngine for FrameEngine {
    fn begin_handshake(&mut self) -> Result<(), TlsError> {
        Ok(())
    }

    fn handshake_phase(&self) -> HandshakePhase {
        HandshakePhase::Finished
    }

    fn wrap(&mut self, src: &[u8], room: usize) -> Result<EngineResult, TlsError> {
        if self.overflow_once {
            self.overflow_once = false;
            return Ok(EngineResult::empty(TransferStatus::BufferOverflow, HandshakePhase::Finished));
        }
        if self.outbound_closed {
            if self.close_sent {
                return Ok(EngineResult::empty(TransferStatus::Closed, HandshakePhase::Finished));
            }
            self.close_sent = true;
            return Ok(EngineResult::new(TransferStatus::Ok, HandshakePhase::Finished, 0, Bytes::from_static(CLOSE_RECORD)));
        }
        if src.len() + 2 > room {
            return Ok(EngineResult::empty(TransferStatus::BufferOverflow, HandshakePhase::Finished));
        }
        let mut record = Vec::with_capacity(src.len() + 2);
        record.extend_from_slice(&(src.len() as u16).to_be_bytes());
        record.extend_from_slice(src);
        Ok(EngineResult::new(TransferStatus::Ok, HandshakePhase::Finished, src.len(), record.into()))
    }

    fn unwrap(&mut self, src: &[u8], room: usize) -> Result<EngineResult, TlsError> {
        if src.len() < 2 {
            return Ok(EngineResult::empty(TransferStatus::BufferUnderflow, HandshakePhase::Finished));
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if src.len() < 2 + len {
            return Ok(EngineResult::empty(TransferStatus::BufferUnderflow, HandshakePhase::Finished));
        }
        if len > room {
            return Ok(EngineResult::empty(TransferStatus::BufferOverflow, HandshakePhase::Finished));
        }
        let payload = Bytes::copy_from_slice(&src[2..2 + len]);
        if &payload[..] == b"CN" {
            return Ok(EngineResult::new(TransferStatus::Closed, HandshakePhase::Finished, 2 + len, Bytes::new()));
        }
        Ok(EngineResult::new(TransferStatus::Ok, HandshakePhase::Finished, 2 + len, payload))
    }

    fn run_delegated_tasks(&mut self) {}

    fn record_size(&self) -> usize {
        1024
    }

    fn close_outbound(&mut self) {
        self.outbound_closed = true;
    }

    fn is_outbound_done(&self) -> bool {
        self.outbound_closed && self.close_sent
    }

    fn want_client_auth(&self) -> bool {
        false
    }

    fn need_client_auth(&self) -> bool {
        false
    }

    fn set_need_client_auth(&mut self, _need: bool) {}
}
