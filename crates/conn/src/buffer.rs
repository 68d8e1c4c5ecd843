//! The connection byte window.
//!
//! [`ByteWindow`] is the buffer primitive every component above it shares: a
//! fixed-capacity byte region with a read cursor (`pos`), a valid-data
//! boundary (`last_valid`) and a header/body boundary (`end`). It is allocated
//! once per connection at the configured header buffer size and reset between
//! requests on the same connection.
//!
//! Invariant: `0 <= pos <= last_valid <= capacity` at all times.
//!
//! The window never grows while the header region is being parsed; running out
//! of room there is a fatal `RequestHeaderTooLarge` condition enforced by the
//! caller. In the body phase the window is rewound to the front once drained
//! rather than reallocated, so parsed tokens (materialized as owned `Bytes`
//! when the request line completes) are never invalidated.

use bytes::{Bytes, BytesMut};

/// A fixed-capacity byte region with `pos`/`last_valid`/`end` cursors.
#[derive(Debug)]
pub struct ByteWindow {
    buf: BytesMut,
    pos: usize,
    last_valid: usize,
    end: usize,
}

impl ByteWindow {
    /// Creates a window with the given capacity, zero-filled so byte indexing
    /// is valid over the whole region.
    pub fn new(capacity: usize) -> Self {
        Self { buf: BytesMut::zeroed(capacity), pos: 0, last_valid: 0, end: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn last_valid(&self) -> usize {
        self.last_valid
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// Unread byte count (`last_valid - pos`).
    pub fn available(&self) -> usize {
        self.last_valid - self.pos
    }

    pub fn has_unread(&self) -> bool {
        self.pos < self.last_valid
    }

    /// Free room after the valid region.
    pub fn remaining_capacity(&self) -> usize {
        self.buf.len() - self.last_valid
    }

    pub fn is_full(&self) -> bool {
        self.last_valid == self.buf.len()
    }

    /// The byte under the read cursor, if any.
    pub fn peek(&self) -> Option<u8> {
        self.has_unread().then(|| self.buf[self.pos])
    }

    /// Advances the read cursor by one byte.
    pub fn advance(&mut self) {
        debug_assert!(self.pos < self.last_valid);
        self.pos += 1;
    }

    /// The still-unread slice (`pos..last_valid`).
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.pos..self.last_valid]
    }

    /// Copies a parsed token range out of the window as owned bytes.
    pub fn copy_out(&self, start: usize, end: usize) -> Bytes {
        debug_assert!(start <= end && end <= self.last_valid);
        Bytes::copy_from_slice(&self.buf[start..end])
    }

    /// Copies incoming bytes in after the valid region, returning how many
    /// fit. Never grows the backing region.
    pub fn append(&mut self, data: &[u8]) -> usize {
        let n = data.len().min(self.remaining_capacity());
        self.buf[self.last_valid..self.last_valid + n].copy_from_slice(&data[..n]);
        self.last_valid += n;
        n
    }

    /// Takes the whole unread region as owned bytes, consuming it.
    pub fn take_unread(&mut self) -> Bytes {
        let bytes = Bytes::copy_from_slice(&self.buf[self.pos..self.last_valid]);
        self.pos = self.last_valid;
        bytes
    }

    /// Marks the current read position as the header/body boundary.
    pub fn mark_header_end(&mut self) {
        self.end = self.pos;
    }

    /// Prepares the window for a body-phase refill: the cursors fall back to
    /// the header/body boundary, and a fully consumed window is rewound to the
    /// front instead of being reallocated.
    pub fn prepare_body(&mut self) {
        self.pos = self.end;
        self.last_valid = self.pos;
        if self.remaining_capacity() == 0 {
            self.end = 0;
            self.pos = 0;
            self.last_valid = 0;
        }
    }

    /// Resets all cursors for reuse on the next request.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.last_valid = 0;
        self.end = 0;
    }
}
