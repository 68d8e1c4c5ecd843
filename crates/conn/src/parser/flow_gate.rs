//! Single-flight read gating.
//!
//! [`ReadFlowGate`] is a binary permit enforcing that at most one
//! asynchronous read is outstanding per connection: the shared byte window is
//! not safe for concurrent fill, and the permit is the mechanism that keeps
//! the parsing task and the completion side from ever touching it at the same
//! time.
//!
//! Invariant: exactly one of {permit free, permit held by an in-flight read}.
//! [`ReadFlowGate::complete`] is the only legal transition that resumes the
//! parser: it deposits the read result into the completion slot and returns
//! the permit.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::ChannelError;

struct GateInner {
    permit: Semaphore,
    slot: Mutex<Option<Result<Bytes, ChannelError>>>,
}

/// A single-slot gate pairing a binary permit with a completion slot.
#[derive(Clone)]
pub struct ReadFlowGate {
    inner: Arc<GateInner>,
}

impl std::fmt::Debug for ReadFlowGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadFlowGate").field("in_flight", &self.in_flight()).finish()
    }
}

impl Default for ReadFlowGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadFlowGate {
    pub fn new() -> Self {
        Self { inner: Arc::new(GateInner { permit: Semaphore::new(1), slot: Mutex::new(None) }) }
    }

    /// Non-blocking attempt to become the sole in-flight reader.
    pub fn try_acquire(&self) -> bool {
        match self.inner.permit.try_acquire() {
            Ok(permit) => {
                // held until `complete` returns it
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Autoblock fallback: waits up to `wait` for the in-flight read to
    /// resolve. The permit is released again immediately, its only purpose
    /// here is the wait itself.
    pub async fn acquire_timeout(&self, wait: Duration) -> bool {
        match timeout(wait, self.inner.permit.acquire()).await {
            Ok(Ok(_permit)) => true,
            _ => false,
        }
    }

    /// Deposits the result of the in-flight read and returns the permit,
    /// waking any autoblocked waiter. Called from the completion side on both
    /// the success and the failure path.
    pub fn complete(&self, result: Result<Bytes, ChannelError>) {
        *self.inner.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
        self.inner.permit.add_permits(1);
    }

    /// Takes the deposited read result, if one is waiting.
    pub fn take_completed(&self) -> Option<Result<Bytes, ChannelError>> {
        self.inner.slot.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    /// Whether a read currently holds the permit.
    pub fn in_flight(&self) -> bool {
        self.inner.permit.available_permits() == 0
    }

    /// Recycle-time reset: restores the permit when it is absent. Only sound
    /// between requests, when no read can be in flight.
    pub fn release_stale(&self) {
        if self.inner.permit.available_permits() == 0 {
            self.inner.permit.add_permits(1);
        }
    }
}
