//! Protocol upgrade bridging.
//!
//! After a successful HTTP upgrade exchange the connection stops being HTTP:
//! [`UpgradeBridge`] reattaches its raw byte stream to a frame decoder and a
//! pending-write flusher, and drives the application [`Endpoint`] through
//! the open/error/close lifecycle. Frame decoding and encoding themselves
//! live behind the [`FrameHandler`] and [`FrameWriter`] seams.

mod bridge;
mod session;

pub use bridge::{BridgeState, FrameHandler, FrameWriter, UpgradeBridge};
pub use session::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR, CloseReason, Endpoint, HandshakeRequest,
    UpgradeSession,
};
