//! Request-line parsing over fill-on-demand input.
//!
//! Layering, bottom up:
//!
//! - [`flow_gate`]: the single-flight read permit plus completion slot
//! - [`request_line`]: the resumable request-line tokenizer
//! - [`input_buffer`]: the per-connection buffer driving the tokenizer and
//!   the channel fills, in blocking or non-blocking discipline
//!
//! The parser consumes exactly the request line and its terminator; header
//! and body bytes that arrived in the same fill stay buffered for whoever
//! reads next.

mod flow_gate;
mod input_buffer;
mod request_line;

pub use flow_gate::ReadFlowGate;
pub use input_buffer::{BodyFilter, InputBuffer, ResumeHook};
pub use request_line::{RequestLine, RequestLineScanner, Scan};
