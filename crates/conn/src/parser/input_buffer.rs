//! Fill-on-demand request input.
//!
//! [`InputBuffer`] owns the per-connection [`ByteWindow`] and drives the
//! request-line scanner over it, pulling bytes from the shared [`Channel`]
//! only when the scanner runs dry. Two fill disciplines exist:
//!
//! - **blocking**: the fill awaits the channel read directly, bounded by the
//!   channel's read timeout.
//! - **non-blocking**: the fill acquires the [`ReadFlowGate`], spawns a
//!   detached read task, and returns immediately; the task deposits its
//!   result through the gate and fires the registered [`ResumeHook`]. A
//!   caller that cannot make progress without data autoblocks on the gate
//!   instead of spinning.
//!
//! The gate guarantees at most one read is in flight per connection, so the
//! window is only ever appended to by whoever drained the completion slot.
//!
//! After the headers are finished the window switches to the body phase:
//! refills rewind the drained window to the front rather than growing it, and
//! body chunks pass through the registered [`BodyFilter`] chain.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::buffer::ByteWindow;
use crate::channel::Channel;
use crate::config::ConnConfig;
use crate::ensure;
use crate::error::{ChannelError, ParseError};
use crate::parser::flow_gate::ReadFlowGate;
use crate::parser::request_line::{RequestLine, RequestLineScanner, Scan};

/// Callback fired by the detached read task once its result has been
/// deposited, so a dispatcher can re-poll the connection.
pub trait ResumeHook: Send + Sync {
    fn resume(&self);
}

/// A transform applied to every body chunk handed out by
/// [`InputBuffer::read_body`], in registration order.
pub trait BodyFilter: Send {
    fn filter(&mut self, chunk: Bytes) -> Result<Bytes, ParseError>;
}

/// Outcome of one fill attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillResult {
    /// That many fresh bytes landed in the window.
    Bytes(usize),
    /// The peer closed; no further bytes will arrive.
    Eof,
    /// No bytes are available right now (a read may be in flight).
    WouldBlock,
}

/// The per-connection request input buffer.
pub struct InputBuffer<S> {
    window: ByteWindow,
    channel: Arc<Mutex<Channel<S>>>,
    gate: ReadFlowGate,
    read_timeout: Duration,
    non_blocking: bool,
    use_available: bool,
    parsing_header: bool,
    filters: Vec<Box<dyn BodyFilter>>,
    resume: Option<Arc<dyn ResumeHook>>,
}

impl<S> std::fmt::Debug for InputBuffer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputBuffer")
            .field("window", &self.window)
            .field("non_blocking", &self.non_blocking)
            .field("parsing_header", &self.parsing_header)
            .finish()
    }
}

impl<S> InputBuffer<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(channel: Channel<S>, config: &ConnConfig) -> Self {
        Self::from_shared(Arc::new(Mutex::new(channel)), config)
    }

    /// Builds over an already shared channel, for callers that keep their own
    /// handle to it (the upgrade bridge does).
    pub fn from_shared(channel: Arc<Mutex<Channel<S>>>, config: &ConnConfig) -> Self {
        Self {
            window: ByteWindow::new(config.header_buffer_size()),
            channel,
            gate: ReadFlowGate::new(),
            read_timeout: config.read_timeout(),
            non_blocking: false,
            use_available: false,
            parsing_header: true,
            filters: Vec::new(),
            resume: None,
        }
    }

    /// A shared handle to the underlying channel.
    pub fn channel(&self) -> Arc<Mutex<Channel<S>>> {
        Arc::clone(&self.channel)
    }

    pub fn set_non_blocking(&mut self, non_blocking: bool) {
        self.non_blocking = non_blocking;
    }

    pub fn is_non_blocking(&self) -> bool {
        self.non_blocking
    }

    pub fn set_resume_hook(&mut self, hook: Arc<dyn ResumeHook>) {
        self.resume = Some(hook);
    }

    /// Flow-control switch: while set, fills never autoblock and hand back
    /// only bytes that are already buffered or already in flight.
    pub fn set_use_available(&mut self) {
        self.use_available = true;
    }

    /// Whether unread bytes are buffered right now.
    pub fn available(&self) -> bool {
        self.window.has_unread()
    }

    pub fn add_body_filter(&mut self, filter: Box<dyn BodyFilter>) {
        self.filters.push(filter);
    }

    /// Parses the next request line, filling from the channel on demand.
    ///
    /// With `use_available_data` set the call never waits: it returns
    /// `Ok(None)` when no buffered data is present before any byte of the
    /// line has been consumed. Otherwise the call resolves to a full line,
    /// `UnexpectedEof` on end-of-stream mid-line, or a timeout error.
    pub async fn parse_request_line(
        &mut self,
        use_available_data: bool,
    ) -> Result<Option<RequestLine>, ParseError> {
        debug_assert!(self.parsing_header);
        if use_available_data && !self.window.has_unread() {
            return Ok(None);
        }

        let mut scanner = RequestLineScanner::new();
        loop {
            if scanner.step(&mut self.window) == Scan::Complete {
                let line = scanner.finish(&self.window);
                trace!(method = ?line.method(), uri = ?line.uri(), "parsed request line");
                return Ok(Some(line));
            }

            match self.fill().await? {
                FillResult::Bytes(_) => {}
                FillResult::Eof => return Err(ParseError::UnexpectedEof),
                FillResult::WouldBlock => {
                    if use_available_data && !scanner.started() && !self.window.has_unread() {
                        return Ok(None);
                    }
                    // nothing new; the next pass autoblocks on the gate
                }
            }
        }
    }

    /// Ends the header phase: the current read position becomes the
    /// header/body boundary and subsequent fills refill the body region.
    pub fn finish_headers(&mut self) {
        self.window.mark_header_end();
        self.parsing_header = false;
    }

    /// Reads one body chunk through the filter chain.
    ///
    /// Returns `Ok(None)` at end-of-stream, and an empty chunk when no data
    /// is available without waiting (non-blocking mode with a read pending).
    pub async fn read_body(&mut self) -> Result<Option<Bytes>, ParseError> {
        debug_assert!(!self.parsing_header);
        if !self.window.has_unread() {
            match self.fill().await? {
                FillResult::Bytes(n) if n > 0 => {}
                FillResult::Bytes(_) | FillResult::WouldBlock => return Ok(Some(Bytes::new())),
                FillResult::Eof => return Ok(None),
            }
        }

        let mut chunk = self.window.take_unread();
        for filter in &mut self.filters {
            chunk = filter.filter(chunk)?;
        }
        Ok(Some(chunk))
    }

    /// Resets the buffer for the next request on the same connection.
    ///
    /// Any bytes still buffered belong to a previous request and are
    /// discarded. A permit lost to an abandoned non-blocking read is restored
    /// so the next request starts with the gate free.
    pub fn next_request(&mut self) {
        self.window.reset();
        self.parsing_header = true;
        self.use_available = false;
        if self.non_blocking {
            self.gate.release_stale();
        }
        self.non_blocking = false;
    }

    /// Full reset before the connection is returned to a pool: as
    /// [`next_request`](Self::next_request), plus the filter chain and any
    /// stale completion are dropped.
    pub fn recycle(&mut self) {
        self.next_request();
        self.filters.clear();
        drop(self.gate.take_completed());
    }

    async fn fill(&mut self) -> Result<FillResult, ParseError> {
        if self.non_blocking { self.fill_gated().await } else { self.fill_direct().await }
    }

    /// Blocking-discipline fill: awaits the channel read inline.
    async fn fill_direct(&mut self) -> Result<FillResult, ParseError> {
        self.prepare()?;
        let room = self.window.remaining_capacity();
        let mut transfer = BytesMut::with_capacity(room);
        let result =
            { self.channel.lock().await.read_bytes(&mut transfer, room).await };
        match result {
            Ok(n) => {
                self.window.append(&transfer);
                trace!(bytes = n, "filled input window");
                Ok(FillResult::Bytes(n))
            }
            Err(ChannelError::ConnectionClosed) => Ok(FillResult::Eof),
            Err(ChannelError::ReadTimeout { millis }) => Err(ParseError::ReadTimeout { millis }),
            Err(e) => Err(e.into()),
        }
    }

    /// Non-blocking-discipline fill: drains a completed read if one is
    /// waiting, otherwise either dispatches a new read under the gate or
    /// autoblocks on the one in flight.
    async fn fill_gated(&mut self) -> Result<FillResult, ParseError> {
        if let Some(result) = self.drain_completed()? {
            return Ok(result);
        }

        if self.gate.try_acquire() {
            if let Err(e) = self.prepare() {
                self.gate.release_stale();
                return Err(e);
            }
            self.dispatch_read(self.window.remaining_capacity());
            return Ok(FillResult::WouldBlock);
        }

        if self.use_available {
            return Ok(FillResult::WouldBlock);
        }

        // autoblock: a read is in flight and the caller needs its outcome
        if !self.gate.acquire_timeout(self.read_timeout).await {
            return Err(ParseError::read_timeout(self.read_timeout));
        }
        match self.drain_completed()? {
            Some(result) => Ok(result),
            None => Ok(FillResult::WouldBlock),
        }
    }

    /// Harvests the deposit of a finished read task into the window.
    fn drain_completed(&mut self) -> Result<Option<FillResult>, ParseError> {
        match self.gate.take_completed() {
            None => Ok(None),
            Some(Ok(data)) => {
                if data.is_empty() {
                    return Ok(Some(FillResult::Bytes(0)));
                }
                let copied = self.window.append(&data);
                ensure!(copied == data.len(), ParseError::too_large_header(self.window.capacity()));
                trace!(bytes = copied, "drained completed read");
                Ok(Some(FillResult::Bytes(copied)))
            }
            Some(Err(ChannelError::ConnectionClosed)) => Ok(Some(FillResult::Eof)),
            Some(Err(ChannelError::ReadTimeout { millis })) => {
                Err(ParseError::ReadTimeout { millis })
            }
            Some(Err(e)) => Err(e.into()),
        }
    }

    /// Spawns the single in-flight read. The caller must hold the gate
    /// permit; the task returns it through [`ReadFlowGate::complete`].
    fn dispatch_read(&self, room: usize) {
        let channel = Arc::clone(&self.channel);
        let gate = self.gate.clone();
        let resume = self.resume.clone();
        tokio::spawn(async move {
            let mut transfer = BytesMut::with_capacity(room);
            let result = { channel.lock().await.read_bytes(&mut transfer, room).await };
            match result {
                Ok(n) => {
                    trace!(bytes = n, "read task completed");
                    gate.complete(Ok(transfer.freeze()));
                }
                Err(e) => {
                    debug!(error = %e, "read task failed");
                    gate.complete(Err(e));
                }
            }
            if let Some(hook) = resume {
                hook.resume();
            }
        });
    }

    /// Makes room for a fill in the current phase. In the header phase a full
    /// window is fatal; in the body phase the drained window is rewound.
    fn prepare(&mut self) -> Result<(), ParseError> {
        if self.parsing_header {
            ensure!(!self.window.is_full(), ParseError::too_large_header(self.window.capacity()));
        } else {
            self.window.prepare_body();
        }
        Ok(())
    }
}
