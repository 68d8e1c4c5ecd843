//! The upgrade bridge state machine.
//!
//! [`UpgradeBridge`] repurposes an already-accepted connection's byte stream
//! for a frame-oriented protocol after the HTTP upgrade exchange has
//! succeeded. Its life is a one-way walk through
//! `Initialized → Open → Closing → Closed`:
//!
//! - `open` attaches the frame decoder and the pending-write flusher as the
//!   read/write listeners and fires the endpoint's `on_open`.
//! - read availability pumps raw bytes into the frame decoder until it has
//!   consumed every complete frame; how the decode fails decides the close
//!   reason (protocol violation carries its own code, end-of-stream and
//!   other I/O failures close abnormally).
//! - `destroy` closes the underlying channel exactly once; failures on that
//!   path are logged and swallowed, shutdown must not fail.
//!
//! Once any failure puts the bridge into `Closing` the connection is not
//! recoverable: the close frame is a courtesy, the socket close right after
//! it is the guarantee.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::channel::Channel;
use crate::error::{ChannelError, UpgradeError};
use crate::upgrade::session::{CloseReason, Endpoint, HandshakeRequest, UpgradeSession};

/// How many raw bytes one read-availability pass pulls at most.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Consumes raw bytes and decodes frames out of them. Decoding every
/// complete frame available is the implementor's job; a leftover partial
/// frame must be kept across calls.
pub trait FrameHandler: Send {
    fn on_data(&mut self, data: Bytes) -> Result<(), UpgradeError>;
}

/// The outbound side: flushes pending frame writes and emits close frames.
pub trait FrameWriter: Send {
    /// The transport can take more bytes. Already invoked on an acceptable
    /// task, so implementations run inline without re-dispatch.
    fn on_write_possible(&mut self);

    /// Best effort: queue a close frame for the peer. The socket is closed
    /// right after regardless of the outcome.
    fn send_close(&mut self, reason: &CloseReason);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Initialized,
    Open,
    Closing,
    Closed,
}

/// Bridges an upgraded connection to a frame handler/writer pair.
pub struct UpgradeBridge<S> {
    state: BridgeState,
    session: UpgradeSession,
    endpoint: Arc<dyn Endpoint>,
    channel: Arc<Mutex<Channel<S>>>,
    handler: Option<Box<dyn FrameHandler>>,
    writer: Option<Box<dyn FrameWriter>>,
}

impl<S> std::fmt::Debug for UpgradeBridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeBridge")
            .field("state", &self.state)
            .field("uri", &self.session.request().uri())
            .finish()
    }
}

impl<S> UpgradeBridge<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        request: HandshakeRequest,
        endpoint: Arc<dyn Endpoint>,
        channel: Arc<Mutex<Channel<S>>>,
        secure: bool,
    ) -> Self {
        Self {
            state: BridgeState::Initialized,
            session: UpgradeSession::new(request, secure),
            endpoint,
            channel,
            handler: None,
            writer: None,
        }
    }

    pub fn state(&self) -> BridgeState {
        self.state
    }

    pub fn session(&self) -> &UpgradeSession {
        &self.session
    }

    /// Attaches the listeners and opens the session.
    pub fn open(&mut self, handler: Box<dyn FrameHandler>, writer: Box<dyn FrameWriter>) {
        debug_assert_eq!(self.state, BridgeState::Initialized);
        self.handler = Some(handler);
        self.writer = Some(writer);
        self.state = BridgeState::Open;
        debug!(uri = self.session.request().uri(), "upgraded connection open");
        self.endpoint.on_open(&self.session);
    }

    /// Pumps available bytes into the frame decoder.
    ///
    /// Runs until the channel stops producing or the bridge leaves `Open`.
    /// Every failure mode ends in `Closed`, differing only in the close
    /// reason reported.
    pub async fn on_read_available(&mut self) {
        while self.state == BridgeState::Open {
            let mut transfer = BytesMut::with_capacity(READ_CHUNK_SIZE);
            let read = {
                self.channel.lock().await.read_bytes(&mut transfer, READ_CHUNK_SIZE).await
            };
            match read {
                Ok(0) => return,
                Ok(_) => {
                    let Some(handler) = self.handler.as_mut() else { return };
                    match handler.on_data(transfer.freeze()) {
                        Ok(()) => {}
                        Err(UpgradeError::FrameProtocol { code, reason }) => {
                            self.close(CloseReason::new(code, reason)).await;
                        }
                        Err(UpgradeError::Eof) => {
                            self.close(CloseReason::abnormal("end of stream")).await;
                        }
                        Err(error) => {
                            self.endpoint.on_error(&self.session, &error);
                            self.close(CloseReason::abnormal(error.to_string())).await;
                        }
                    }
                }
                Err(ChannelError::ConnectionClosed) => {
                    self.close(CloseReason::abnormal("connection closed")).await;
                }
                // an idle interval is not a failure on an upgraded connection
                Err(ChannelError::ReadTimeout { .. }) => return,
                Err(error) => {
                    let error = UpgradeError::from(error);
                    self.endpoint.on_error(&self.session, &error);
                    self.close(CloseReason::abnormal(error.to_string())).await;
                }
            }
        }
    }

    /// Forwards a write-possible notification to the pending-write flusher.
    pub fn on_write_possible(&mut self) {
        if self.state != BridgeState::Open {
            return;
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.on_write_possible();
        }
    }

    /// Initiates the close sequence with the given reason.
    ///
    /// The state of the connection is unknown by the time this runs, so a
    /// close frame is attempted and the socket is closed immediately after
    /// instead of waiting for the peer's answer.
    pub async fn close(&mut self, reason: CloseReason) {
        if matches!(self.state, BridgeState::Closing | BridgeState::Closed) {
            return;
        }
        self.state = BridgeState::Closing;
        debug!(code = reason.code(), reason = reason.reason(), "closing upgraded connection");

        if let Some(writer) = self.writer.as_mut() {
            writer.send_close(&reason);
        }
        self.endpoint.on_close(&self.session, &reason);
        self.destroy().await;
    }

    /// Closes the underlying connection exactly once.
    pub async fn destroy(&mut self) {
        if self.state == BridgeState::Closed {
            return;
        }
        self.state = BridgeState::Closed;
        if let Err(error) = self.channel.lock().await.close().await {
            warn!(error = %error, "closing upgraded connection failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    use crate::config::ConnConfig;
    use crate::upgrade::session::CLOSE_ABNORMAL;

    #[derive(Default)]
    struct RecordingEndpoint {
        opens: AtomicUsize,
        errors: AtomicUsize,
        closes: StdMutex<Vec<CloseReason>>,
    }

    impl Endpoint for RecordingEndpoint {
        fn on_open(&self, _session: &UpgradeSession) {
            self.opens.fetch_add(1, Ordering::SeqCst);
        }

        fn on_error(&self, _session: &UpgradeSession, _error: &UpgradeError) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_close(&self, _session: &UpgradeSession, reason: &CloseReason) {
            self.closes.lock().unwrap().push(reason.clone());
        }
    }

    struct RecordingFrames {
        received: Arc<StdMutex<Vec<Bytes>>>,
        fail_with: Option<UpgradeError>,
    }

    impl FrameHandler for RecordingFrames {
        fn on_data(&mut self, data: Bytes) -> Result<(), UpgradeError> {
            if let Some(error) = self.fail_with.take() {
                return Err(error);
            }
            self.received.lock().unwrap().push(data);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingWriter {
        flushes: usize,
        close_frames: Vec<CloseReason>,
    }

    impl FrameWriter for RecordingWriter {
        fn on_write_possible(&mut self) {
            self.flushes += 1;
        }

        fn send_close(&mut self, reason: &CloseReason) {
            self.close_frames.push(reason.clone());
        }
    }

    struct SharedWriter(Arc<StdMutex<RecordingWriter>>);

    impl FrameWriter for SharedWriter {
        fn on_write_possible(&mut self) {
            self.0.lock().unwrap().on_write_possible();
        }

        fn send_close(&mut self, reason: &CloseReason) {
            self.0.lock().unwrap().send_close(reason);
        }
    }

    fn bridge_over(
        server: DuplexStream,
        endpoint: Arc<RecordingEndpoint>,
    ) -> UpgradeBridge<DuplexStream> {
        let config = ConnConfig::new();
        let channel = Arc::new(Mutex::new(Channel::plain(server, &config)));
        UpgradeBridge::new(HandshakeRequest::new("/chat"), endpoint, channel, false)
    }

    #[tokio::test]
    async fn open_fires_endpoint_once() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (_client, server) = duplex(64);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        assert_eq!(bridge.state(), BridgeState::Initialized);
        bridge.open(
            Box::new(RecordingFrames { received: Arc::default(), fail_with: None }),
            Box::new(RecordingWriter::default()),
        );
        assert_eq!(bridge.state(), BridgeState::Open);
        assert_eq!(endpoint.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_availability_feeds_the_frame_handler() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (mut client, server) = duplex(256);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        let received = Arc::new(StdMutex::new(Vec::new()));
        bridge.open(
            Box::new(RecordingFrames { received: Arc::clone(&received), fail_with: None }),
            Box::new(RecordingWriter::default()),
        );

        client.write_all(b"\x81\x05hello").await.unwrap();
        drop(client);
        bridge.on_read_available().await;

        let frames = received.lock().unwrap();
        assert_eq!(frames[0], Bytes::from_static(b"\x81\x05hello"));
    }

    #[tokio::test]
    async fn frame_violation_closes_with_its_own_code() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (mut client, server) = duplex(256);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        bridge.open(
            Box::new(RecordingFrames {
                received: Arc::default(),
                fail_with: Some(UpgradeError::FrameProtocol {
                    code: 1002,
                    reason: "reserved bits set".into(),
                }),
            }),
            Box::new(RecordingWriter::default()),
        );

        client.write_all(b"\xff\xff").await.unwrap();
        bridge.on_read_available().await;

        assert_eq!(bridge.state(), BridgeState::Closed);
        let closes = endpoint.closes.lock().unwrap();
        assert_eq!(closes[0].code(), 1002);
        assert_eq!(closes[0].reason(), "reserved bits set");
        // a violation is not an endpoint error, only a close
        assert_eq!(endpoint.errors.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn eof_closes_abnormally() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (client, server) = duplex(64);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        bridge.open(
            Box::new(RecordingFrames { received: Arc::default(), fail_with: None }),
            Box::new(RecordingWriter::default()),
        );

        drop(client);
        bridge.on_read_available().await;

        assert_eq!(bridge.state(), BridgeState::Closed);
        assert_eq!(endpoint.closes.lock().unwrap()[0].code(), CLOSE_ABNORMAL);
    }

    #[tokio::test]
    async fn io_failure_reports_error_then_closes_abnormally() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (mut client, server) = duplex(256);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        bridge.open(
            Box::new(RecordingFrames {
                received: Arc::default(),
                fail_with: Some(UpgradeError::Io {
                    source: std::io::Error::other("device gone"),
                }),
            }),
            Box::new(RecordingWriter::default()),
        );

        client.write_all(b"data").await.unwrap();
        bridge.on_read_available().await;

        assert_eq!(endpoint.errors.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.closes.lock().unwrap()[0].code(), CLOSE_ABNORMAL);
    }

    #[tokio::test]
    async fn write_possible_forwards_inline() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (_client, server) = duplex(64);
        let mut bridge = bridge_over(server, endpoint);

        let writer = Arc::new(StdMutex::new(RecordingWriter::default()));
        bridge.open(
            Box::new(RecordingFrames { received: Arc::default(), fail_with: None }),
            Box::new(SharedWriter(Arc::clone(&writer))),
        );
        bridge.on_write_possible();
        bridge.on_write_possible();
        assert_eq!(writer.lock().unwrap().flushes, 2);

        bridge.close(CloseReason::normal()).await;
        assert_eq!(bridge.state(), BridgeState::Closed);
        // no flush forwarding once the bridge left the open state
        bridge.on_write_possible();
        assert_eq!(writer.lock().unwrap().flushes, 2);
    }

    #[tokio::test]
    async fn destroy_closes_exactly_once() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (_client, server) = duplex(64);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        bridge.open(
            Box::new(RecordingFrames { received: Arc::default(), fail_with: None }),
            Box::new(RecordingWriter::default()),
        );

        bridge.destroy().await;
        assert_eq!(bridge.state(), BridgeState::Closed);
        // second destroy and a late close are both no-ops
        bridge.destroy().await;
        bridge.close(CloseReason::normal()).await;
        assert!(endpoint.closes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_sends_the_close_frame_before_teardown() {
        let endpoint = Arc::new(RecordingEndpoint::default());
        let (_client, server) = duplex(64);
        let mut bridge = bridge_over(server, Arc::clone(&endpoint));

        let writer = Arc::new(StdMutex::new(RecordingWriter::default()));
        bridge.open(
            Box::new(RecordingFrames { received: Arc::default(), fail_with: None }),
            Box::new(SharedWriter(Arc::clone(&writer))),
        );

        bridge.close(CloseReason::abnormal("pump failed")).await;
        assert_eq!(writer.lock().unwrap().close_frames.len(), 1);
        assert_eq!(endpoint.closes.lock().unwrap().len(), 1);
    }
}
