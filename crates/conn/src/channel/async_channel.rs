//! The asynchronous channel over a socket-like transport.
//!
//! [`Channel`] is a tagged union over the plain and TLS-secured transports.
//! Both variants share the read/write timeouts and the closed flag; the
//! secure variant additionally owns a [`TlsSession`]. Dispatch is a `match`
//! on the variant, not an inheritance chain.
//!
//! Contracts:
//! - `read_bytes` returns the byte count; end-of-stream and locally observed
//!   close both surface as [`ChannelError::ConnectionClosed`].
//! - Exceeding a timeout surfaces as `ReadTimeout`/`WriteTimeout`, which is
//!   *not* the same as closed: the socket may still be usable.
//! - On the secure variant every transfer goes through the TLS session, and
//!   application data is refused with `HandshakeIncomplete` until the
//!   handshake has finished.
//! - `close` is idempotent; the secure variant attempts the close-notify
//!   exchange before shutting the transport down.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::config::ConnConfig;
use crate::error::{ChannelError, TlsError};
use crate::tls::{AppTransfer, TlsEngine, TlsSession};

enum Transport<S> {
    Plain(S),
    Secure { stream: S, tls: TlsSession },
}

/// An asynchronous channel, plain or TLS-secured.
pub struct Channel<S> {
    transport: Transport<S>,
    read_timeout: Duration,
    write_timeout: Duration,
    closed: bool,
}

impl<S> std::fmt::Debug for Channel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("secure", &matches!(self.transport, Transport::Secure { .. }))
            .field("closed", &self.closed)
            .finish()
    }
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a plain passthrough channel.
    pub fn plain(stream: S, config: &ConnConfig) -> Self {
        Self {
            transport: Transport::Plain(stream),
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            closed: false,
        }
    }

    /// Creates a TLS-secured channel around the given engine.
    pub fn secure(stream: S, engine: Box<dyn TlsEngine>, config: &ConnConfig) -> Self {
        Self {
            transport: Transport::Secure { stream, tls: TlsSession::new(engine) },
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            closed: false,
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self.transport, Transport::Secure { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether application data may cross the channel. Always true for the
    /// plain variant.
    pub fn is_handshake_complete(&self) -> bool {
        match &self.transport {
            Transport::Plain(_) => true,
            Transport::Secure { tls, .. } => tls.is_complete(),
        }
    }

    /// Drives the TLS handshake to completion. No-op on the plain variant and
    /// on an already-completed secure channel.
    pub async fn handshake(&mut self) -> Result<(), ChannelError> {
        match &mut self.transport {
            Transport::Plain(_) => Ok(()),
            Transport::Secure { stream, tls } => {
                tls.handshake(stream, self.read_timeout).await?;
                Ok(())
            }
        }
    }

    /// Requests a mid-session re-handshake, escalating the client
    /// authentication requirement when the engine supports it.
    pub async fn rehandshake(&mut self) -> Result<(), ChannelError> {
        match &mut self.transport {
            Transport::Plain(_) => Ok(()),
            Transport::Secure { stream, tls } => {
                tls.rehandshake(stream, self.read_timeout).await?;
                Ok(())
            }
        }
    }

    /// Reads at most `max` bytes into `dst` within the read timeout.
    pub async fn read_bytes(&mut self, dst: &mut BytesMut, max: usize) -> Result<usize, ChannelError> {
        if self.closed {
            return Err(ChannelError::ConnectionClosed);
        }

        match &mut self.transport {
            Transport::Plain(stream) => {
                let mut transfer = vec![0u8; max];
                let n = match timeout(self.read_timeout, stream.read(&mut transfer)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(ChannelError::read_timeout(self.read_timeout)),
                };
                if n == 0 {
                    return Err(ChannelError::ConnectionClosed);
                }
                dst.extend_from_slice(&transfer[..n]);
                trace!(bytes = n, "plain read");
                Ok(n)
            }
            Transport::Secure { stream, tls } => {
                if !tls.is_complete() {
                    return Err(ChannelError::HandshakeIncomplete);
                }
                match tls.read_app(stream, dst, max, self.read_timeout).await {
                    Ok(AppTransfer::Bytes(n)) => {
                        trace!(bytes = n, "secure read");
                        Ok(n)
                    }
                    Ok(AppTransfer::Closed) => Err(ChannelError::ConnectionClosed),
                    Err(e) => Err(map_tls_io(e, self.read_timeout, true)),
                }
            }
        }
    }

    /// Writes the whole of `src` within the write timeout, returning the
    /// number of application bytes consumed.
    pub async fn write_bytes(&mut self, src: &[u8]) -> Result<usize, ChannelError> {
        if self.closed {
            return Err(ChannelError::ConnectionClosed);
        }

        match &mut self.transport {
            Transport::Plain(stream) => {
                match timeout(self.write_timeout, stream.write_all(src)).await {
                    Ok(result) => result?,
                    Err(_) => return Err(ChannelError::write_timeout(self.write_timeout)),
                }
                trace!(bytes = src.len(), "plain write");
                Ok(src.len())
            }
            Transport::Secure { stream, tls } => {
                if !tls.is_complete() {
                    return Err(ChannelError::HandshakeIncomplete);
                }
                match tls.write_app(stream, src, self.write_timeout).await {
                    Ok(AppTransfer::Bytes(n)) => {
                        trace!(bytes = n, "secure write");
                        Ok(n)
                    }
                    Ok(AppTransfer::Closed) => Err(ChannelError::ConnectionClosed),
                    Err(e) => Err(map_tls_io(e, self.write_timeout, false)),
                }
            }
        }
    }

    /// Closes the channel. Second and later calls are no-ops. The secure
    /// variant flushes the TLS close-notify exchange before the transport is
    /// shut down; failures there are logged and swallowed, shutdown proceeds.
    pub async fn close(&mut self) -> Result<(), ChannelError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match &mut self.transport {
            Transport::Plain(stream) => {
                stream.shutdown().await?;
            }
            Transport::Secure { stream, tls } => {
                if let Err(e) = tls.close_notify(stream, self.write_timeout).await {
                    warn!(cause = %e, "close-notify failed, shutting transport down anyway");
                }
                stream.shutdown().await?;
            }
        }

        debug!("channel closed");
        Ok(())
    }
}

/// Timeouts inside the TLS session surface as io timeouts; everything else
/// stays a TLS failure.
fn map_tls_io(e: TlsError, io_timeout: Duration, is_read: bool) -> ChannelError {
    match e {
        TlsError::Io { source } if source.kind() == std::io::ErrorKind::TimedOut => {
            if is_read {
                ChannelError::read_timeout(io_timeout)
            } else {
                ChannelError::write_timeout(io_timeout)
            }
        }
        other => ChannelError::Tls { source: other },
    }
}
