//! Channel construction.
//!
//! [`ChannelFactory`] replaces the usual lazily-initialized process-wide
//! factory singleton with an explicit configuration value: build one at
//! startup, clone it wherever connections are accepted. The clone-per-use
//! discipline keeps per-connection state from ever leaking across connections
//! that share a factory template.

use std::sync::Arc;

use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::channel::Channel;
use crate::config::ConnConfig;
use crate::error::{ChannelError, TlsError};
use crate::tls::RustlsEngine;

/// Produces plain or secure channels based on the configured `secure` flag.
#[derive(Clone)]
pub struct ChannelFactory {
    config: ConnConfig,
    tls_config: Option<Arc<ServerConfig>>,
}

impl std::fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("secure", &self.config.secure())
            .field("has_tls_config", &self.tls_config.is_some())
            .finish()
    }
}

impl ChannelFactory {
    /// A factory for plain channels.
    pub fn new(config: ConnConfig) -> Self {
        Self { config, tls_config: None }
    }

    /// A factory for TLS-secured channels using the given server config.
    pub fn with_tls(config: ConnConfig, tls_config: Arc<ServerConfig>) -> Self {
        Self { config: config.with_secure(true), tls_config: Some(tls_config) }
    }

    pub fn is_secure(&self) -> bool {
        self.config.secure()
    }

    pub fn config(&self) -> &ConnConfig {
        &self.config
    }

    /// Wraps an accepted transport into the configured channel variant.
    pub fn channel<S>(&self, stream: S) -> Result<Channel<S>, ChannelError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if !self.config.secure() {
            debug!("accepting plain channel");
            return Ok(Channel::plain(stream, &self.config));
        }

        let tls_config = self
            .tls_config
            .as_ref()
            .ok_or_else(|| TlsError::handshake_failed("secure factory has no tls server config"))?;
        let engine = RustlsEngine::new(Arc::clone(tls_config))?;
        debug!("accepting secure channel");
        Ok(Channel::secure(stream, Box::new(engine), &self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_factory_produces_plain_channels() {
        let factory = ChannelFactory::new(ConnConfig::default());
        assert!(!factory.is_secure());

        let (stream, _peer) = tokio::io::duplex(64);
        let channel = factory.channel(stream).unwrap();
        assert!(!channel.is_secure());
        assert!(channel.is_handshake_complete());
    }

    #[test]
    fn secure_flag_without_tls_config_fails() {
        let factory = ChannelFactory::new(ConnConfig::default().with_secure(true));
        let (stream, _peer) = tokio::io::duplex(64);
        assert!(matches!(factory.channel(stream), Err(ChannelError::Tls { .. })));
    }

    #[test]
    fn clones_share_configuration_only() {
        let factory = ChannelFactory::new(ConnConfig::default().with_header_buffer_size(4096));
        let cloned = factory.clone();
        assert_eq!(cloned.config().header_buffer_size(), 4096);
    }
}
