//! Connection configuration.
//!
//! A [`ConnConfig`] is built once at startup and passed down to the channel
//! factory and input buffer. There is deliberately no global default instance:
//! every consumer receives the value it should use, and cloning the config per
//! connection keeps per-connection state from leaking across connections.

use std::time::Duration;

/// Default header buffer size, matching the largest header section we accept.
pub const DEFAULT_HEADER_BUFFER_SIZE: usize = 8 * 1024;

/// Default socket read/write timeout.
pub const DEFAULT_SO_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration consumed by the connection core.
///
/// Covers exactly the surface this layer needs: the header buffer size, the
/// socket timeouts, and whether accepted channels are TLS-secured.
#[derive(Debug, Clone)]
pub struct ConnConfig {
    header_buffer_size: usize,
    read_timeout: Duration,
    write_timeout: Duration,
    secure: bool,
}

impl Default for ConnConfig {
    fn default() -> Self {
        Self {
            header_buffer_size: DEFAULT_HEADER_BUFFER_SIZE,
            read_timeout: DEFAULT_SO_TIMEOUT,
            write_timeout: DEFAULT_SO_TIMEOUT,
            secure: false,
        }
    }
}

impl ConnConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_header_buffer_size(mut self, size: usize) -> Self {
        self.header_buffer_size = size;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn header_buffer_size(&self) -> usize {
        self.header_buffer_size
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn secure(&self) -> bool {
        self.secure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = ConnConfig::default();
        assert_eq!(config.header_buffer_size(), DEFAULT_HEADER_BUFFER_SIZE);
        assert_eq!(config.read_timeout(), DEFAULT_SO_TIMEOUT);
        assert!(!config.secure());
    }

    #[test]
    fn builder_chain() {
        let config = ConnConfig::new()
            .with_header_buffer_size(16 * 1024)
            .with_read_timeout(Duration::from_secs(5))
            .with_secure(true);
        assert_eq!(config.header_buffer_size(), 16 * 1024);
        assert_eq!(config.read_timeout(), Duration::from_secs(5));
        assert!(config.secure());
    }
}
