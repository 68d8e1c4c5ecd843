//! Upgraded-connection session state.
//!
//! After a successful protocol upgrade the HTTP request that carried it is
//! frozen into a [`HandshakeRequest`]; the bridge builds an
//! [`UpgradeSession`] from it and hands that to the application's
//! [`Endpoint`] callbacks. Negotiation itself (sub-protocol selection,
//! extension grammar) happens before this layer and is taken as given.

use std::collections::HashMap;

use crate::error::UpgradeError;

/// Close codes used by the bridge itself. Codes carried inside a frame
/// protocol violation come from the frame decoder.
pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Why an upgraded connection is being closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    code: u16,
    reason: String,
}

impl CloseReason {
    pub fn new<S: ToString>(code: u16, reason: S) -> Self {
        Self { code, reason: reason.to_string() }
    }

    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    /// The code reserved for a connection dropped without a close handshake.
    pub fn abnormal<S: ToString>(reason: S) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// The pre-validated upgrade request the bridge is constructed from.
#[derive(Debug, Clone, Default)]
pub struct HandshakeRequest {
    uri: String,
    query: Option<String>,
    path_parameters: HashMap<String, String>,
    sub_protocol: Option<String>,
    user_principal: Option<String>,
    http_session_id: Option<String>,
}

impl HandshakeRequest {
    pub fn new<S: Into<String>>(uri: S) -> Self {
        Self { uri: uri.into(), ..Self::default() }
    }

    pub fn with_query<S: Into<String>>(mut self, query: S) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_path_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.path_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_sub_protocol<S: Into<String>>(mut self, sub_protocol: S) -> Self {
        self.sub_protocol = Some(sub_protocol.into());
        self
    }

    pub fn with_user_principal<S: Into<String>>(mut self, principal: S) -> Self {
        self.user_principal = Some(principal.into());
        self
    }

    pub fn with_http_session_id<S: Into<String>>(mut self, id: S) -> Self {
        self.http_session_id = Some(id.into());
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn path_parameters(&self) -> &HashMap<String, String> {
        &self.path_parameters
    }

    pub fn sub_protocol(&self) -> Option<&str> {
        self.sub_protocol.as_deref()
    }

    pub fn user_principal(&self) -> Option<&str> {
        self.user_principal.as_deref()
    }

    pub fn http_session_id(&self) -> Option<&str> {
        self.http_session_id.as_deref()
    }
}

/// The session object handed to [`Endpoint`] callbacks: the frozen handshake
/// request plus whether the carrying channel was TLS-secured.
#[derive(Debug, Clone)]
pub struct UpgradeSession {
    request: HandshakeRequest,
    secure: bool,
}

impl UpgradeSession {
    pub fn new(request: HandshakeRequest, secure: bool) -> Self {
        Self { request, secure }
    }

    pub fn request(&self) -> &HandshakeRequest {
        &self.request
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }
}

/// Application-side callbacks for an upgraded connection's lifecycle.
pub trait Endpoint: Send + Sync {
    fn on_open(&self, session: &UpgradeSession);

    /// An I/O failure that does not by itself determine the close reason.
    fn on_error(&self, session: &UpgradeSession, error: &UpgradeError);

    fn on_close(&self, session: &UpgradeSession, reason: &CloseReason);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_constructors() {
        assert_eq!(CloseReason::normal().code(), CLOSE_NORMAL);
        let abnormal = CloseReason::abnormal("stream ended");
        assert_eq!(abnormal.code(), CLOSE_ABNORMAL);
        assert_eq!(abnormal.reason(), "stream ended");
    }

    #[test]
    fn handshake_request_builder() {
        let request = HandshakeRequest::new("/chat/42")
            .with_query("token=abc")
            .with_path_parameter("room", "42")
            .with_sub_protocol("v1.chat")
            .with_http_session_id("sess-9");

        assert_eq!(request.uri(), "/chat/42");
        assert_eq!(request.query(), Some("token=abc"));
        assert_eq!(request.path_parameters().get("room").map(String::as_str), Some("42"));
        assert_eq!(request.sub_protocol(), Some("v1.chat"));
        assert_eq!(request.user_principal(), None);
        assert_eq!(request.http_session_id(), Some("sess-9"));
    }
}
