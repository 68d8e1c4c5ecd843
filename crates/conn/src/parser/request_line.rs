//! Request-line scanning.
//!
//! [`RequestLineScanner`] is a resumable tokenizer over a [`ByteWindow`]: it
//! consumes bytes one at a time, records token boundaries as window offsets,
//! and can stop at any byte and continue later after the window has been
//! refilled. No token is materialized until the whole line has been seen, so
//! a partial line never produces a dangling slice.
//!
//! # Shape of a request line
//!
//! ```text
//! [CRLF*] METHOD SP+ URI [SP+ PROTOCOL] CRLF
//! ```
//!
//! Leading blank lines are tolerated (a keep-alive client may send a stray
//! CRLF between requests). SP and HT both count as separators, and runs of
//! them collapse. A line that ends right after the URI is the short form with
//! no protocol token; such a request reports an empty protocol.
//!
//! The first `?` in the URI splits it into path and query. Later `?` bytes
//! belong to the query.

use bytes::Bytes;

use crate::buffer::ByteWindow;

const CR: u8 = b'\r';
const LF: u8 = b'\n';
const SP: u8 = b' ';
const HT: u8 = b'\t';

/// The parsed tokens of one request line, owned and detached from the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    method: Bytes,
    uri: Bytes,
    path: Bytes,
    query: Option<Bytes>,
    protocol: Bytes,
}

impl RequestLine {
    pub fn method(&self) -> &Bytes {
        &self.method
    }

    /// The request target as sent, query included.
    pub fn uri(&self) -> &Bytes {
        &self.uri
    }

    /// The request target up to (not including) the first `?`.
    pub fn path(&self) -> &Bytes {
        &self.path
    }

    /// The bytes after the first `?`, if the target had one.
    pub fn query(&self) -> Option<&Bytes> {
        self.query.as_ref()
    }

    /// The protocol token, empty for the short request form.
    pub fn protocol(&self) -> &Bytes {
        &self.protocol
    }

    /// Whether the line was the short form with no protocol token.
    pub fn is_short_form(&self) -> bool {
        self.protocol.is_empty()
    }

    /// The method as a typed [`http::Method`], when it is a well-formed
    /// token.
    pub fn http_method(&self) -> Option<http::Method> {
        http::Method::from_bytes(&self.method).ok()
    }

    /// The request target as a typed [`http::Uri`], when it parses. Shares
    /// the token bytes instead of copying them.
    pub fn http_uri(&self) -> Option<http::Uri> {
        http::Uri::from_maybe_shared(self.uri.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    SkipBlankLines,
    Method,
    AfterMethod,
    Uri,
    AfterUri,
    Protocol,
    Complete,
}

/// Outcome of a [`RequestLineScanner::step`] pass over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// The window ran dry mid-line; refill and step again.
    NeedData,
    /// A full request line has been consumed.
    Complete,
}

/// Resumable request-line tokenizer. Offsets index into the window the
/// scanner is stepped over, which must be the same window for the lifetime of
/// one line.
#[derive(Debug)]
pub struct RequestLineScanner {
    state: ScanState,
    token_start: usize,
    method: (usize, usize),
    uri: (usize, usize),
    question_pos: Option<usize>,
    protocol: (usize, usize),
    protocol_end: Option<usize>,
    short_form: bool,
}

impl Default for RequestLineScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLineScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::SkipBlankLines,
            token_start: 0,
            method: (0, 0),
            uri: (0, 0),
            question_pos: None,
            protocol: (0, 0),
            protocol_end: None,
            short_form: false,
        }
    }

    /// Whether any non-blank byte of the line has been seen yet.
    pub fn started(&self) -> bool {
        self.state != ScanState::SkipBlankLines
    }

    /// Consumes as many bytes as the window holds, advancing its read cursor.
    pub fn step(&mut self, window: &mut ByteWindow) -> Scan {
        while let Some(byte) = window.peek() {
            match self.state {
                ScanState::SkipBlankLines => {
                    if byte == CR || byte == LF {
                        window.advance();
                    } else {
                        self.token_start = window.pos();
                        self.state = ScanState::Method;
                    }
                }
                ScanState::Method => {
                    if byte == SP || byte == HT {
                        self.method = (self.token_start, window.pos());
                        window.advance();
                        self.state = ScanState::AfterMethod;
                    } else {
                        window.advance();
                    }
                }
                ScanState::AfterMethod => {
                    if byte == SP || byte == HT {
                        window.advance();
                    } else {
                        self.token_start = window.pos();
                        self.state = ScanState::Uri;
                    }
                }
                ScanState::Uri => match byte {
                    SP | HT => {
                        self.uri = (self.token_start, window.pos());
                        window.advance();
                        self.state = ScanState::AfterUri;
                    }
                    CR | LF => {
                        // short form: the line ends right after the target. A
                        // CR's trailing LF is left in the window and swallowed
                        // by the next line's blank skip.
                        self.uri = (self.token_start, window.pos());
                        window.advance();
                        self.short_form = true;
                        self.state = ScanState::Complete;
                        return Scan::Complete;
                    }
                    b'?' => {
                        if self.question_pos.is_none() {
                            self.question_pos = Some(window.pos());
                        }
                        window.advance();
                    }
                    _ => window.advance(),
                },
                ScanState::AfterUri => {
                    if byte == SP || byte == HT {
                        window.advance();
                    } else {
                        self.token_start = window.pos();
                        self.state = ScanState::Protocol;
                    }
                }
                ScanState::Protocol => match byte {
                    CR => {
                        self.protocol_end = Some(window.pos());
                        window.advance();
                    }
                    LF => {
                        let end = self.protocol_end.unwrap_or(window.pos());
                        self.protocol = (self.token_start, end);
                        window.advance();
                        self.state = ScanState::Complete;
                        return Scan::Complete;
                    }
                    _ => window.advance(),
                },
                ScanState::Complete => return Scan::Complete,
            }
        }

        if self.state == ScanState::Complete { Scan::Complete } else { Scan::NeedData }
    }

    /// Materializes the tokens of a completed line as owned bytes.
    ///
    /// Must only be called after [`step`](Self::step) returned
    /// [`Scan::Complete`], over the same window.
    pub fn finish(&self, window: &ByteWindow) -> RequestLine {
        debug_assert_eq!(self.state, ScanState::Complete);

        let method = window.copy_out(self.method.0, self.method.1);
        let uri = window.copy_out(self.uri.0, self.uri.1);
        let (path, query) = match self.question_pos {
            Some(q) if q < self.uri.1 => {
                (window.copy_out(self.uri.0, q), Some(window.copy_out(q + 1, self.uri.1)))
            }
            _ => (uri.clone(), None),
        };
        let protocol = if self.short_form || self.protocol.0 == self.protocol.1 {
            Bytes::new()
        } else {
            window.copy_out(self.protocol.0, self.protocol.1)
        };

        RequestLine { method, uri, path, query, protocol }
    }
}
