//! HTTP/1.1 upgrade handshake parsing and rendering.
//!
//! Everything here is pure: bytes in, bytes out. Socket I/O lives in
//! `session.rs` and `net/head.rs`.
//!
//! # Design Decisions
//! - Every header keeps its wire line (case, spacing, terminator) so a
//!   verbatim handshake reaches the backend exactly as the client wrote it
//! - Parsed names and values are for lookups only; rendering never
//!   rebuilds a line from them
//! - Lookups are case-insensitive on the name only

use axum::http::StatusCode;
use base64::Engine as _;
use sha1::{Digest, Sha1};

/// Upper bound on parsed header fields.
pub const MAX_HEADERS: usize = 64;

/// RFC 6455 magic GUID appended to `Sec-WebSocket-Key`.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// One header line as received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    /// Value with surrounding whitespace trimmed.
    pub value: Vec<u8>,
    /// The full line on the wire, line terminator included.
    pub raw: Vec<u8>,
}

impl HeaderField {
    /// A header in canonical `Name: value\r\n` form.
    pub fn new(name: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let value = value.into();
        let mut raw = Vec::with_capacity(name.len() + value.len() + 4);
        raw.extend_from_slice(name.as_bytes());
        raw.extend_from_slice(b": ");
        raw.extend_from_slice(&value);
        raw.extend_from_slice(b"\r\n");
        Self { name, value, raw }
    }
}

/// A parsed request line plus its header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    /// Request target as sent, query string included.
    pub target: String,
    /// Minor HTTP version (`1` for HTTP/1.1).
    pub version: u8,
    pub headers: Vec<HeaderField>,
    /// The whole head exactly as received, blank line included.
    pub raw: Vec<u8>,
}

impl RequestHead {
    /// Parse a request head from the start of `buf`.
    ///
    /// Returns `Ok(None)` while the terminator has not arrived yet, or the
    /// head and its length in bytes once it has.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, httparse::Error> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let len = match req.parse(buf)? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Ok(None),
        };

        // Header lines follow the request line one per line; httparse
        // rejects folded continuation lines in requests.
        let raw = &buf[..len];
        let lines = raw.split_inclusive(|&b| b == b'\n').skip(1);

        let head = Self {
            method: req.method.unwrap_or_default().to_string(),
            target: req.path.unwrap_or_default().to_string(),
            version: req.version.unwrap_or(1),
            headers: req
                .headers
                .iter()
                .zip(lines)
                .map(|(h, line)| HeaderField {
                    name: h.name.to_string(),
                    value: h.value.to_vec(),
                    raw: line.to_vec(),
                })
                .collect(),
            raw: raw.to_vec(),
        };
        Ok(Some((head, len)))
    }

    /// The head bytes exactly as the client sent them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// The request line without its CRLF, e.g. `GET /speed HTTP/1.1`.
    pub fn request_line(&self) -> String {
        format!("{} {} HTTP/1.{}", self.method, self.target, self.version)
    }

    /// Path component of the target (query string removed).
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }

    /// First value of the named header.
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_slice())
    }

    /// First value of the named header, if it is valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Whether any value of a comma-separated header lists `token`.
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case(name))
            .filter_map(|h| std::str::from_utf8(&h.value).ok())
            .flat_map(|v| v.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case(token))
    }

    /// Headers in original order, minus the names in `strip`.
    pub fn headers_without(&self, strip: &[String]) -> Vec<HeaderField> {
        self.headers
            .iter()
            .filter(|h| !strip.iter().any(|s| s.eq_ignore_ascii_case(&h.name)))
            .cloned()
            .collect()
    }
}

/// Serialize a request line and headers back to wire form, followed by
/// any payload bytes that arrived behind the head.
///
/// Each header is written from its wire line, so spacing and case survive.
pub fn render_handshake(request_line: &str, headers: &[HeaderField], extra: &[u8]) -> Vec<u8> {
    let header_len: usize = headers.iter().map(|h| h.raw.len()).sum();
    let mut out = Vec::with_capacity(request_line.len() + header_len + 4 + extra.len());

    out.extend_from_slice(request_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    for header in headers {
        out.extend_from_slice(&header.raw);
    }
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(extra);
    out
}

/// `Sec-WebSocket-Accept` for a client key.
pub fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(hasher.finalize())
}

/// The `101` response sent when the relay terminates the handshake itself.
pub fn render_switching_protocols(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        accept
    )
    .into_bytes()
}

/// A minimal close-delimited error response.
pub fn render_error(status: StatusCode) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "HTTP/1.1 {} {}\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        status.as_u16(),
        reason,
        reason.len(),
        reason
    )
    .into_bytes()
}
