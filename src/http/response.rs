//! HTTP/1.x responses.
//!
//! A [`Response`] is a [`Parts`] head plus a [`Body`]. The head knows how to
//! write itself in wire format, which both the origin server and the snapshot
//! codec build on.

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use url::Url;

use super::{Body, Headers, StatusCode, Version};

/// Everything in a response except the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parts {
    pub version: Version,
    pub status: StatusCode,
    /// Reason phrase exactly as sent by the server. May be empty.
    pub reason: String,
    pub headers: Headers,
    /// URL of the request this response answers, when known.
    pub url: Option<Url>,
}

impl Parts {
    pub fn new(status: StatusCode) -> Self {
        Self {
            version: Version::Http11,
            status,
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: Headers::new(),
            url: None,
        }
    }

    /// Writes the status line, the headers verbatim and `body` in HTTP/1.x wire form.
    ///
    /// Nothing is added or rewritten: callers decide on framing headers.
    pub fn write_wire(&self, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(64 + self.headers.len() * 48 + body.len());

        buf.put(self.version.as_str().as_bytes());
        buf.put(format!(" {:03}", self.status.as_u16()).as_bytes());
        buf.put_u8(b' ');
        buf.put(self.reason.as_bytes());
        buf.put(&b"\r\n"[..]);
        self.headers.write_to(&mut buf);
        buf.put(&b"\r\n"[..]);
        buf.put(body);
        buf
    }
}

/// An HTTP response whose body may still be streaming.
///
/// # Examples
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> std::io::Result<()> {
/// use rtcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// assert_eq!(response.status(), StatusCode::OK);
/// assert_eq!(response.reason(), "OK");
/// assert_eq!(response.bytes().await?, r#"{"status":"ok"}"#);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Response {
    parts: Parts,
    body: Body,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self::from_parts(Parts::new(status), Body::empty())
    }

    pub fn from_parts(parts: Parts, body: Body) -> Self {
        Self { parts, body }
    }

    pub fn into_parts(self) -> (Parts, Body) {
        (self.parts, self.body)
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.parts.headers.append(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.parts.status
    }

    pub fn reason(&self) -> &str {
        &self.parts.reason
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn headers(&self) -> &Headers {
        &self.parts.headers
    }

    pub fn url(&self) -> Option<&Url> {
        self.parts.url.as_ref()
    }

    pub fn into_body(self) -> Body {
        self.body
    }

    /// Consumes the response and reads its body to the end.
    pub async fn bytes(self) -> io::Result<Bytes> {
        self.body.collect().await
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
