//! HTTP/1.1 requests: built by clients, parsed by the origin server with
//! [`httparse`], and serialized to the wire by the HTTP transport.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;
use url::Url;

use super::{Headers, Method, Version};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid request target: {0}")]
    InvalidTarget(#[from] url::ParseError),
}

/// An HTTP request addressed by its absolute URL.
///
/// # Examples
///
/// ```
/// use rtcache::http::{Method, Request};
///
/// let request = Request::get("http://localhost:8000/hello?name=world")
///     .unwrap()
///     .header("Accept", "text/plain");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_string(), Some("name=world"));
/// assert_eq!(request.url().as_str(), "http://localhost:8000/hello?name=world");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    version: Version,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers accepted when parsing a request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request with no headers and an empty body.
    ///
    /// # Errors
    ///
    /// Returns [`url::ParseError`] if `url` is not an absolute URL.
    pub fn new(method: Method, url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::from_url(method, Url::parse(url)?))
    }

    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            version: Version::Http11,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for `Request::new(Method::Get, url)`.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Self::new(Method::Get, url)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl AsRef<[u8]>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Sets the request body. `Content-Length` is written by [`to_bytes`](Self::to_bytes).
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a raw HTTP/1.1 request received by a server.
    ///
    /// The absolute URL is rebuilt from the `Host` header (falling back to
    /// `localhost`) and the request target. Returns the request and the offset
    /// at which the body starts in `buf`. The body itself is attached only
    /// once it has fully arrived, via [`with_body`](Self::with_body).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — the header block has not fully arrived.
    /// - [`RequestError::Parse`] — the data is malformed.
    /// - [`RequestError::MissingField`] — method, path or version is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Request::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw.method {
            Some(m) => m.parse().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };
        let target = raw.path.ok_or(RequestError::MissingField { field: "path" })?;
        let version = raw
            .version
            .map(Version::from_minor)
            .ok_or(RequestError::MissingField { field: "version" })?;
        let headers = Headers::from_parsed(raw.headers);

        let url = if target.starts_with('/') {
            let host = headers.get("host").unwrap_or("localhost");
            Url::parse(&format!("http://{host}"))?.join(target)?
        } else {
            Url::parse(target)?
        };

        Ok((
            Self {
                method,
                url,
                version,
                headers,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the body bytes read after the header block.
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the absolute target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.url.query()
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == Version::Http11,
        }
    }

    pub fn content_length(&self) -> Option<usize> {
        self.headers.content_length()
    }

    /// Returns the `host[:port]` authority for the `Host` header.
    pub fn authority(&self) -> String {
        let host = self.url.host_str().unwrap_or("localhost");
        match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        }
    }

    /// Serializes the request in origin-form for sending over a connection.
    ///
    /// Adds `Host` and `Content-Length` unless already present, and always
    /// asks the server to close the connection after responding.
    pub fn to_bytes(&self) -> BytesMut {
        let mut target = self.url.path().to_owned();
        if let Some(query) = self.url.query() {
            target.push('?');
            target.push_str(query);
        }

        let mut headers = self.headers.clone();
        if !headers.contains("host") {
            headers.append("Host", self.authority());
        }
        if !self.body.is_empty() && !headers.contains("content-length") {
            headers.append("Content-Length", self.body.len().to_string());
        }
        headers.set("Connection", "close");

        let mut buf = BytesMut::with_capacity(64 + headers.len() * 32 + self.body.len());
        buf.put(format!("{} {} {}\r\n", self.method, target, self.version).as_bytes());
        headers.write_to(&mut buf);
        buf.put(&b"\r\n"[..]);
        buf.put(self.body.as_ref());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rebuilds_url_from_host() {
        let raw = b"GET /search?q=rust HTTP/1.1\r\nHost: example.com:8000\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.url().as_str(), "http://example.com:8000/search?q=rust");
        assert_eq!(req.query_string(), Some("q=rust"));
        assert_eq!(req.version(), Version::Http11);
        assert_eq!(offset, raw.len());
    }

    #[test]
    fn parse_without_host_uses_localhost() {
        let raw = b"GET / HTTP/1.0\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.url().as_str(), "http://localhost/");
        assert!(!req.is_keep_alive());
    }

    #[test]
    fn incomplete_request() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn body_offset_and_length() {
        let raw = b"POST / HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn to_bytes_writes_origin_form() {
        let req = Request::new(Method::Post, "http://localhost:8000/x?y=1")
            .unwrap()
            .header("Accept", "*/*")
            .body("data");
        let wire = String::from_utf8(req.to_bytes().to_vec()).unwrap();
        assert!(wire.starts_with("POST /x?y=1 HTTP/1.1\r\n"));
        assert!(wire.contains("Host: localhost:8000\r\n"));
        assert!(wire.contains("Content-Length: 4\r\n"));
        assert!(wire.contains("Connection: close\r\n"));
        assert!(wire.ends_with("\r\n\r\ndata"));
    }

    #[test]
    fn obs_text_header_is_sent_verbatim() {
        let req = Request::get("http://localhost/")
            .unwrap()
            .header("X-Name", b"caf\xe9");
        let wire = req.to_bytes();
        let needle = &b"X-Name: caf\xe9\r\n"[..];
        assert!(wire.windows(needle.len()).any(|w| w == needle));

        let (parsed, _) = Request::parse(&wire).unwrap();
        assert_eq!(parsed.headers().get_bytes("x-name"), Some(&b"caf\xe9"[..]));
    }

    #[test]
    fn serialized_request_parses_back() {
        let req = Request::get("http://127.0.0.1:9/a/b").unwrap();
        let wire = req.to_bytes();
        let (parsed, _) = Request::parse(&wire).unwrap();
        assert_eq!(parsed.url(), req.url());
        assert_eq!(parsed.method(), req.method());
    }
}
