//! Plain HTTP/1.1 client transport over Tokio TCP.
//!
//! Each round trip opens a fresh connection, writes the request with
//! `Connection: close`, and parses the response head with [`httparse`].
//! Bodies framed by `Content-Length` or by connection close are handed to the
//! caller as a stream; chunked bodies are decoded up front.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};
use tokio::net::TcpStream;
use tracing::debug;

use super::{BoxFuture, Transport, TransportError};
use crate::Result;
use crate::http::response::Parts;
use crate::http::{Body, Headers, Method, Request, Response, StatusCode, Version};

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// Largest response head we will buffer before giving up (64 KiB).
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Maximum number of response headers.
const MAX_HEADERS: usize = 64;

/// HTTP/1.1 transport for `http://` URLs.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use rtcache::http::Request;
/// use rtcache::transport::{HttpTransport, Transport};
///
/// # async fn demo() -> rtcache::Result<()> {
/// let transport = HttpTransport::new().connect_timeout(Duration::from_secs(2));
/// let request = Request::get("http://localhost:8000/").expect("valid url");
/// let response = transport.round_trip(&request).await?;
/// println!("{}", response.status());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    connect_timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the TCP connect step. Unbounded by default.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn send(&self, request: &Request) -> std::result::Result<Response, TransportError> {
        let url = request.url();
        if url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(url.scheme().to_owned()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{host}:{port}");

        let connect = TcpStream::connect(addr.as_str());
        let connected = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connect)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => connect.await,
        };
        let mut stream = connected.map_err(|source| TransportError::Connect {
            addr: addr.clone(),
            source,
        })?;

        debug!(%addr, method = %request.method(), url = %url, "sending request");
        stream.write_all(&request.to_bytes()).await?;
        stream.flush().await?;

        let response = read_response(stream, request.method()).await?;
        debug!(%addr, status = response.status().as_u16(), "response head received");
        let (mut parts, body) = response.into_parts();
        parts.url = Some(url.clone());
        Ok(Response::from_parts(parts, body))
    }
}

impl Transport for HttpTransport {
    fn round_trip<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
        Box::pin(async move { Ok(self.send(request).await?) })
    }
}

/// Reads one response from `stream`, skipping interim `1xx` responses.
///
/// `method` decides whether a body may follow (`HEAD` never has one). A
/// `Content-Length` body that ends early fails with
/// [`io::ErrorKind::UnexpectedEof`] when read.
async fn read_response<S>(
    mut stream: S,
    method: &Method,
) -> std::result::Result<Response, TransportError>
where
    S: AsyncRead + Unpin + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    let mut parts = loop {
        match parse_head(&buf)? {
            Some((parts, offset))
                if parts.status.is_informational()
                    && parts.status != StatusCode::SWITCHING_PROTOCOLS =>
            {
                buf.advance(offset);
            }
            Some((parts, offset)) => {
                buf.advance(offset);
                break parts;
            }
            None => {
                if buf.len() > MAX_HEAD_SIZE {
                    return Err(TransportError::MalformedResponse(
                        httparse::Error::TooManyHeaders,
                    ));
                }
                fill(&mut stream, &mut buf).await?;
            }
        }
    };

    let body = if *method == Method::Head || parts.status.forbids_body() {
        Body::empty()
    } else if parts.headers.is_chunked() {
        let decoded = read_chunked(&mut stream, buf).await?;
        parts.headers.remove("transfer-encoding");
        parts.headers.set("Content-Length", decoded.len().to_string());
        Body::from(decoded)
    } else if let Some(len) = parts.headers.content_length() {
        let rest = AsyncReadExt::chain(Cursor::new(buf.freeze()), stream);
        Body::from_reader(ExactLength::new(rest, len as u64))
    } else {
        Body::from_reader(AsyncReadExt::chain(Cursor::new(buf.freeze()), stream))
    };

    Ok(Response::from_parts(parts, body))
}

/// Parses a response head. `Ok(None)` means more bytes are needed.
fn parse_head(buf: &[u8]) -> std::result::Result<Option<(Parts, usize)>, TransportError> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut raw = httparse::Response::new(&mut headers);

    let offset = match raw.parse(buf)? {
        httparse::Status::Complete(offset) => offset,
        httparse::Status::Partial => return Ok(None),
    };

    let status = raw
        .code
        .and_then(StatusCode::from_u16)
        .ok_or(TransportError::MalformedResponse(httparse::Error::Status))?;
    let headers = Headers::from_parsed(raw.headers);

    let parts = Parts {
        version: raw.version.map(Version::from_minor).unwrap_or_default(),
        status,
        reason: raw.reason.unwrap_or_default().to_owned(),
        headers,
        url: None,
    };
    Ok(Some((parts, offset)))
}

/// Decodes a chunked body. `buf` holds bytes already read past the head.
///
/// Trailer fields after the last chunk are ignored; the connection is closed
/// after this response anyway.
async fn read_chunked<S>(
    stream: &mut S,
    mut buf: BytesMut,
) -> std::result::Result<Bytes, TransportError>
where
    S: AsyncRead + Unpin,
{
    let mut body = BytesMut::new();

    loop {
        let (consumed, size) = loop {
            match httparse::parse_chunk_size(&buf) {
                Ok(httparse::Status::Complete(pair)) => break pair,
                Ok(httparse::Status::Partial) => fill(stream, &mut buf).await?,
                Err(_) => return Err(TransportError::InvalidChunk),
            }
        };
        buf.advance(consumed);

        if size == 0 {
            return Ok(body.freeze());
        }

        let size = usize::try_from(size).map_err(|_| TransportError::InvalidChunk)?;
        while buf.len() < size + 2 {
            fill(stream, &mut buf).await?;
        }
        if &buf[size..size + 2] != b"\r\n" {
            return Err(TransportError::InvalidChunk);
        }
        body.extend_from_slice(&buf[..size]);
        buf.advance(size + 2);
    }
}

/// Yields exactly `remaining` bytes of `inner`.
///
/// Bytes past the limit are never read. EOF before the limit is an
/// [`io::ErrorKind::UnexpectedEof`] error rather than a short body.
struct ExactLength<R> {
    inner: tokio::io::Take<R>,
    remaining: u64,
}

impl<R: AsyncRead> ExactLength<R> {
    fn new(inner: R, len: u64) -> Self {
        Self {
            inner: inner.take(len),
            remaining: len,
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ExactLength<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.remaining == 0 || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let read = (buf.filled().len() - before) as u64;
        if read == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("body ended {} bytes short of Content-Length", this.remaining),
            )));
        }
        this.remaining -= read;
        Poll::Ready(Ok(()))
    }
}

/// Reads more bytes into `buf`, failing if the peer has closed.
async fn fill<S>(stream: &mut S, buf: &mut BytesMut) -> std::result::Result<(), TransportError>
where
    S: AsyncRead + Unpin,
{
    if stream.read_buf(buf).await? == 0 {
        return Err(TransportError::IncompleteResponse);
    }
    Ok(())
}
