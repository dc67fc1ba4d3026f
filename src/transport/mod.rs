//! The transport contract and its implementations.
//!
//! A [`Transport`] sends one [`Request`] and yields one [`Response`]. Layers
//! compose by holding another transport: [`CachingTransport`] wraps any
//! delegate, typically an [`HttpTransport`].
//!
//! ## Core types
//!
//! - [`Transport`] — the round-trip trait, object safe so delegates can be
//!   stored as `Arc<dyn Transport>`.
//! - [`TransportError`] — network and protocol failures of a delegate.
//! - [`HttpTransport`] — plain HTTP/1.1 over TCP.
//! - [`CachingTransport`] — serves snapshots from a [`CacheStore`](crate::cache::CacheStore).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

use crate::Result;
use crate::http::{Request, Response};

pub mod caching;
pub mod http;

pub use caching::{CacheStats, CachingTransport};
pub use http::HttpTransport;

/// A pinned, boxed, `Send` future, the return type of [`Transport::round_trip`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Failures raised while talking to the network.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("URL {0} has no host")]
    InvalidUrl(String),

    #[error("unsupported URL scheme {0:?}; only http is supported")]
    UnsupportedScheme(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    MalformedResponse(#[from] httparse::Error),

    #[error("connection closed before the response was complete")]
    IncompleteResponse,

    #[error("invalid chunked body")]
    InvalidChunk,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// The capability of sending a request and receiving its response.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`: one transport is shared by
///   every caller.
/// - A returned response's body may be a read-once stream; the caller owns it.
/// - Errors are returned, never retried here.
///
/// # Examples
///
/// ```rust
/// use rtcache::http::{Request, Response, StatusCode};
/// use rtcache::transport::{BoxFuture, Transport};
///
/// struct Fixed;
///
/// impl Transport for Fixed {
///     fn round_trip<'a>(&'a self, _request: &'a Request) -> BoxFuture<'a, rtcache::Result<Response>> {
///         Box::pin(async { Ok(Response::new(StatusCode::OK).body("fixed")) })
///     }
/// }
/// ```
pub trait Transport: Send + Sync {
    /// Sends `request` and returns its response.
    fn round_trip<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>>;
}
