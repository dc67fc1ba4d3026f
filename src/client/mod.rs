//! Request issuing with an overall deadline.
//!
//! Transports leave timing to their caller. [`Client`] bounds the whole
//! exchange, including reading the response body, by one timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::Result;
use crate::http::{Body, Request, Response};
use crate::transport::{Transport, TransportError};

/// Sends requests through a shared [`Transport`] under a deadline.
///
/// Responses come back fully buffered, so once `send` returns no further
/// network I/O happens.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use rtcache::client::Client;
/// use rtcache::http::Request;
/// use rtcache::transport::{CachingTransport, TransportError};
///
/// # async fn demo() -> rtcache::Result<()> {
/// let client = Client::new(Arc::new(CachingTransport::http())).timeout(Duration::from_secs(2));
/// let response = client.send(&Request::get("http://localhost:8000/").expect("valid url")).await?;
/// println!("{:?}", response.bytes().await.map_err(TransportError::Io)?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Client {
    /// Default overall deadline per request.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Performs the round trip and buffers the body.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if the deadline passes first. An
    ///   in-progress cache capture is abandoned and nothing is stored.
    /// - [`TransportError::Io`] if reading the body fails.
    /// - Whatever the transport returns.
    pub async fn send(&self, request: &Request) -> Result<Response> {
        let exchange = async {
            let response = self.transport.round_trip(request).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await.map_err(TransportError::Io)?;
            Ok::<_, crate::Error>(Response::from_parts(parts, Body::from(body)))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::http::StatusCode;
    use crate::transport::BoxFuture;

    struct Delayed(Duration);

    impl Transport for Delayed {
        fn round_trip<'a>(&'a self, _: &'a Request) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async move {
                tokio::time::sleep(self.0).await;
                Ok(Response::new(StatusCode::OK).body(Body::from_reader(std::io::Cursor::new(
                    b"late".to_vec(),
                ))))
            })
        }
    }

    #[tokio::test]
    async fn buffers_body_within_deadline() {
        let client = Client::new(Arc::new(Delayed(Duration::ZERO)));
        let response = client
            .send(&Request::get("http://localhost/").unwrap())
            .await
            .unwrap();
        let body = response.into_body();
        assert_eq!(body.as_bytes().map(|b| b.to_vec()), Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn slow_transport_times_out() {
        let client = Client::new(Arc::new(Delayed(Duration::from_secs(10))))
            .timeout(Duration::from_millis(20));
        let err = client
            .send(&Request::get("http://localhost/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout(d)) if d == Duration::from_millis(20)));
    }
}
