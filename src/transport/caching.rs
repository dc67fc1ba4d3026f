//! Response-caching transport layer.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use super::{BoxFuture, HttpTransport, Transport};
use crate::Result;
use crate::cache::{CacheKey, CacheStore, KeyPolicy, Snapshot};
use crate::http::{Request, Response};

/// Hit and miss counters of a [`CachingTransport`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// A [`Transport`] that answers repeated requests from a [`CacheStore`].
///
/// On a hit the stored snapshot is replayed and the delegate is not
/// contacted. On a miss the delegate's response is captured in full, stored,
/// and handed back with an in-memory body carrying the same bytes.
///
/// Two concurrent misses for one key both reach the delegate; whichever
/// stores last wins. Delegate errors are returned as-is and never cached.
///
/// # Examples
///
/// ```rust,no_run
/// use rtcache::http::Request;
/// use rtcache::transport::{CachingTransport, Transport, TransportError};
///
/// # async fn demo() -> rtcache::Result<()> {
/// let transport = CachingTransport::http();
/// let request = Request::get("http://localhost:8000/").expect("valid url");
///
/// let first = transport.round_trip(&request).await?;  // fetched from source
/// let second = transport.round_trip(&request).await?; // served from cache
/// assert_eq!(
///     first.bytes().await.map_err(TransportError::Io)?,
///     second.bytes().await.map_err(TransportError::Io)?,
/// );
/// assert_eq!(transport.stats().hits, 1);
/// # Ok(())
/// # }
/// ```
pub struct CachingTransport {
    store: CacheStore,
    delegate: Arc<dyn Transport>,
    policy: KeyPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachingTransport {
    /// Wraps `delegate` with an empty cache keyed by URL.
    pub fn new(delegate: Arc<dyn Transport>) -> Self {
        Self {
            store: CacheStore::new(),
            delegate,
            policy: KeyPolicy::default(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// A caching layer over a default [`HttpTransport`].
    pub fn http() -> Self {
        Self::new(Arc::new(HttpTransport::new()))
    }

    #[must_use]
    pub fn with_key_policy(mut self, policy: KeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.policy
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Drops every cached response.
    pub fn clear(&self) {
        self.store.clear();
        debug!("response cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    async fn cached_round_trip(&self, request: &Request) -> Result<Response> {
        let key = CacheKey::for_request(request, self.policy);

        if let Some(snapshot) = self.store.get(&key) {
            match snapshot.replay(request.url()) {
                Ok(response) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    info!(%key, status = response.status().as_u16(), "served from cache");
                    return Ok(response);
                }
                // Refetching overwrites the unreadable entry.
                Err(e) => warn!(%key, error = %e, "unreadable cache entry, refetching"),
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let response = self.delegate.round_trip(request).await?;
        let (snapshot, response) = Snapshot::capture(response, request.method()).await?;
        self.store.set(key.clone(), snapshot);

        info!(%key, status = response.status().as_u16(), "fetched from source");
        Ok(response)
    }
}

impl Transport for CachingTransport {
    fn round_trip<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
        Box::pin(self.cached_round_trip(request))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::Error;
    use crate::cache::SnapshotError;
    use crate::http::{Body, Method, StatusCode};
    use crate::transport::TransportError;

    /// Counts calls and answers `200 ok` with a streamed body, or fails.
    #[derive(Default)]
    struct Origin {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Origin {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Transport for Origin {
        fn round_trip<'a>(&'a self, request: &'a Request) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if self.fail {
                    return Err(TransportError::IncompleteResponse.into());
                }
                let body = format!("ok {} {}", request.method(), n);
                Ok(Response::new(StatusCode::OK)
                    .header("Content-Length", body.len().to_string())
                    .header("X-Dup", "1")
                    .header("X-Dup", "2")
                    .body(Body::from_reader(std::io::Cursor::new(body.into_bytes()))))
            })
        }
    }

    fn caching(origin: &Arc<Origin>) -> CachingTransport {
        CachingTransport::new(Arc::clone(origin) as Arc<dyn Transport>)
    }

    fn get(url: &str) -> Request {
        Request::get(url).unwrap()
    }

    #[tokio::test]
    async fn miss_then_hit_skips_delegate() {
        let origin = Arc::new(Origin::default());
        let transport = caching(&origin);
        let request = get("http://localhost:8000/x");

        let first = transport.round_trip(&request).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        assert_eq!(first.bytes().await.unwrap(), "ok GET 1");
        assert_eq!(origin.calls(), 1);
        assert_eq!(transport.store().len(), 1);

        let second = transport.round_trip(&request).await.unwrap();
        assert_eq!(second.status(), StatusCode::OK);
        assert_eq!(second.url(), Some(request.url()));
        let dups: Vec<_> = second.headers().get_all("x-dup").collect();
        assert_eq!(dups, vec!["1", "2"]);
        assert_eq!(second.bytes().await.unwrap(), "ok GET 1");

        assert_eq!(origin.calls(), 1);
        assert_eq!(transport.store().len(), 1);
        assert_eq!(transport.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[tokio::test]
    async fn clear_forces_refetch() {
        let origin = Arc::new(Origin::default());
        let transport = caching(&origin);
        let request = get("http://localhost:8000/x");

        transport.round_trip(&request).await.unwrap();
        transport.round_trip(&request).await.unwrap();
        assert_eq!(origin.calls(), 1);

        transport.clear();
        let third = transport.round_trip(&request).await.unwrap();
        assert_eq!(origin.calls(), 2);
        assert_eq!(third.bytes().await.unwrap(), "ok GET 2");
    }

    #[tokio::test]
    async fn delegate_errors_are_not_cached() {
        let origin = Arc::new(Origin {
            fail: true,
            ..Origin::default()
        });
        let transport = caching(&origin);
        let request = get("http://localhost:8000/down");

        let err = transport.round_trip(&request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Transport(TransportError::IncompleteResponse)
        ));
        assert!(transport.store().is_empty());

        transport.round_trip(&request).await.unwrap_err();
        assert_eq!(origin.calls(), 2);
    }

    #[tokio::test]
    async fn unreadable_entry_is_a_miss() {
        let origin = Arc::new(Origin::default());
        let transport = caching(&origin);
        let request = get("http://localhost:8000/x");
        let key = CacheKey::for_request(&request, KeyPolicy::Url);
        transport
            .store()
            .set(key.clone(), Snapshot::from_wire("garbage"));

        let response = transport.round_trip(&request).await.unwrap();
        assert_eq!(response.bytes().await.unwrap(), "ok GET 1");
        assert_eq!(origin.calls(), 1);
        assert!(transport.store().get(&key).unwrap().decode().is_ok());
    }

    #[tokio::test]
    async fn capture_failure_is_reported_and_not_stored() {
        struct Lying;
        impl Transport for Lying {
            fn round_trip<'a>(&'a self, _: &'a Request) -> BoxFuture<'a, Result<Response>> {
                Box::pin(async {
                    Ok(Response::new(StatusCode::OK)
                        .header("Content-Length", "10")
                        .body("abc"))
                })
            }
        }

        let transport = CachingTransport::new(Arc::new(Lying));
        let err = transport
            .round_trip(&get("http://localhost/lie"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Snapshot(SnapshotError::LengthMismatch { .. })
        ));
        assert!(transport.store().is_empty());
    }

    /// Advertises a seven byte body but sends none.
    struct EmptyBody;

    impl Transport for EmptyBody {
        fn round_trip<'a>(&'a self, _: &'a Request) -> BoxFuture<'a, Result<Response>> {
            Box::pin(async { Ok(Response::new(StatusCode::OK).header("Content-Length", "7")) })
        }
    }

    #[tokio::test]
    async fn empty_body_is_cached_only_for_head() {
        let transport = CachingTransport::new(Arc::new(EmptyBody))
            .with_key_policy(KeyPolicy::MethodAndUrl);
        let url = "http://localhost/size";

        let err = transport.round_trip(&get(url)).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Snapshot(SnapshotError::LengthMismatch {
                declared: 7,
                actual: 0
            })
        ));
        assert!(transport.store().is_empty());

        let head = Request::new(Method::Head, url).unwrap();
        transport.round_trip(&head).await.unwrap();
        let replayed = transport.round_trip(&head).await.unwrap();
        assert_eq!(replayed.headers().content_length(), Some(7));
        assert!(replayed.bytes().await.unwrap().is_empty());
        assert_eq!(transport.stats(), CacheStats { hits: 1, misses: 2 });
    }

    #[tokio::test]
    async fn url_policy_shares_entry_across_methods() {
        let origin = Arc::new(Origin::default());
        let transport = caching(&origin);
        let url = "http://localhost:8000/x";

        transport.round_trip(&get(url)).await.unwrap();
        let post = Request::new(Method::Post, url).unwrap().body("payload");
        let response = transport.round_trip(&post).await.unwrap();

        assert_eq!(origin.calls(), 1);
        assert_eq!(response.bytes().await.unwrap(), "ok GET 1");
    }

    #[tokio::test]
    async fn method_policy_separates_entries() {
        let origin = Arc::new(Origin::default());
        let transport = caching(&origin).with_key_policy(KeyPolicy::MethodAndUrl);
        let url = "http://localhost:8000/x";

        transport.round_trip(&get(url)).await.unwrap();
        let post = Request::new(Method::Post, url).unwrap();
        let response = transport.round_trip(&post).await.unwrap();

        assert_eq!(origin.calls(), 2);
        assert_eq!(response.bytes().await.unwrap(), "ok POST 2");
        assert_eq!(transport.store().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_with_interleaved_clears() {
        let origin = Arc::new(Origin::default());
        let transport = Arc::new(caching(&origin));

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let transport = Arc::clone(&transport);
                tokio::spawn(async move {
                    let request = get(&format!("http://localhost:8000/{}", i % 4));
                    if i % 8 == 0 {
                        transport.clear();
                    }
                    let response = transport.round_trip(&request).await.unwrap();
                    assert_eq!(response.status(), StatusCode::OK);
                    assert!(response.bytes().await.unwrap().starts_with(b"ok GET "));
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }

        let stats = transport.stats();
        assert_eq!(stats.hits + stats.misses, 32);
        assert_eq!(stats.misses as usize, origin.calls());
        assert!(transport.store().len() <= 4);
    }
}
