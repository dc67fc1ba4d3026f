//! Caching transport and scheduler against a real origin over loopback TCP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use rtcache::background::{Scheduler, SchedulerConfig};
use rtcache::http::{Request, Response, StatusCode};
use rtcache::cache::SnapshotError;
use rtcache::server::Server;
use rtcache::transport::{CachingTransport, HttpTransport, Transport, TransportError};

/// Starts an origin that counts requests and sets duplicate headers.
async fn origin() -> (SocketAddr, Arc<AtomicUsize>) {
    let server = Server::bind("127.0.0.1:0").await.unwrap();
    let addr = server.local_addr();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(server.run(move |request: Request| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            Response::new(StatusCode::OK)
                .header("Set-Cookie", "a=1")
                .header("Set-Cookie", "b=2")
                .header("X-Path", request.path())
                .body(format!("You got here #{n}"))
        }
    }));

    (addr, hits)
}

#[tokio::test]
async fn second_request_is_served_from_cache() {
    let (addr, hits) = origin().await;
    let transport = CachingTransport::http();
    let request = Request::get(&format!("http://{addr}/x")).unwrap();

    let first = transport.round_trip(&request).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.bytes().await.unwrap(), "You got here #1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let second = transport.round_trip(&request).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.reason(), "OK");
    let cookies: Vec<_> = second.headers().get_all("set-cookie").collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);
    assert_eq!(second.headers().get("x-path"), Some("/x"));
    assert_eq!(second.bytes().await.unwrap(), "You got here #1");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    transport.clear();
    let third = transport.round_trip(&request).await.unwrap();
    assert_eq!(third.bytes().await.unwrap(), "You got here #2");
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

/// Answers every connection with `reply` verbatim and then closes it.
async fn raw_origin(reply: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
        }
    });

    (addr, hits)
}

#[tokio::test]
async fn truncated_body_is_reported_and_never_cached() {
    let (addr, hits) = raw_origin(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n").await;
    let transport = CachingTransport::http();
    let request = Request::get(&format!("http://{addr}/")).unwrap();

    for attempt in 1..=2 {
        let err = transport.round_trip(&request).await.unwrap_err();
        assert!(
            matches!(
                &err,
                rtcache::Error::Snapshot(SnapshotError::Body(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof
            ),
            "{err:?}"
        );
        assert!(transport.store().is_empty());
        assert_eq!(hits.load(Ordering::SeqCst), attempt);
    }
    assert_eq!(transport.stats().hits, 0);
}

#[tokio::test]
async fn obs_text_header_survives_cache_replay() {
    let (addr, hits) =
        raw_origin(b"HTTP/1.1 200 OK\r\nX-Name: caf\xe9\r\nContent-Length: 2\r\n\r\nok").await;
    let transport = CachingTransport::http();
    let request = Request::get(&format!("http://{addr}/")).unwrap();

    let first = transport.round_trip(&request).await.unwrap();
    assert_eq!(first.headers().get_bytes("x-name"), Some(&b"caf\xe9"[..]));
    assert_eq!(first.bytes().await.unwrap(), "ok");

    let second = transport.round_trip(&request).await.unwrap();
    assert_eq!(second.headers().get_bytes("x-name"), Some(&b"caf\xe9"[..]));
    assert_eq!(second.bytes().await.unwrap(), "ok");
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_urls_get_distinct_entries() {
    let (addr, hits) = origin().await;
    let transport = CachingTransport::http();

    for path in ["/a", "/b", "/a?q=1", "/a"] {
        let request = Request::get(&format!("http://{addr}{path}")).unwrap();
        transport.round_trip(&request).await.unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 3);
    assert_eq!(transport.store().len(), 3);
}

#[tokio::test]
async fn unreachable_origin_is_a_transport_error() {
    // Bind then drop to get a port with nothing listening.
    let addr = {
        let server = Server::bind("127.0.0.1:0").await.unwrap();
        server.local_addr()
    };
    let transport = CachingTransport::new(Arc::new(HttpTransport::new()));
    let request = Request::get(&format!("http://{addr}/")).unwrap();

    let err = transport.round_trip(&request).await.unwrap_err();
    assert!(matches!(
        err,
        rtcache::Error::Transport(TransportError::Connect { .. })
    ));
    assert!(transport.store().is_empty());
}

#[tokio::test]
async fn scheduler_polls_real_origin() {
    let (addr, hits) = origin().await;
    let transport = Arc::new(CachingTransport::http());
    let request = Request::get(&format!("http://{addr}/")).unwrap();
    let config = SchedulerConfig {
        request_interval_ms: 10,
        clear_interval_ms: 80,
        request_timeout_ms: 1_000,
    };
    let mut scheduler = Scheduler::new(Arc::clone(&transport), request, config).unwrap();

    let summary = scheduler
        .run(tokio::time::sleep(Duration::from_millis(200)))
        .await;

    assert!(summary.requests >= 3, "{summary:?}");
    assert_eq!(summary.failures, 0);
    let origin_hits = hits.load(Ordering::SeqCst) as u64;
    assert!(origin_hits <= summary.clears + 1, "{summary:?} origin={origin_hits}");
    assert!(transport.stats().hits > 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(hits.load(Ordering::SeqCst) as u64, origin_hits);
}
