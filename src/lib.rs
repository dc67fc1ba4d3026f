//! # rtcache
//!
//! A self-invalidating HTTP response cache placed in the client transport
//! layer.
//!
//! [`CachingTransport`] wraps any [`Transport`]. It replays wire-format
//! snapshots of responses it has already seen and captures new ones on a
//! miss. [`Scheduler`] drives periodic requests through it, periodically
//! clears the cache, and stops when a shutdown future resolves.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rtcache::background::{Scheduler, SchedulerConfig, shutdown_signal};
//! use rtcache::http::Request;
//! use rtcache::transport::CachingTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(CachingTransport::http());
//!     let request = Request::get("http://localhost:8000/")?;
//!     let mut scheduler = Scheduler::new(transport, request, SchedulerConfig::default())?;
//!     let summary = scheduler.run(shutdown_signal()).await;
//!     println!("{summary:?}");
//!     Ok(())
//! }
//! ```

use thiserror::Error;

pub mod background;
pub mod cache;
pub mod client;
pub mod http;
pub mod server;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use background::{Scheduler, SchedulerConfig};
pub use cache::{CacheKey, CacheStore, KeyPolicy, Snapshot, SnapshotError};
pub use client::Client;
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
pub use transport::{CachingTransport, HttpTransport, Transport, TransportError};

/// Error returned by a [`Transport`] round trip.
#[derive(Debug, Error)]
pub enum Error {
    /// The delegate transport failed: connect, I/O, protocol or timeout.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A response could not be captured into, or replayed from, a snapshot.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
