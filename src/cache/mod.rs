//! In-memory response cache.
//!
//! [`CacheStore`] maps a [`CacheKey`] to a [`Snapshot`] behind a
//! reader/writer lock: any number of concurrent lookups, while inserts and
//! clears run exclusively. There is no eviction; the whole map is dropped at
//! once by [`CacheStore::clear`].

use std::collections::HashMap;
use std::fmt;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::http::Request;

pub mod snapshot;

pub use snapshot::{Snapshot, SnapshotError};

/// Which parts of a request identify its cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyPolicy {
    /// Only the full URL. A `GET` and a `POST` to the same URL share an entry.
    #[default]
    Url,
    /// The method followed by the full URL.
    MethodAndUrl,
}

impl std::str::FromStr for KeyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "url" => Ok(Self::Url),
            "method-and-url" => Ok(Self::MethodAndUrl),
            other => Err(format!(
                "unknown key policy {other:?} (expected \"url\" or \"method-and-url\")"
            )),
        }
    }
}

/// Deterministic identifier of a cacheable request.
///
/// # Examples
///
/// ```
/// use rtcache::cache::{CacheKey, KeyPolicy};
/// use rtcache::http::{Method, Request};
///
/// let get = Request::get("http://localhost:8000/x").unwrap();
/// let post = Request::new(Method::Post, "http://localhost:8000/x").unwrap();
///
/// assert_eq!(CacheKey::for_request(&get, KeyPolicy::Url), CacheKey::for_request(&post, KeyPolicy::Url));
/// assert_ne!(
///     CacheKey::for_request(&get, KeyPolicy::MethodAndUrl),
///     CacheKey::for_request(&post, KeyPolicy::MethodAndUrl),
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &Request, policy: KeyPolicy) -> Self {
        match policy {
            KeyPolicy::Url => Self(request.url().as_str().to_owned()),
            KeyPolicy::MethodAndUrl => Self(format!("{} {}", request.method(), request.url())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

/// Thread-safe map from [`CacheKey`] to [`Snapshot`].
///
/// Lookups hand out cheap clones, so no caller ever holds a reference into
/// the map once a call returns.
#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<CacheKey, Snapshot>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the snapshot stored under `key`. `None` is a miss.
    pub fn get(&self, key: &CacheKey) -> Option<Snapshot> {
        self.entries.read().get(key).cloned()
    }

    /// Inserts or overwrites the entry for `key`.
    pub fn set(&self, key: CacheKey, snapshot: Snapshot) {
        self.entries.write().insert(key, snapshot);
    }

    /// Replaces the whole map with an empty one.
    ///
    /// A `set` racing with this either lands before (and is erased) or after
    /// (and survives); readers see the full map or the empty one.
    pub fn clear(&self) {
        let previous = std::mem::take(&mut *self.entries.write());
        // Free the old entries outside the lock.
        drop(previous);
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
