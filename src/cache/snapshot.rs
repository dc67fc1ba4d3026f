//! Wire-format response snapshots.
//!
//! A [`Snapshot`] is the complete HTTP/1.x byte form of a response: status
//! line, every header in its original order (duplicates included), a blank
//! line, then the body. The body is whatever follows the header block, so a
//! snapshot never depends on the connection it was read from.
//!
//! A declared `Content-Length` must match the body exactly. The one exception
//! is a response that carries no body by definition: `1xx`, `204` and `304`
//! statuses, and any response to a `HEAD` request. Those keep the length the
//! server advertised while the body stays empty.

use std::io;

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use crate::http::response::Parts;
use crate::http::{Body, Headers, Method, Response, StatusCode, Version};

/// Capture or replay failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot ends before the header block is complete")]
    Incomplete,

    #[error("snapshot is not a valid HTTP response: {0}")]
    Parse(#[from] httparse::Error),

    #[error("status code {0} is out of range")]
    InvalidStatus(u16),

    #[error("Content-Length is {declared} but the body has {actual} bytes")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("failed to read response body: {0}")]
    Body(#[source] io::Error),
}

/// Immutable wire bytes of a captured response. Cloning is a refcount bump.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    wire: Bytes,
    /// The response answers a `HEAD` request, so its body is empty whatever
    /// `Content-Length` says.
    head: bool,
}

impl Snapshot {
    const MAX_HEADERS: usize = 128;

    /// Encodes a head and a fully buffered body.
    pub fn encode(parts: &Parts, body: &[u8]) -> Self {
        Self {
            wire: parts.write_wire(body).freeze(),
            head: false,
        }
    }

    /// Wraps bytes that are expected to hold a wire-format response.
    ///
    /// Nothing is validated until [`decode`](Self::decode).
    pub fn from_wire(bytes: impl Into<Bytes>) -> Self {
        Self {
            wire: bytes.into(),
            head: false,
        }
    }

    /// Drains `response`'s body and snapshots it. `method` is the method of
    /// the request the response answers.
    ///
    /// Returns the snapshot together with an equivalent response whose body
    /// is an in-memory copy of the bytes just read, since the original stream
    /// can only be consumed once.
    ///
    /// # Errors
    ///
    /// [`SnapshotError::Body`] if the body stream fails, including a body
    /// that ends before its declared length. Any decode error if the captured
    /// bytes would not replay.
    pub async fn capture(
        response: Response,
        method: &Method,
    ) -> Result<(Self, Response), SnapshotError> {
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(SnapshotError::Body)?;

        let snapshot = Self {
            head: *method == Method::Head,
            ..Self::encode(&parts, &body)
        };
        snapshot.decode()?;

        Ok((snapshot, Response::from_parts(parts, Body::from(body))))
    }

    /// Parses the snapshot back into its head and body.
    ///
    /// A declared `Content-Length` must match the body unless the response
    /// is bodiless by definition and the body is in fact empty.
    pub fn decode(&self) -> Result<(Parts, Bytes), SnapshotError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(&self.wire)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(SnapshotError::Incomplete),
        };

        let code = raw.code.ok_or(SnapshotError::Incomplete)?;
        let status = StatusCode::from_u16(code).ok_or(SnapshotError::InvalidStatus(code))?;
        let version = raw.version.map(Version::from_minor).unwrap_or_default();
        let reason = raw.reason.unwrap_or_default().to_owned();
        let headers = Headers::from_parsed(raw.headers);

        let body = self.wire.slice(body_offset..);
        let bodiless = self.head || status.forbids_body();
        if let Some(declared) = headers.content_length() {
            if body.len() != declared && !(bodiless && body.is_empty()) {
                return Err(SnapshotError::LengthMismatch {
                    declared,
                    actual: body.len(),
                });
            }
        }

        let parts = Parts {
            version,
            status,
            reason,
            headers,
            url: None,
        };
        Ok((parts, body))
    }

    /// Rebuilds a fresh response answering `url`.
    pub fn replay(&self, url: &Url) -> Result<Response, SnapshotError> {
        let (mut parts, body) = self.decode()?;
        parts.url = Some(url.clone());
        Ok(Response::from_parts(parts, Body::from(body)))
    }

    pub fn as_bytes(&self) -> &Bytes {
        &self.wire
    }
}
