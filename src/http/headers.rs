//! Ordered, multi-value HTTP header list.
//!
//! Names compare case-insensitively but are stored exactly as received, so a
//! response captured into the cache is replayed with the same header spelling,
//! order and duplicates it arrived with. Values are kept as raw bytes: HTTP
//! allows obs-text (bytes above 0x7f) in field values and those must survive
//! a replay unchanged.

use bytes::{BufMut, Bytes, BytesMut};

/// A case-insensitive, multi-value HTTP header map.
///
/// # Examples
///
/// ```
/// use rtcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.append("Set-Cookie", "a=1");
/// headers.append("Set-Cookie", "b=2");
/// headers.set("content-length", "12");
///
/// assert_eq!(headers.content_length(), Some(12));
/// let cookies: Vec<_> = headers.get_all("set-cookie").collect();
/// assert_eq!(cookies, vec!["a=1", "b=2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, Bytes)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Copies the headers produced by an `httparse` parse, preserving order
    /// and the exact value bytes.
    pub fn from_parsed(raw: &[httparse::Header<'_>]) -> Self {
        let mut headers = Self::with_capacity(raw.len());
        for header in raw {
            headers.append(header.name, header.value);
        }
        headers
    }

    /// Appends an entry. Existing values for the same name are kept.
    pub fn append(&mut self, name: impl Into<String>, value: impl AsRef<[u8]>) {
        let value = Bytes::copy_from_slice(value.as_ref());
        self.entries.push((name.into(), value));
    }

    /// Replaces every value for `name` with a single entry.
    ///
    /// The new entry takes the position of the first removed one, or goes last
    /// if the name was absent.
    pub fn set(&mut self, name: impl Into<String>, value: impl AsRef<[u8]>) {
        let name = name.into();
        let value = Bytes::copy_from_slice(value.as_ref());
        match self.position(&name) {
            Some(idx) => {
                self.entries[idx] = (name.clone(), value);
                let mut seen = 0usize;
                self.entries.retain(|(k, _)| {
                    if !k.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Returns the first value for `name` as text.
    ///
    /// `None` when the header is absent or its first value is not UTF-8; use
    /// [`get_bytes`](Self::get_bytes) for the raw value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_bytes(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Returns the first value for `name` exactly as stored.
    pub fn get_bytes(&self, name: &str) -> Option<&[u8]> {
        self.position(name).map(|idx| self.entries[idx].1.as_ref())
    }

    /// Returns all UTF-8 values for `name` in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .filter_map(|(_, v)| std::str::from_utf8(v).ok())
    }

    /// Removes every entry named `name`. Returns `true` if anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.entries.len() < before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of entries, counting duplicates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Parses `Content-Length`. `None` when absent or not a plain integer.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.trim().parse().ok()
    }

    /// Returns `true` if the final transfer coding is `chunked`.
    pub fn is_chunked(&self) -> bool {
        self.get_all("transfer-encoding")
            .flat_map(|v| v.split(','))
            .last()
            .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
    }

    /// Writes the header block in wire form, one `Name: value\r\n` per entry.
    pub fn write_to(&self, buf: &mut BytesMut) {
        for (name, value) in &self.entries {
            buf.put(name.as_bytes());
            buf.put(&b": "[..]);
            buf.put(value.as_ref());
            buf.put(&b"\r\n"[..]);
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k.eq_ignore_ascii_case(name))
    }
}
