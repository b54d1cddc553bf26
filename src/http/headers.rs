//! HTTP header map with case-insensitive name lookup.
//!
//! HTTP headers are order-preserving and case-insensitive per [RFC 9110 §5].

use std::fmt;

use serde::{Deserialize, Serialize};

/// A case-insensitive, multi-value HTTP header map.
///
/// Preserves insertion order and allows multiple values per header name, so a
/// response carrying two `Cache-Control` lines round-trips through the cache
/// exactly as the origin sent it.
///
/// # Examples
///
/// ```
/// use semcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Cache-Control", "public");
/// headers.insert("Cache-Control", "max-age=600");
///
/// let all: Vec<_> = headers.get_all("cache-control").collect();
/// assert_eq!(all, vec!["public", "max-age=600"]);
///
/// let tokens: Vec<_> = headers.tokens("cache-control").collect();
/// assert_eq!(tokens, vec!["public", "max-age=600"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a header map with pre-allocated capacity for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replaces every entry for `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.inner.push((name, value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns an iterator over all values for the given header name (case-insensitive).
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the comma-separated list elements of every `name` line, trimmed,
    /// with empty elements skipped.
    ///
    /// Case is preserved; callers that compare tokens normalize them.
    pub fn tokens<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.get_all(name)
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    /// Removes all entries with the given header name (case-insensitive).
    ///
    /// Returns `true` if any entries were removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.inner.len();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.inner.len() < before
    }

    /// Returns `true` if the map contains at least one entry with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Returns the total number of header entries (not unique names).
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if there are no header entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

impl<N, V> FromIterator<(N, V)> for Headers
where
    N: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_insensitive_get() {
        let mut h = Headers::new();
        h.insert("ETag", "\"v1\"");
        assert_eq!(h.get("etag"), Some("\"v1\""));
        assert_eq!(h.get("ETAG"), Some("\"v1\""));
    }

    #[test]
    fn set_replaces_all_values() {
        let mut h = Headers::new();
        h.insert("Age", "10");
        h.insert("age", "20");
        h.set("Age", "3");
        let vals: Vec<_> = h.get_all("age").collect();
        assert_eq!(vals, vec!["3"]);
    }

    #[test]
    fn tokens_flatten_lines() {
        let h: Headers = [("Vary", "Accept-Encoding, User-Agent"), ("vary", " ,Accept-Language")]
            .into_iter()
            .collect();
        let tokens: Vec<_> = h.tokens("vary").collect();
        assert_eq!(tokens, vec!["Accept-Encoding", "User-Agent", "Accept-Language"]);
    }

    #[test]
    fn remove_reports_absence() {
        let mut h = Headers::new();
        h.insert("If-None-Match", "\"a\"");
        assert!(h.remove("if-none-match"));
        assert!(h.is_empty());
        assert!(!h.remove("if-none-match"));
    }
}
