//! Cache configuration.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Status codes cached when no allowlist is configured.
pub const DEFAULT_CACHEABLE_STATUS_CODES: [u16; 3] = [200, 301, 404];

/// Options recognized by the [`CacheEngine`](super::CacheEngine).
///
/// Every field has a default, so a partial JSON document is a valid
/// configuration.
///
/// # Examples
///
/// ```
/// use semcache::cache::CacheOptions;
///
/// let options = CacheOptions::from_json(r#"{ "private_caching": true }"#).unwrap();
/// assert!(options.public_caching);
/// assert!(options.private_caching);
/// assert!(!options.vary_caching);
/// assert!(options.is_cacheable_status(301u16));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Master switch: when off the engine forwards every request untouched.
    pub public_caching: bool,
    /// Store responses marked `Cache-Control: private`.
    pub private_caching: bool,
    /// Store responses carrying `Vary`, and fold the User-Agent class into keys.
    pub vary_caching: bool,
    /// Response status codes eligible for storage.
    pub cacheable_status_codes: BTreeSet<u16>,
    /// Include the request path in the cache key.
    pub key_includes_path: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            public_caching: true,
            private_caching: false,
            vary_caching: false,
            cacheable_status_codes: BTreeSet::from(DEFAULT_CACHEABLE_STATUS_CODES),
            key_includes_path: true,
        }
    }
}

impl CacheOptions {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses options from a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn with_public_caching(mut self, enabled: bool) -> Self {
        self.public_caching = enabled;
        self
    }

    #[must_use]
    pub fn with_private_caching(mut self, enabled: bool) -> Self {
        self.private_caching = enabled;
        self
    }

    #[must_use]
    pub fn with_vary_caching(mut self, enabled: bool) -> Self {
        self.vary_caching = enabled;
        self
    }

    /// Replaces the cacheable status allowlist.
    #[must_use]
    pub fn with_cacheable_status_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.cacheable_status_codes = codes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_key_includes_path(mut self, enabled: bool) -> Self {
        self.key_includes_path = enabled;
        self
    }

    /// Adds a status code to the allowlist.
    pub fn add_cacheable_status(&mut self, code: u16) -> &mut Self {
        self.cacheable_status_codes.insert(code);
        self
    }

    /// Removes a status code from the allowlist.
    pub fn remove_cacheable_status(&mut self, code: u16) -> &mut Self {
        self.cacheable_status_codes.remove(&code);
        self
    }

    /// Returns `true` when the engine should take part in request handling.
    pub fn is_enabled(&self) -> bool {
        self.public_caching
    }

    pub fn is_cacheable_status(&self, status: impl Into<u16>) -> bool {
        self.cacheable_status_codes.contains(&status.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn defaults() {
        let options = CacheOptions::default();
        assert!(options.is_enabled());
        assert!(!options.private_caching);
        assert!(!options.vary_caching);
        assert!(options.key_includes_path);
        for code in DEFAULT_CACHEABLE_STATUS_CODES {
            assert!(options.is_cacheable_status(code));
        }
        assert!(!options.is_cacheable_status(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn allowlist_edits() {
        let mut options = CacheOptions::new();
        options.add_cacheable_status(203).remove_cacheable_status(404);
        assert!(options.is_cacheable_status(203u16));
        assert!(!options.is_cacheable_status(404u16));
    }

    #[test]
    fn json_overrides() {
        let options = CacheOptions::from_json(
            r#"{ "public_caching": false, "cacheable_status_codes": [200] }"#,
        )
        .unwrap();
        assert!(!options.is_enabled());
        assert_eq!(options.cacheable_status_codes, BTreeSet::from([200]));
    }

    #[test]
    fn json_rejects_wrong_types() {
        assert!(CacheOptions::from_json(r#"{ "vary_caching": "yes" }"#).is_err());
    }
}
