//! `Cache-Control` / `Expires` / `Date` parsing.
//!
//! [`DirectiveSet`] answers the two questions the engine asks of a response:
//! may it be stored at all, and for how long is it fresh.

use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::http::Headers;

/// Directive and header names the cache understands.
pub mod names {
    pub const PUBLIC: &str = "public";
    pub const PRIVATE: &str = "private";
    pub const NO_STORE: &str = "no-store";
    pub const NO_CACHE: &str = "no-cache";
    pub const MAX_AGE: &str = "max-age";
    pub const SHARED_MAX_AGE: &str = "s-maxage";
    pub const STALE_WHILE_REVALIDATE: &str = "stale-while-revalidate";
    pub const STALE_IF_ERROR: &str = "stale-if-error";

    pub const CACHE_CONTROL: &str = "Cache-Control";
    pub const EXPIRES: &str = "Expires";
    pub const DATE: &str = "Date";
    pub const ETAG: &str = "ETag";
    pub const VARY: &str = "Vary";
    pub const AGE: &str = "Age";
    pub const IF_NONE_MATCH: &str = "If-None-Match";
}

// Directives whose quoted field-name argument narrows rather than cancels them;
// the argument is ignored and the bare directive is kept.
const FIELD_QUALIFIED: [&str; 2] = [names::PRIVATE, names::NO_CACHE];

/// The cache-relevant directives of a single response, parsed once.
///
/// Construction never fails: a directive whose value cannot be parsed as an
/// integer is dropped, and the engine behaves as if it were absent.
///
/// # Examples
///
/// ```
/// use semcache::cache::DirectiveSet;
/// use semcache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Cache-Control", "public, max-age=600, stale-if-error=60");
///
/// let directives = DirectiveSet::parse(&headers);
/// assert!(directives.is_cacheable());
/// assert_eq!(directives.max_age(), 600);
/// assert_eq!(directives.stale_if_error(), 60);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveSet {
    flags: BTreeSet<String>,
    numeric: BTreeMap<String, i64>,
    expires: Option<SystemTime>,
    date: SystemTime,
    parsed_at: SystemTime,
    etag: Option<String>,
    vary: Option<String>,
}

impl DirectiveSet {
    /// Parses `headers` using the current wall clock as the parse time.
    pub fn parse(headers: &Headers) -> Self {
        Self::parse_at(headers, SystemTime::now())
    }

    /// Parses `headers` as if observed at `now`.
    ///
    /// `now` stands in for a missing or unreadable `Date` header and is the
    /// reference point for the `Expires` cacheability check.
    pub fn parse_at(headers: &Headers, now: SystemTime) -> Self {
        let mut flags = BTreeSet::new();
        let mut numeric = BTreeMap::new();

        for directive in headers.tokens(names::CACHE_CONTROL) {
            match directive.split_once('=') {
                None => {
                    flags.insert(directive.to_ascii_lowercase());
                }
                Some((name, value)) => {
                    let name = name.trim().to_ascii_lowercase();
                    if FIELD_QUALIFIED.contains(&name.as_str()) {
                        flags.insert(name);
                        continue;
                    }
                    if let Ok(seconds) = value.trim().trim_matches('"').trim().parse::<i64>() {
                        numeric.insert(name, seconds);
                    }
                }
            }
        }

        let date = headers
            .get(names::DATE)
            .and_then(|value| httpdate::parse_http_date(value.trim()).ok())
            .unwrap_or(now);

        // An unreadable Expires means "already expired" (RFC 9111 §5.3).
        let expires = headers.get(names::EXPIRES).map(|value| {
            httpdate::parse_http_date(value.trim()).unwrap_or(UNIX_EPOCH)
        });

        let vary = if headers.contains(names::VARY) {
            Some(headers.get_all(names::VARY).collect::<Vec<_>>().join(", "))
        } else {
            None
        };

        Self {
            flags,
            numeric,
            expires,
            date,
            parsed_at: now,
            etag: headers.get(names::ETAG).map(str::to_owned),
            vary,
        }
    }

    /// Returns `true` if a response with these directives may be stored.
    ///
    /// A response is refused when it carries `no-store` or `no-cache`, varies
    /// on `*`, claims to be both `public` and `private`, has no freshness
    /// policy at all, has a non-positive `s-maxage` (unless private) or
    /// `max-age`, or has an `Expires` that is not strictly in the future.
    pub fn is_cacheable(&self) -> bool {
        if self.no_store() || self.no_cache() {
            return false;
        }
        if self.variations().contains("*") {
            return false;
        }
        if self.is_public() && self.is_private() {
            return false;
        }
        if !self.has_freshness_policy() {
            return false;
        }
        if !self.is_private() && self.directive(names::SHARED_MAX_AGE).is_some_and(|s| s <= 0) {
            return false;
        }
        if self.directive(names::MAX_AGE).is_some_and(|s| s <= 0) {
            return false;
        }
        if self.expires.is_some_and(|expires| expires <= self.parsed_at) {
            return false;
        }
        true
    }

    /// Freshness lifetime in seconds.
    ///
    /// `s-maxage` (ignored for private responses), then `max-age`, then
    /// `Expires - Date`, which may be negative. Zero when none apply.
    pub fn max_age(&self) -> i64 {
        if !self.is_private() {
            if let Some(shared) = self.directive(names::SHARED_MAX_AGE) {
                return shared;
            }
        }
        if let Some(max_age) = self.directive(names::MAX_AGE) {
            return max_age;
        }
        match self.expires {
            Some(expires) => signed_seconds_between(self.date, expires),
            None => 0,
        }
    }

    pub fn is_private(&self) -> bool {
        self.has_flag(names::PRIVATE)
    }

    pub fn is_public(&self) -> bool {
        self.has_flag(names::PUBLIC)
    }

    pub fn no_cache(&self) -> bool {
        self.has_flag(names::NO_CACHE)
    }

    pub fn no_store(&self) -> bool {
        self.has_flag(names::NO_STORE)
    }

    /// Returns `true` if the response names at least one `Vary` dimension.
    pub fn is_varying(&self) -> bool {
        !self.variations().is_empty()
    }

    /// Normalized (trimmed, lowercased) header names from `Vary`.
    pub fn variations(&self) -> BTreeSet<String> {
        self.vary
            .as_deref()
            .map(|vary| {
                vary.split(',')
                    .map(|name| name.trim().to_ascii_lowercase())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `stale-while-revalidate` window in seconds, zero when absent.
    pub fn stale_while_revalidate(&self) -> i64 {
        self.directive(names::STALE_WHILE_REVALIDATE).unwrap_or(0)
    }

    /// `stale-if-error` window in seconds, zero when absent.
    pub fn stale_if_error(&self) -> i64 {
        self.directive(names::STALE_IF_ERROR).unwrap_or(0)
    }

    /// Returns the integer value of a directive (case-insensitive).
    pub fn directive(&self, name: &str) -> Option<i64> {
        self.numeric.get(&name.to_ascii_lowercase()).copied()
    }

    /// Returns `true` if a valueless directive is present (case-insensitive).
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains(&name.to_ascii_lowercase())
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn date(&self) -> SystemTime {
        self.date
    }

    pub fn expires(&self) -> Option<SystemTime> {
        self.expires
    }

    // Responses with no explicit caching signal are never stored.
    fn has_freshness_policy(&self) -> bool {
        self.is_public()
            || self.is_private()
            || self.numeric.contains_key(names::MAX_AGE)
            || self.numeric.contains_key(names::SHARED_MAX_AGE)
            || self.expires.is_some()
    }
}

fn signed_seconds_between(from: SystemTime, to: SystemTime) -> i64 {
    match to.duration_since(from) {
        Ok(ahead) => i64::try_from(ahead.as_secs()).unwrap_or(i64::MAX),
        Err(behind) => -i64::try_from(behind.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn directives(pairs: &[(&str, &str)]) -> DirectiveSet {
        let headers: Headers = pairs.iter().copied().collect();
        DirectiveSet::parse(&headers)
    }

    fn http_date(offset_secs: i64) -> String {
        let now = SystemTime::now();
        let at = if offset_secs >= 0 {
            now + Duration::from_secs(offset_secs as u64)
        } else {
            now - Duration::from_secs(offset_secs.unsigned_abs())
        };
        httpdate::fmt_http_date(at)
    }

    #[test]
    fn no_headers_not_cacheable() {
        let d = directives(&[]);
        assert!(!d.is_cacheable());
        assert_eq!(d.max_age(), 0);
    }

    #[test]
    fn public_alone_is_cacheable_with_zero_lifetime() {
        let d = directives(&[("Cache-Control", "public")]);
        assert!(d.is_cacheable());
        assert_eq!(d.max_age(), 0);
    }

    #[test]
    fn no_store_and_no_cache_refused() {
        assert!(!directives(&[("Cache-Control", "no-store")]).is_cacheable());
        assert!(!directives(&[("Cache-Control", "public, max-age=60, no-cache")]).is_cacheable());
    }

    #[test]
    fn multiple_cache_control_lines_merge() {
        let d = directives(&[("Cache-Control", "public"), ("cache-control", "max-age=600")]);
        assert!(d.is_cacheable());
        assert_eq!(d.max_age(), 600);
    }

    #[test]
    fn zero_lifetimes_refused() {
        assert!(!directives(&[("Cache-Control", "public, max-age=0")]).is_cacheable());
        assert!(!directives(&[("Cache-Control", "public, s-maxage=0")]).is_cacheable());
        assert!(!directives(&[("Cache-Control", "private, s-maxage=300, max-age=0")]).is_cacheable());
    }

    #[test]
    fn shared_max_age_ignored_when_private() {
        let d = directives(&[("Cache-Control", "private, s-maxage=300, max-age=1")]);
        assert!(d.is_cacheable());
        assert_eq!(d.max_age(), 1);

        let d = directives(&[("Cache-Control", "public, s-maxage=300, max-age=1")]);
        assert_eq!(d.max_age(), 300);
    }

    #[test]
    fn public_and_private_refused() {
        assert!(!directives(&[("Cache-Control", "public, private, max-age=300")]).is_cacheable());
    }

    #[test]
    fn malformed_values_dropped() {
        let d = directives(&[("Cache-Control", "public, max-age=soon, stale-if-error=\"30\"")]);
        assert_eq!(d.directive("max-age"), None);
        assert_eq!(d.stale_if_error(), 30);
        assert!(d.is_cacheable());
    }

    #[test]
    fn names_are_case_insensitive() {
        let d = directives(&[("Cache-Control", "PUBLIC, Max-Age=120")]);
        assert!(d.is_public());
        assert_eq!(d.directive("MAX-AGE"), Some(120));
    }

    #[test]
    fn private_with_field_list_stays_private() {
        let d = directives(&[("Cache-Control", "private=\"Set-Cookie\", max-age=60")]);
        assert!(d.is_private());
    }

    #[test]
    fn expires_future_cacheable_past_not() {
        let future = directives(&[("Cache-Control", "public"), ("Expires", http_date(300).as_str())]);
        assert!(future.is_cacheable());
        assert!(future.max_age() > 290);

        let past = directives(&[("Cache-Control", "public"), ("Expires", http_date(-300).as_str())]);
        assert!(!past.is_cacheable());
        assert!(past.max_age() < 0);
    }

    #[test]
    fn expires_measured_against_date_header() {
        let now = SystemTime::now();
        let headers: Headers = [
            ("Date", httpdate::fmt_http_date(now)),
            ("Expires", httpdate::fmt_http_date(now + Duration::from_secs(120))),
        ]
        .into_iter()
        .collect();
        assert_eq!(DirectiveSet::parse_at(&headers, now).max_age(), 120);
    }

    #[test]
    fn unreadable_expires_counts_as_expired() {
        let d = directives(&[("Cache-Control", "public"), ("Expires", "0")]);
        assert!(!d.is_cacheable());
    }

    #[test]
    fn vary_star_refused() {
        let d = directives(&[("Cache-Control", "public, max-age=60"), ("Vary", "*")]);
        assert!(!d.is_cacheable());
    }

    #[test]
    fn variations_normalized() {
        let d = directives(&[("Vary", "Accept-Encoding , USER-AGENT"), ("Vary", "Accept-Language")]);
        let expected: BTreeSet<String> = ["accept-encoding", "user-agent", "accept-language"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        assert_eq!(d.variations(), expected);
        assert!(d.is_varying());
        assert!(!directives(&[]).is_varying());
    }
}
