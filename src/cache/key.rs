//! Cache key composition.

use std::fmt;

use crate::http::Request;

use super::{CacheOptions, Variation};

const SEPARATOR: &str = "|";

/// Coarse device class derived from a `User-Agent` header.
///
/// Folded into the cache key when vary caching is enabled so that
/// `Vary: User-Agent` responses are shared per class rather than per exact
/// header value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserAgentClass {
    Desktop,
    Mobile,
    Tablet,
    Bot,
    Unknown,
}

impl UserAgentClass {
    /// Classifies a `User-Agent` header value. An absent or blank header is
    /// [`Unknown`](Self::Unknown).
    pub fn classify(user_agent: Option<&str>) -> Self {
        let ua = match user_agent.map(str::trim) {
            Some(ua) if !ua.is_empty() => ua.to_ascii_lowercase(),
            _ => return Self::Unknown,
        };

        if ["bot", "crawler", "spider"].iter().any(|m| ua.contains(m)) {
            return Self::Bot;
        }

        if ua.contains("tablet") || ua.contains("ipad") {
            return Self::Tablet;
        }
        if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
            return Self::Mobile;
        }

        Self::Desktop
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
            Self::Bot => "bot",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for UserAgentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque identity of a cached resource or of one stored variant of it.
///
/// # Examples
///
/// ```
/// use semcache::cache::{CacheKey, CacheOptions};
/// use semcache::http::Request;
///
/// let options = CacheOptions::default();
/// let a = CacheKey::base(&Request::get("localhost", 80, "/a").query("x", "1"), &options);
/// let b = CacheKey::base(&Request::get("localhost", 80, "/a").query("x", "1"), &options);
/// let c = CacheKey::base(&Request::get("localhost", 80, "/a").query("x", "2"), &options);
///
/// assert_eq!(a, b);
/// assert_ne!(a, c);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key of the logical resource a request targets.
    pub fn base(request: &Request, options: &CacheOptions) -> Self {
        let port = request.port().to_string();
        let query = request.query_string();

        let mut parts: Vec<&str> = Vec::with_capacity(5);
        parts.push(request.host());
        parts.push(&port);
        if options.key_includes_path {
            parts.push(request.path());
        }
        parts.push(&query);

        if options.vary_caching {
            parts.push(UserAgentClass::classify(request.headers().get("user-agent")).as_str());
        }

        Self(digest(&parts.join(SEPARATOR)))
    }

    /// Key under which the entry for `variation` of this resource is stored.
    pub fn variant(&self, variation: &Variation) -> Self {
        Self(digest(&format!("{}{}{}", self.0, SEPARATOR, variation.fingerprint())))
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

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "digest")]
fn digest(canonical: &str) -> String {
    use sha2::{Digest, Sha256};

    hex::encode(Sha256::digest(canonical.as_bytes()))
}

#[cfg(not(feature = "digest"))]
fn digest(canonical: &str) -> String {
    canonical.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Headers;

    fn key(request: &Request, options: &CacheOptions) -> String {
        CacheKey::base(request, options).as_str().to_owned()
    }

    #[test]
    fn classify_user_agents() {
        use UserAgentClass::*;
        let cases = [
            (None, Unknown),
            (Some("   "), Unknown),
            (Some("Googlebot/2.1 (+http://www.google.com/bot.html)"), Bot),
            (Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile/15E148"), Mobile),
            (Some("Mozilla/5.0 (Linux; Android 14; Pixel 8) Mobile Safari"), Mobile),
            (Some("Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"), Tablet),
            (Some("Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/126.0"), Desktop),
            (Some("curl/8.4.0"), Desktop),
        ];
        for (ua, expected) in cases {
            assert_eq!(UserAgentClass::classify(ua), expected, "{ua:?}");
        }
    }

    #[test]
    fn identical_requests_share_a_key() {
        let options = CacheOptions::default();
        let a = Request::get("example.com", 80, "/p").query("a", "1");
        let b = Request::get("example.com", 80, "/p").query("a", "1");
        assert_eq!(key(&a, &options), key(&b, &options));
    }

    #[test]
    fn host_port_query_path_distinguish() {
        let options = CacheOptions::default();
        let base = key(&Request::get("example.com", 80, "/p").query("a", "1"), &options);
        for other in [
            Request::get("example.org", 80, "/p").query("a", "1"),
            Request::get("example.com", 8080, "/p").query("a", "1"),
            Request::get("example.com", 80, "/p").query("a", "2"),
            Request::get("example.com", 80, "/q").query("a", "1"),
        ] {
            assert_ne!(base, key(&other, &options));
        }
    }

    #[test]
    fn query_order_is_significant() {
        let options = CacheOptions::default();
        let ab = Request::get("h", 80, "/").query("a", "1").query("b", "2");
        let ba = Request::get("h", 80, "/").query("b", "2").query("a", "1");
        assert_ne!(key(&ab, &options), key(&ba, &options));
    }

    #[test]
    fn path_can_be_left_out() {
        let options = CacheOptions::default().with_key_includes_path(false);
        let a = Request::get("h", 80, "/a");
        let b = Request::get("h", 80, "/b");
        assert_eq!(key(&a, &options), key(&b, &options));
    }

    #[test]
    fn user_agent_only_counts_with_vary_caching() {
        let desktop = Request::get("h", 80, "/").header("User-Agent", "Mozilla/5.0 (X11; Linux)");
        let other_desktop = Request::get("h", 80, "/").header("User-Agent", "curl/8.4.0");
        let phone = Request::get("h", 80, "/").header("User-Agent", "Android 14 Mobile");

        let plain = CacheOptions::default();
        assert_eq!(key(&desktop, &plain), key(&phone, &plain));

        let vary = CacheOptions::default().with_vary_caching(true);
        assert_eq!(key(&desktop, &vary), key(&other_desktop, &vary));
        assert_ne!(key(&desktop, &vary), key(&phone, &vary));
    }

    #[test]
    fn variant_depends_on_fingerprint() {
        let base = CacheKey::base(&Request::get("h", 80, "/"), &CacheOptions::default());
        let vary: Headers = [("Vary", "Accept-Language")].into_iter().collect();
        let english: Headers = [("Accept-Language", "en")].into_iter().collect();
        let french: Headers = [("Accept-Language", "fr")].into_iter().collect();
        let en = Variation::from_exchange(&english, &vary);
        let fr = Variation::from_exchange(&french, &vary);

        assert_eq!(base.variant(&en), base.variant(&en.clone()));
        assert_ne!(base.variant(&en), base.variant(&fr));
        assert_ne!(base.variant(&Variation::default()), base);
    }

    #[cfg(feature = "digest")]
    #[test]
    fn digest_is_sha256_hex() {
        let key = CacheKey::base(&Request::get("h", 80, "/"), &CacheOptions::default());
        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
