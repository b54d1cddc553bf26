//! `Vary`-driven variant matching.
//!
//! A [`Variation`] records, for every header a response varies on, the values
//! a later request must agree with to reuse that response. How "agree" is
//! judged depends on the header, see [`MatchRule`].

use std::collections::{BTreeMap, BTreeSet};

use crate::http::Headers;

use super::directives::names;

const USER_AGENT: &str = "user-agent";
const ACCEPT_ENCODING: &str = "accept-encoding";
const CONTENT_ENCODING: &str = "content-encoding";
const IDENTITY: &str = "identity";

/// How a single `Vary` dimension is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchRule {
    /// The dimension is already part of the cache key (`User-Agent`).
    AlreadyKeyed,
    /// Negotiated encodings: the request must accept at least one encoding
    /// the stored representation used.
    Encoding,
    /// Normalized value sets must be equal.
    Exact,
}

impl MatchRule {
    /// Picks the rule for a normalized (lowercase) header name.
    pub fn for_dimension(name: &str) -> Self {
        match name {
            USER_AGENT => Self::AlreadyKeyed,
            ACCEPT_ENCODING | CONTENT_ENCODING => Self::Encoding,
            _ => Self::Exact,
        }
    }
}

/// The content-negotiation fingerprint of one stored response.
///
/// Two variations compare equal when they vary on the same headers with the
/// same captured values, which is what the variation registry deduplicates on.
///
/// # Examples
///
/// ```
/// use semcache::cache::Variation;
/// use semcache::http::Headers;
///
/// let request: Headers = [("Accept-Encoding", "gzip, deflate")].into_iter().collect();
/// let response: Headers = [("Vary", "Accept-Encoding"), ("Content-Encoding", "gzip")]
///     .into_iter()
///     .collect();
/// let variation = Variation::from_exchange(&request, &response);
///
/// let gzip_ok: Headers = [("Accept-Encoding", "gzip")].into_iter().collect();
/// let brotli_only: Headers = [("Accept-Encoding", "br")].into_iter().collect();
/// assert!(variation.matches(&gzip_ok));
/// assert!(!variation.matches(&brotli_only));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Variation {
    captured: BTreeMap<String, BTreeSet<String>>,
}

impl Variation {
    /// Captures the variation of a response given the request that produced it.
    pub fn from_exchange(request_headers: &Headers, response_headers: &Headers) -> Self {
        let captured = response_headers
            .tokens(names::VARY)
            .map(str::to_ascii_lowercase)
            .map(|dimension| {
                let values = match MatchRule::for_dimension(&dimension) {
                    MatchRule::AlreadyKeyed => BTreeSet::new(),
                    MatchRule::Encoding => encodings(response_headers, CONTENT_ENCODING),
                    MatchRule::Exact => normalize(request_headers.get_all(&dimension)),
                };
                (dimension, values)
            })
            .collect();

        Self { captured }
    }

    /// Returns `true` if `request_headers` may be served this variant.
    ///
    /// A variation with no dimensions matches every request.
    pub fn matches(&self, request_headers: &Headers) -> bool {
        self.captured.iter().all(|(dimension, stored)| {
            match MatchRule::for_dimension(dimension) {
                MatchRule::AlreadyKeyed => true,
                MatchRule::Encoding => {
                    let accepted = encodings(request_headers, ACCEPT_ENCODING);
                    accepted.contains("*") || !accepted.is_disjoint(stored)
                }
                MatchRule::Exact => normalize(request_headers.get_all(dimension)) == *stored,
            }
        })
    }

    /// The normalized header names this variation depends on.
    pub fn dimensions(&self) -> impl Iterator<Item = &str> {
        self.captured.keys().map(String::as_str)
    }

    /// Returns `true` if the response did not vary.
    pub fn is_empty(&self) -> bool {
        self.captured.is_empty()
    }

    /// Canonical text form, stable across processes; empty when not varying.
    ///
    /// `accept-encoding=gzip;accept-language=en,fr;user-agent=`
    pub fn fingerprint(&self) -> String {
        self.captured
            .iter()
            .map(|(dimension, values)| {
                let values: Vec<&str> = values.iter().map(String::as_str).collect();
                format!("{}={}", dimension, values.join(","))
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Comma-split, trimmed, lowercased, de-duplicated header values.
fn normalize<'a>(values: impl Iterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

// Coding names without parameters; `q=0` codings are refused and left out.
// An absent header means identity.
fn encodings(headers: &Headers, name: &str) -> BTreeSet<String> {
    let codings: BTreeSet<String> = normalize(headers.get_all(name))
        .into_iter()
        .filter_map(|coding| {
            let mut parts = coding.split(';');
            let coding_name = parts.next()?.trim();
            let refused = parts.any(|param| match param.split_once('=') {
                Some((key, value)) if key.trim() == "q" => {
                    value.trim().parse::<f32>().is_ok_and(|q| q == 0.0)
                }
                _ => false,
            });
            (!refused && !coding_name.is_empty()).then(|| coding_name.to_owned())
        })
        .collect();

    if codings.is_empty() {
        BTreeSet::from([IDENTITY.to_owned()])
    } else {
        codings
    }
}
