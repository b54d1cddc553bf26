//! Stored responses.

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::http::{Headers, Request, Response, StatusCode, Version};

use super::{DirectiveSet, Variation, directives::names};

/// Headers a `304 Not Modified` may carry that replace the stored ones.
const REFRESHABLE: [&str; 4] = [names::CACHE_CONTROL, names::DATE, names::EXPIRES, names::ETAG];

/// Durable part of a [`CacheEntry`]: everything needed to replay the response
/// and to recompute its directives and variation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedResponse {
    pub version: Version,
    pub status: StatusCode,
    pub status_message: String,
    pub headers: Headers,
    pub trailers: Headers,
    pub cookies: Vec<String>,
    pub redirects: Vec<String>,
    pub body: Bytes,
    /// Headers of the request that produced the response.
    pub request_headers: Headers,
}

impl CapturedResponse {
    fn from_exchange(request: &Request, response: &Response) -> Self {
        Self {
            version: response.http_version(),
            status: response.status(),
            status_message: response.message().to_owned(),
            headers: response.headers().clone(),
            trailers: response.trailers().clone(),
            cookies: response.cookies().to_vec(),
            redirects: response.redirects().to_vec(),
            body: response.body_bytes().clone(),
            request_headers: request.headers().clone(),
        }
    }
}

/// A response held by a [`Store`](super::Store).
///
/// Entries are never edited in place. A successful revalidation produces a
/// new entry through [`refreshed`](Self::refreshed) which replaces the old one
/// under the same key.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    response: CapturedResponse,
    directives: DirectiveSet,
    variation: Variation,
    captured_at: Instant,
}

impl CacheEntry {
    /// Captures a response together with the request that produced it.
    pub fn capture(request: &Request, response: &Response) -> Self {
        Self::from_snapshot(CapturedResponse::from_exchange(request, response), Instant::now())
    }

    /// Rebuilds an entry from a snapshot that was already `age` old.
    pub fn restore(snapshot: CapturedResponse, age: Duration) -> Self {
        let now = Instant::now();
        let captured_at = now.checked_sub(age).unwrap_or(now);
        Self::from_snapshot(snapshot, captured_at)
    }

    fn from_snapshot(response: CapturedResponse, captured_at: Instant) -> Self {
        let directives = DirectiveSet::parse(&response.headers);
        let variation = Variation::from_exchange(&response.request_headers, &response.headers);
        Self {
            response,
            directives,
            variation,
            captured_at,
        }
    }

    /// Returns the durable part of the entry, e.g. for an external store.
    pub fn snapshot(&self) -> &CapturedResponse {
        &self.response
    }

    pub fn directives(&self) -> &DirectiveSet {
        &self.directives
    }

    pub fn variation(&self) -> &Variation {
        &self.variation
    }

    pub fn etag(&self) -> Option<&str> {
        self.directives.etag()
    }

    /// Whole seconds elapsed since the response was captured.
    pub fn age(&self) -> u64 {
        self.captured_at.elapsed().as_secs()
    }

    /// Seconds past the freshness lifetime; zero or negative while fresh.
    fn staleness(&self) -> i64 {
        i64::try_from(self.age())
            .unwrap_or(i64::MAX)
            .saturating_sub(self.directives.max_age())
    }

    pub fn is_fresh(&self) -> bool {
        self.staleness() <= 0
    }

    /// Stale, but inside the `stale-while-revalidate` window.
    pub fn within_stale_while_revalidate(&self) -> bool {
        let staleness = self.staleness();
        staleness > 0 && staleness <= self.directives.stale_while_revalidate()
    }

    /// Stale, but inside the `stale-if-error` window.
    pub fn within_stale_if_error(&self) -> bool {
        let staleness = self.staleness();
        staleness > 0 && staleness <= self.directives.stale_if_error()
    }

    /// A copy of this entry revalidated just now.
    ///
    /// Freshness headers present in `validation` (the `304` response headers)
    /// replace the stored ones; everything else is kept.
    pub fn refreshed(&self, validation: &Headers) -> Self {
        let mut response = self.response.clone();
        for name in REFRESHABLE {
            if validation.contains(name) {
                response.headers.remove(name);
                for value in validation.get_all(name) {
                    response.headers.insert(name, value);
                }
            }
        }
        Self::from_snapshot(response, Instant::now())
    }

    /// Rebuilds the stored response exactly as it was captured.
    pub fn rehydrate(&self) -> Response {
        let r = &self.response;
        Response::from_parts(
            r.version,
            r.status,
            r.status_message.clone(),
            r.headers.clone(),
            r.trailers.clone(),
            r.cookies.clone(),
            r.redirects.clone(),
            r.body.clone(),
        )
    }

    /// Wall-clock time the origin stamped on the response.
    pub fn date(&self) -> SystemTime {
        self.directives.date()
    }
}
