//! Base key to variation bookkeeping.

use dashmap::DashMap;

use crate::http::Headers;

use super::{CacheKey, Variation};

/// Remembers, per logical resource, which [`Variation`]s have been stored.
///
/// Lookups need this before they have seen any response: the request only
/// yields the base key, and the registry says which variant keys may hold a
/// usable entry. It lives as long as its engine; the engine forgets a
/// variation once its entry is gone from the store.
#[derive(Debug, Default)]
pub struct VariationRegistry {
    variations: DashMap<CacheKey, Vec<Variation>>,
}

impl VariationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `variation` for `base` unless an equal one is already known.
    ///
    /// Returns `true` if the variation was added. The check and the insert
    /// happen under one shard lock, so concurrent registrations never lose
    /// an entry.
    pub fn register(&self, base: &CacheKey, variation: &Variation) -> bool {
        let mut known = self.variations.entry(base.clone()).or_default();
        if known.contains(variation) {
            return false;
        }
        known.push(variation.clone());
        true
    }

    /// Registered variations of `base` that `request_headers` may be served,
    /// in registration order.
    pub fn matching(&self, base: &CacheKey, request_headers: &Headers) -> Vec<Variation> {
        self.variations.get(base).map_or_else(Vec::new, |known| {
            known
                .iter()
                .filter(|variation| variation.matches(request_headers))
                .cloned()
                .collect()
        })
    }

    /// Drops `variation` from `base`, typically once its entry has left the
    /// store. Returns `true` if it was registered.
    pub fn forget(&self, base: &CacheKey, variation: &Variation) -> bool {
        let Some(mut known) = self.variations.get_mut(base) else {
            return false;
        };
        let before = known.len();
        known.retain(|v| v != variation);
        before != known.len()
    }

    /// Number of variations recorded for `base`.
    pub fn count(&self, base: &CacheKey) -> usize {
        self.variations.get(base).map_or(0, |known| known.len())
    }
}
