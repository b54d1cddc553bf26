//! The caching interceptor.
//!
//! [`CacheEngine`] sits in a [`Client`](crate::client::Client)'s interceptor
//! chain. On the way out it answers `GET` requests from the [`Store`] when it
//! can; on the way back it decides whether the origin's response may be
//! stored, and it handles the outcome of revalidating stale entries.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::client::{ClientError, Interceptor, Next, ResponseFuture};
use crate::http::{Method, Request, Response, StatusCode};

use super::{
    CacheEntry, CacheKey, CacheOptions, DirectiveSet, Store, VariationRegistry, directives::names,
};

/// Result of looking a request up in the cache.
#[derive(Debug)]
pub enum Lookup {
    /// The engine does not take part: caching is off or the method is not `GET`.
    Bypass,
    /// Nothing usable is stored.
    Miss,
    /// An entry exists under `key`; it may still need revalidation.
    Hit { key: CacheKey, entry: CacheEntry },
}

/// What [`CacheEngine::store_response`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreDecision {
    Stored,
    /// The status code is not in the configured allowlist.
    UncacheableStatus,
    /// The response's directives forbid storing it.
    NotCacheable,
    /// `Cache-Control: private` and private caching is off.
    PrivateDisabled,
    /// The response carries `Vary` and vary caching is off.
    VaryDisabled,
    /// The store rejected the write.
    StoreFailed,
}

/// How a stored entry may be used for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Usability {
    Fresh,
    StaleWhileRevalidate,
    MustRevalidate,
}

impl Usability {
    fn of(entry: &CacheEntry) -> Self {
        if entry.directives().no_cache() {
            Self::MustRevalidate
        } else if entry.is_fresh() {
            Self::Fresh
        } else if entry.within_stale_while_revalidate() {
            Self::StaleWhileRevalidate
        } else {
            Self::MustRevalidate
        }
    }
}

struct Inner {
    store: Arc<dyn Store>,
    options: CacheOptions,
    registry: VariationRegistry,
}

/// An HTTP cache, usable as a client [`Interceptor`] or driven directly
/// through [`lookup`](Self::lookup) and [`on_response`](Self::on_response).
///
/// Cloning is cheap and clones share the store and the variation registry.
///
/// # Examples
///
/// ```
/// use semcache::cache::{CacheEngine, CacheOptions, MemoryStore};
/// use semcache::client::Client;
/// use semcache::http::{Request, Response, StatusCode};
/// use semcache::transport::TransportError;
///
/// # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
/// let client = Client::builder()
///     .interceptor(CacheEngine::with_options(MemoryStore::new(), CacheOptions::default()))
///     .transport(|_req: Request| async {
///         Ok::<_, TransportError>(
///             Response::new(StatusCode::OK)
///                 .header("Cache-Control", "public, max-age=600")
///                 .body("fresh"),
///         )
///     })
///     .build();
///
/// client.send(Request::get("localhost", 80, "/")).await.unwrap();
/// let cached = client.send(Request::get("localhost", 80, "/")).await.unwrap();
/// assert_eq!(cached.headers().get("age"), Some("0"));
/// # });
/// ```
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

impl CacheEngine {
    /// Creates an engine with the default [`CacheOptions`].
    pub fn new(store: impl Store + 'static) -> Self {
        Self::with_options(store, CacheOptions::default())
    }

    pub fn with_options(store: impl Store + 'static, options: CacheOptions) -> Self {
        Self::from_shared(Arc::new(store), options)
    }

    /// Creates an engine over a store that is also used elsewhere.
    pub fn from_shared(store: Arc<dyn Store>, options: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                options,
                registry: VariationRegistry::new(),
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    pub fn registry(&self) -> &VariationRegistry {
        &self.inner.registry
    }

    /// Finds the stored entry, if any, that `request` may be answered from.
    ///
    /// A store read error is logged and reported as a miss.
    pub async fn lookup(&self, request: &Request) -> Lookup {
        if !self.inner.options.is_enabled() || *request.method() != Method::Get {
            return Lookup::Bypass;
        }

        let base = CacheKey::base(request, &self.inner.options);
        for variation in self.inner.registry.matching(&base, request.headers()) {
            let key = base.variant(&variation);
            match self.inner.store.get(&key).await {
                Ok(Some(entry)) => return Lookup::Hit { key, entry },
                Ok(None) => {
                    // The entry was evicted or expired out of the store.
                    debug!(key = %key, "variant gone from store, forgetting it");
                    self.inner.registry.forget(&base, &variation);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "cache read failed, treating as miss");
                    return Lookup::Miss;
                }
            }
        }

        debug!(key = %base, "cache miss: no matching variation");
        Lookup::Miss
    }

    /// Processes the origin's answer to `request`.
    ///
    /// `revalidation` carries the stale entry (and its key) when `outcome`
    /// answers a conditional request made on its behalf. The returned value is
    /// what the caller should see: the origin's response, or the cached one
    /// when the origin confirmed it (`304`) or failed within the entry's
    /// `stale-if-error` window.
    pub async fn on_response(
        &self,
        request: &Request,
        outcome: Result<Response, ClientError>,
        revalidation: Option<(&CacheKey, &CacheEntry)>,
    ) -> Result<Response, ClientError> {
        let response = match (outcome, revalidation) {
            (Ok(response), Some((key, stale))) if response.status() == StatusCode::NOT_MODIFIED => {
                return Ok(self.refresh(key, stale, &response).await);
            }
            (Ok(response), _) => response,
            (Err(e), Some((key, stale))) if stale.within_stale_if_error() => {
                warn!(key = %key, error = %e, "revalidation failed, serving stale entry");
                return Ok(with_age(stale));
            }
            (Err(e), _) => return Err(e),
        };

        let status = response.status();
        if self.inner.options.is_cacheable_status(status) {
            let stored = self.try_store(request, &response).await;
            if let Some((key, _)) = revalidation {
                // The stale entry was superseded, either by nothing we may keep
                // or by an entry living under another variant key.
                if stored.as_ref().map_or(true, |new_key| new_key != key) {
                    self.evict(key).await;
                }
            }
            return Ok(response);
        }

        if let Some((key, stale)) = revalidation {
            let failed = !(status.is_success() || status.is_redirection());
            if failed && stale.within_stale_if_error() {
                warn!(key = %key, status = %status, "origin error on revalidation, serving stale entry");
                return Ok(with_age(stale));
            }
        }

        Ok(response)
    }

    /// Stores `response` if the configuration and its directives allow it.
    ///
    /// Deciding has no side effects besides the store write, so the same
    /// response always yields the same decision for the same options.
    pub async fn store_response(&self, request: &Request, response: &Response) -> StoreDecision {
        match self.try_store(request, response).await {
            Ok(_) => StoreDecision::Stored,
            Err(decision) => decision,
        }
    }

    /// Stores `response`, returning the variant key it was written under.
    async fn try_store(&self, request: &Request, response: &Response) -> Result<CacheKey, StoreDecision> {
        let options = &self.inner.options;
        if !options.is_cacheable_status(response.status()) {
            return Err(StoreDecision::UncacheableStatus);
        }

        let directives = DirectiveSet::parse(response.headers());
        if !directives.is_cacheable() {
            return Err(StoreDecision::NotCacheable);
        }
        if directives.is_private() && !options.private_caching {
            return Err(StoreDecision::PrivateDisabled);
        }
        if directives.is_varying() && !options.vary_caching {
            return Err(StoreDecision::VaryDisabled);
        }

        let entry = CacheEntry::capture(request, response);
        let base = CacheKey::base(request, options);
        let key = base.variant(entry.variation());
        let variation = entry.variation().clone();

        match self.inner.store.set(&key, entry).await {
            Ok(_) => {
                self.inner.registry.register(&base, &variation);
                debug!(key = %key, max_age = directives.max_age(), "response stored");
                Ok(key)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache write failed");
                Err(StoreDecision::StoreFailed)
            }
        }
    }

    async fn refresh(&self, key: &CacheKey, stale: &CacheEntry, validation: &Response) -> Response {
        let refreshed = stale.refreshed(validation.headers());
        let response = with_age(&refreshed);
        if !refreshed.directives().is_cacheable() {
            debug!(key = %key, "revalidation forbids keeping the entry");
            self.evict(key).await;
            return response;
        }
        match self.inner.store.set(key, refreshed).await {
            Ok(_) => debug!(key = %key, "entry revalidated"),
            Err(e) => warn!(key = %key, error = %e, "cache write failed after revalidation"),
        }
        response
    }

    async fn evict(&self, key: &CacheKey) {
        if let Err(e) = self.inner.store.delete(key).await {
            warn!(key = %key, error = %e, "cache delete failed");
        }
    }

    async fn serve_hit(
        &self,
        request: Request,
        next: Next,
        key: CacheKey,
        entry: CacheEntry,
    ) -> Result<Response, ClientError> {
        match Usability::of(&entry) {
            Usability::Fresh => {
                debug!(key = %key, age = entry.age(), "cache hit");
                Ok(with_age(&entry))
            }
            Usability::StaleWhileRevalidate => {
                debug!(key = %key, age = entry.age(), "serving stale entry, revalidating in background");
                let stale = with_age(&entry);
                let engine = self.clone();
                tokio::spawn(async move {
                    let outcome = next.run(conditional(&request, &entry)).await;
                    match engine.on_response(&request, outcome, Some((&key, &entry))).await {
                        Ok(response) => {
                            debug!(key = %key, status = %response.status(), "background revalidation done")
                        }
                        Err(e) => warn!(key = %key, error = %e, "background revalidation failed"),
                    }
                });
                Ok(stale)
            }
            Usability::MustRevalidate => {
                debug!(key = %key, age = entry.age(), "revalidating stale entry");
                let outcome = next.run(conditional(&request, &entry)).await;
                self.on_response(&request, outcome, Some((&key, &entry))).await
            }
        }
    }
}

impl Interceptor for CacheEngine {
    fn handle(&self, req: Request, next: Next) -> ResponseFuture {
        let engine = self.clone();
        Box::pin(async move {
            match engine.lookup(&req).await {
                Lookup::Bypass => next.run(req).await,
                Lookup::Miss => {
                    let outcome = next.run(req.clone()).await;
                    engine.on_response(&req, outcome, None).await
                }
                Lookup::Hit { key, entry } => engine.serve_hit(req, next, key, entry).await,
            }
        })
    }
}

/// The stored response with `Age` set to the entry's current age.
fn with_age(entry: &CacheEntry) -> Response {
    let mut response = entry.rehydrate();
    response
        .headers_mut()
        .set(names::AGE, entry.age().to_string());
    response
}

/// `request` made conditional on the entry's validator, when it has one.
fn conditional(request: &Request, entry: &CacheEntry) -> Request {
    let mut conditional = request.clone();
    if let Some(etag) = entry.etag() {
        conditional.headers_mut().set(names::IF_NONE_MATCH, etag);
    }
    conditional
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::cache::{MemoryStore, StoreError};
    use async_trait::async_trait;

    fn request() -> Request {
        Request::get("localhost", 80, "/doc")
    }

    fn ok(cache_control: &str) -> Response {
        Response::new(StatusCode::OK)
            .header("Cache-Control", cache_control)
            .body("body")
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>, StoreError> {
            Err(StoreError::Unavailable)
        }
        async fn set(&self, _key: &CacheKey, _entry: CacheEntry) -> Result<CacheEntry, StoreError> {
            Err(StoreError::Unavailable)
        }
        async fn delete(&self, _key: &CacheKey) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }
        async fn flush(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable)
        }
    }

    #[tokio::test]
    async fn bypass_when_disabled_or_not_get() {
        let engine = CacheEngine::new(MemoryStore::new());
        let post = Request::new(Method::Post, "localhost", 80, "/doc");
        assert!(matches!(engine.lookup(&post).await, Lookup::Bypass));

        let off = CacheEngine::with_options(
            MemoryStore::new(),
            CacheOptions::default().with_public_caching(false),
        );
        assert!(matches!(off.lookup(&request()).await, Lookup::Bypass));
    }

    #[tokio::test]
    async fn store_then_hit() {
        let engine = CacheEngine::new(MemoryStore::new());
        assert!(matches!(engine.lookup(&request()).await, Lookup::Miss));

        let decision = engine.store_response(&request(), &ok("max-age=60")).await;
        assert_eq!(decision, StoreDecision::Stored);

        match engine.lookup(&request()).await {
            Lookup::Hit { entry, .. } => assert_eq!(entry.rehydrate().text(), "body"),
            other => panic!("expected hit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn decisions() {
        let engine = CacheEngine::new(MemoryStore::new());
        let req = request();

        let server_error = Response::new(StatusCode::INTERNAL_SERVER_ERROR)
            .header("Cache-Control", "max-age=60");
        let cases = [
            (server_error, StoreDecision::UncacheableStatus),
            (Response::new(StatusCode::OK), StoreDecision::NotCacheable),
            (ok("no-store"), StoreDecision::NotCacheable),
            (ok("max-age=0"), StoreDecision::NotCacheable),
            (ok("private, max-age=60"), StoreDecision::PrivateDisabled),
            (
                ok("max-age=60").header("Vary", "Accept-Language"),
                StoreDecision::VaryDisabled,
            ),
            (ok("public, max-age=60"), StoreDecision::Stored),
        ];
        for (response, expected) in cases {
            assert_eq!(engine.store_response(&req, &response).await, expected);
            // Replaying gives the same answer.
            assert_eq!(engine.store_response(&req, &response).await, expected);
        }
    }

    #[tokio::test]
    async fn broken_store_fails_open() {
        let engine = CacheEngine::new(BrokenStore);
        assert!(matches!(engine.lookup(&request()).await, Lookup::Miss));
        assert_eq!(
            engine.store_response(&request(), &ok("max-age=60")).await,
            StoreDecision::StoreFailed
        );
        // A failed write does not register the variation.
        let base = CacheKey::base(&request(), engine.options());
        assert_eq!(engine.registry().count(&base), 0);
    }

    #[tokio::test]
    async fn lookup_forgets_variants_missing_from_the_store() {
        let engine = CacheEngine::new(MemoryStore::new());
        engine.store_response(&request(), &ok("max-age=60")).await;
        let Lookup::Hit { key, .. } = engine.lookup(&request()).await else {
            panic!("expected hit");
        };
        engine.store().delete(&key).await.unwrap();

        assert!(matches!(engine.lookup(&request()).await, Lookup::Miss));
        let base = CacheKey::base(&request(), engine.options());
        assert_eq!(engine.registry().count(&base), 0);
    }

    #[tokio::test]
    async fn not_modified_without_freshness_evicts() {
        let engine = CacheEngine::new(MemoryStore::new());
        engine.store_response(&request(), &ok("max-age=10")).await;
        let Lookup::Hit { key, entry } = engine.lookup(&request()).await else {
            panic!("expected hit");
        };

        let not_modified = Response::new(StatusCode::NOT_MODIFIED).header("Cache-Control", "max-age=0");
        let served = engine
            .on_response(&request(), Ok(not_modified), Some((&key, &entry)))
            .await
            .unwrap();
        assert_eq!(served.text(), "body");
        assert!(engine.store().get(&key).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn usability_over_time() {
        let entry = CacheEntry::capture(&request(), &ok("max-age=10, stale-while-revalidate=10"));
        assert_eq!(Usability::of(&entry), Usability::Fresh);

        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(Usability::of(&entry), Usability::StaleWhileRevalidate);

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(Usability::of(&entry), Usability::MustRevalidate);
    }

    #[tokio::test]
    async fn conditional_uses_etag() {
        let tagged = CacheEntry::capture(&request(), &ok("max-age=10").header("ETag", "\"v7\""));
        assert_eq!(
            conditional(&request(), &tagged).headers().get("if-none-match"),
            Some("\"v7\"")
        );

        let untagged = CacheEntry::capture(&request(), &ok("max-age=10"));
        assert!(!conditional(&request(), &untagged).headers().contains("if-none-match"));
    }

    #[tokio::test]
    async fn not_modified_refreshes() {
        let engine = CacheEngine::new(MemoryStore::new());
        engine.store_response(&request(), &ok("max-age=10").header("ETag", "\"v1\"")).await;
        let Lookup::Hit { key, entry } = engine.lookup(&request()).await else {
            panic!("expected hit");
        };

        let not_modified = Response::new(StatusCode::NOT_MODIFIED).header("Cache-Control", "max-age=99");
        let served = engine
            .on_response(&request(), Ok(not_modified), Some((&key, &entry)))
            .await
            .unwrap();
        assert_eq!(served.status(), StatusCode::OK);
        assert_eq!(served.text(), "body");
        assert_eq!(served.headers().get("age"), Some("0"));

        let Lookup::Hit { entry, .. } = engine.lookup(&request()).await else {
            panic!("expected hit");
        };
        assert_eq!(entry.directives().max_age(), 99);
    }
}
