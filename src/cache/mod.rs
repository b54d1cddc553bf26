//! HTTP response caching.
//!
//! The pieces, bottom-up:
//!
//! - [`DirectiveSet`]: what a response's `Cache-Control`, `Expires`, `Date`,
//!   `ETag` and `Vary` headers allow.
//! - [`Variation`]: which request headers a stored response is valid for.
//! - [`CacheKey`]: identity of a resource (base key) and of one stored
//!   variant of it.
//! - [`CacheEntry`]: a captured response plus its derived directives.
//! - [`Store`]: async storage; [`MemoryStore`] is the bundled backend.
//! - [`CacheEngine`]: the interceptor tying it all together.

pub mod directives;
pub mod engine;
pub mod entry;
pub mod key;
pub mod options;
pub mod registry;
pub mod store;
pub mod variation;

pub use directives::DirectiveSet;
pub use engine::{CacheEngine, Lookup, StoreDecision};
pub use entry::{CacheEntry, CapturedResponse};
pub use key::{CacheKey, UserAgentClass};
pub use options::CacheOptions;
pub use registry::VariationRegistry;
pub use store::{MemoryStore, Store, StoreError};
pub use variation::{MatchRule, Variation};
