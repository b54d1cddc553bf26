//! # semcache
//!
//! A client-side HTTP cache with RFC-style semantics, built as an interceptor
//! for a small async HTTP/1.1 client.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use semcache::cache::{CacheEngine, CacheOptions, MemoryStore};
//! use semcache::client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = CacheOptions::default().with_vary_caching(true);
//!     let client = Client::builder()
//!         .interceptor(CacheEngine::with_options(MemoryStore::new(), options))
//!         .build();
//!
//!     let response = client.get("http://127.0.0.1:8080/articles?page=1").await?;
//!     println!("{} ({} bytes)", response.status(), response.body_bytes().len());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;
pub mod http;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{CacheEngine, CacheOptions, MemoryStore, Store};
pub use client::{Client, ClientError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use transport::{TcpTransport, Transport, TransportError};
