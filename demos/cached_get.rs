//! Fetches the same resource twice through a caching client.
//!
//! Starts a throwaway origin on a local port that counts its hits, then
//! shows the second request being answered from the cache.
//!
//! ```text
//! RUST_LOG=semcache=debug cargo run --example cached_get
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use semcache::cache::{CacheEngine, CacheOptions, MemoryStore};
use semcache::client::{Client, LoggerInterceptor};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let hits = Arc::new(AtomicUsize::new(0));

    let origin_hits = Arc::clone(&hits);
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                continue;
            };
            let n = origin_hits.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let body = format!("origin response #{n}\n");
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nCache-Control: public, max-age=60\r\nETag: \"{n}\"\r\nContent-Length: {}\r\n\r\n{body}",
                    body.len()
                );
                let _ = socket.write_all(reply.as_bytes()).await;
            });
        }
    });

    let client = Client::builder()
        .interceptor(LoggerInterceptor)
        .interceptor(CacheEngine::with_options(MemoryStore::new(), CacheOptions::default()))
        .build();

    let url = format!("http://{addr}/greeting?lang=en");
    for attempt in 1..=3 {
        let response = client.get(&url).await?;
        println!(
            "attempt {attempt}: {} age={} body={:?}",
            response.status(),
            response.headers().get("age").unwrap_or("-"),
            response.text().trim_end()
        );
    }
    println!("origin was hit {} time(s)", hits.load(Ordering::SeqCst));

    Ok(())
}
