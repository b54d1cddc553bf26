//! HTTP client with an interceptor pipeline.
//!
//! A [`Client`] owns an ordered list of interceptors and a [`Transport`].
//! Every request walks the interceptors in registration order and, unless one
//! of them answers first, ends at the transport.

use std::sync::Arc;

use thiserror::Error;

use crate::http::{Method, Request, RequestError, Response};
use crate::transport::{TcpTransport, Transport, TransportError};

pub mod interceptor;

pub use interceptor::{
    Interceptor, InterceptorHandler, LoggerInterceptor, Next, ResponseFuture, from_interceptor,
};

/// Errors returned by [`Client`] and the interceptor pipeline.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Request(#[from] RequestError),
}

/// An HTTP client. Cheap to clone; clones share interceptors and transport.
///
/// # Examples
///
/// ```rust,no_run
/// use semcache::cache::{CacheEngine, MemoryStore};
/// use semcache::client::{Client, LoggerInterceptor};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::builder()
///         .interceptor(LoggerInterceptor)
///         .interceptor(CacheEngine::new(MemoryStore::new()))
///         .build();
///
///     let first = client.get("http://127.0.0.1:8080/news").await?;
///     let second = client.get("http://127.0.0.1:8080/news").await?;
///     println!("{} / age {:?}", first.status(), second.headers().get("age"));
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    interceptors: Arc<[InterceptorHandler]>,
    transport: Arc<dyn Transport>,
}

impl Client {
    /// A client with no interceptors over the given transport.
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::builder().transport(transport).build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Sends `req` through the interceptor chain.
    ///
    /// # Errors
    ///
    /// [`ClientError::Transport`] when the origin could not be reached and no
    /// interceptor recovered.
    pub async fn send(&self, req: Request) -> Result<Response, ClientError> {
        Next::new(Arc::clone(&self.interceptors), Arc::clone(&self.transport))
            .run(req)
            .await
    }

    /// Sends a `GET` for an absolute URL.
    ///
    /// # Errors
    ///
    /// [`ClientError::Request`] if `url` is not a usable `http(s)` URL, plus
    /// everything [`send`](Self::send) can return.
    pub async fn get(&self, url: &str) -> Result<Response, ClientError> {
        let req = Request::from_url(Method::Get, url)?;
        self.send(req).await
    }
}

/// Builder for [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    interceptors: Vec<InterceptorHandler>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Appends an interceptor; earlier interceptors wrap later ones.
    #[must_use]
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(from_interceptor(Arc::new(interceptor)));
        self
    }

    /// Appends an already type-erased interceptor.
    #[must_use]
    pub fn handler(mut self, handler: InterceptorHandler) -> Self {
        self.interceptors.push(handler);
        self
    }

    /// Sets the transport. Defaults to [`TcpTransport`].
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn build(self) -> Client {
        Client {
            interceptors: Arc::from(self.interceptors),
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(TcpTransport::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::http::StatusCode;

    #[tokio::test]
    async fn get_parses_the_url() {
        let client = Client::new(|req: Request| async move {
            let echo = format!("{} {}:{}{}?{}", req.method(), req.host(), req.port(), req.path(), req.query_string());
            Ok::<_, TransportError>(Response::new(StatusCode::OK).body(echo))
        });

        let response = client.get("http://example.com:8080/a?b=c").await.unwrap();
        assert_eq!(response.text(), "GET example.com:8080/a?b=c");
    }

    #[tokio::test]
    async fn bad_url_is_a_request_error() {
        let client = Client::new(|_req: Request| async {
            Ok::<_, TransportError>(Response::new(StatusCode::OK))
        });
        let err = client.get("mailto:someone@example.com").await.unwrap_err();
        assert!(matches!(err, ClientError::Request(RequestError::UnsupportedScheme { .. })));
    }

    #[tokio::test]
    async fn clones_share_the_transport() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let client = Client::builder()
            .interceptor(LoggerInterceptor)
            .transport(move |_req: Request| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, TransportError>(Response::new(StatusCode::OK)) }
            })
            .build();

        let other = client.clone();
        client.send(Request::get("h", 80, "/")).await.unwrap();
        other.send(Request::get("h", 80, "/")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
