//! Origin transports.
//!
//! A [`Transport`] is whatever actually delivers a [`Request`] to the origin
//! and returns its [`Response`]. It sits at the end of the client pipeline,
//! after every interceptor (including the cache) has had its turn.
//!
//! Any `Fn(Request) -> Future` closure is a transport, which keeps test
//! origins to a few lines:
//!
//! ```
//! use semcache::http::{Request, Response, StatusCode};
//! use semcache::transport::{Transport, TransportError};
//!
//! let origin = |_req: Request| async {
//!     Ok::<_, TransportError>(Response::new(StatusCode::OK).body("hi"))
//! };
//!
//! # block_on(async {
//! let response = origin.send(Request::get("localhost", 80, "/")).await.unwrap();
//! assert_eq!(response.text(), "hi");
//! # });
//! # fn block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::{future::Future, pin::Pin};

use thiserror::Error;

use crate::http::{Request, Response, ResponseError};

pub mod tcp;

pub use tcp::TcpTransport;

/// Errors produced while exchanging a request with the origin.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Parse(#[from] ResponseError),

    #[error("connection closed before the response was complete")]
    Incomplete,

    #[error("response exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("origin did not respond within {0:?}")]
    Timeout(std::time::Duration),
}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture = Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send>>;

/// Delivers requests to the origin.
///
/// The returned future must not borrow from `self`: the cache may move it onto
/// a background task for `stale-while-revalidate` refreshes.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> TransportFuture;
}

impl<F, Fut> Transport for F
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Response, TransportError>> + Send + 'static,
{
    fn send(&self, request: Request) -> TransportFuture {
        Box::pin(self(request))
    }
}
