//! Interceptor pipeline: composable logic around every outgoing request.
//!
//! Each interceptor wraps the rest of the chain, so it can inspect or rewrite
//! the request, answer it without reaching the origin, or decorate the
//! response on the way back. The cache is one such interceptor.
//!
//! ## Core types
//!
//! - [`Interceptor`]: trait implemented by all interceptors.
//! - [`Next`]: cursor into the remaining chain; [`Next::run`] advances it, and
//!   once every interceptor has run, hands the request to the [`Transport`].
//! - [`InterceptorHandler`]: type-erased, cheaply-cloneable interceptor function.
//! - [`from_interceptor`]: converts an [`Interceptor`] into an [`InterceptorHandler`].
//! - [`LoggerInterceptor`]: built-in request/response logger.

use std::{future::Future, pin::Pin, sync::Arc};
use tokio::time::Instant;

use super::ClientError;
use crate::http::{Request, Response};
use crate::transport::Transport;

/// Future produced by every stage of the pipeline.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response, ClientError>> + Send>>;

/// A type-erased, reference-counted interceptor function.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use semcache::client::{InterceptorHandler, Next, ResponseFuture};
/// use semcache::http::Request;
///
/// let handler: InterceptorHandler = Arc::new(|req: Request, next: Next| -> ResponseFuture {
///     Box::pin(async move { next.run(req.header("X-Trace", "1")).await })
/// });
/// ```
pub type InterceptorHandler = Arc<dyn Fn(Request, Next) -> ResponseFuture + Send + Sync + 'static>;

/// Converts an [`Interceptor`] implementation into an [`InterceptorHandler`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use semcache::client::{LoggerInterceptor, from_interceptor};
///
/// let handler = from_interceptor(Arc::new(LoggerInterceptor));
/// ```
pub fn from_interceptor<I>(interceptor: Arc<I>) -> InterceptorHandler
where
    I: Interceptor + 'static,
{
    Arc::new(move |req: Request, next: Next| interceptor.handle(req, next))
}

/// A cursor into the remaining interceptor chain for a single request.
///
/// `Next` is consumed by [`run`](Self::run). It is also cheap to clone, which
/// lets an interceptor send a second request through the rest of the chain,
/// possibly from a spawned task (the cache does this to revalidate stale
/// entries in the background).
#[derive(Clone)]
pub struct Next {
    interceptors: Arc<[InterceptorHandler]>,
    // Tracks which interceptor to invoke on the next `run` call.
    index: usize,
    transport: Arc<dyn Transport>,
}

impl Next {
    /// Creates a `Next` positioned at the start of `interceptors`.
    pub fn new(interceptors: Arc<[InterceptorHandler]>, transport: Arc<dyn Transport>) -> Self {
        Self {
            interceptors,
            index: 0,
            transport,
        }
    }

    /// Invokes the next interceptor, or the transport once the chain is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Whatever the downstream interceptors or the transport report.
    pub async fn run(mut self, req: Request) -> Result<Response, ClientError> {
        if self.index < self.interceptors.len() {
            let handler = self.interceptors[self.index].clone();
            self.index += 1;
            handler(req, self).await
        } else {
            Ok(self.transport.send(req).await?)
        }
    }
}

/// The core trait for all interceptors.
///
/// Implementors receive a [`Request`] and a [`Next`] cursor. They may:
///
/// - **Pass through**: call `next.run(req).await` without modification.
/// - **Short-circuit**: return a [`Response`] directly without calling `next`.
/// - **Decorate**: call `next.run(req).await`, inspect the response, and return
///   a modified copy.
///
/// Interceptors are shared across tasks, so they must be `Send + Sync` and
/// `handle` must return a `Send` future that owns everything it touches.
pub trait Interceptor: Send + Sync {
    fn handle(&self, req: Request, next: Next) -> ResponseFuture;
}

/// Built-in interceptor that logs each request's method, target, status, and
/// duration.
///
/// Emits a single `tracing::info!` line once the rest of the chain completes:
///
/// ```text
/// METHOD host:port/path - STATUS (duration)
/// ```
///
/// Place it before the cache to see cache hits with their (near-zero)
/// latency, after it to log only origin traffic.
pub struct LoggerInterceptor;

impl Interceptor for LoggerInterceptor {
    fn handle(&self, req: Request, next: Next) -> ResponseFuture {
        Box::pin(async move {
            let start = Instant::now();
            let method = req.method().to_string();
            let target = format!("{}:{}{}", req.host(), req.port(), req.path());

            let result = next.run(req).await;

            let duration = start.elapsed();
            match &result {
                Ok(response) => {
                    tracing::info!("{} {} - {} ({:?})", method, target, response.status(), duration)
                }
                Err(e) => tracing::info!("{} {} - failed: {} ({:?})", method, target, e, duration),
            }

            result
        })
    }
}
