// Middleware pipeline: ordered, continuation-driven execution in front of a handler

use crate::handler::{BoxFuture, BoxedHandler};
use crate::logging::{debug, info, trace, warn};
use crate::{Error, HttpRequest, HttpResponse};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// Continuation handed to a middleware.
///
/// Calling it runs the rest of the chain (and finally the handler). Not
/// calling it stops the pipeline: whatever the middleware returns is final.
/// It is `FnOnce`, so the rest of the chain runs at most once.
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture + Send>;

/// Middleware trait for processing requests before they reach the handler
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Process the request and optionally pass to next middleware
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error>;
}

/// Middleware chain executor
///
/// Middleware runs strictly in order; each one sees the request exactly as
/// its predecessor passed it on.
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a chain from an already ordered list.
    pub fn from_layers(middlewares: Vec<Arc<dyn Middleware>>) -> Self {
        Self {
            middlewares: Arc::new(middlewares),
        }
    }

    /// Add a middleware to the end of the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.push(Arc::new(middleware));
    }

    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        Arc::make_mut(&mut self.middlewares).push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, handler: BoxedHandler) -> Result<HttpResponse, Error> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, handler).await
    }

    fn execute_from(&self, index: usize, req: HttpRequest, handler: BoxedHandler) -> BoxFuture {
        let Some(middleware) = self.middlewares.get(index).cloned() else {
            trace!("Middleware chain complete, calling handler");
            return handler.call(req);
        };

        let chain = self.clone();
        trace!(middleware_index = index, "Executing middleware");
        Box::pin(async move {
            middleware
                .handle(
                    req,
                    Box::new(move |req| chain.execute_from(index + 1, req, handler)),
                )
                .await
        })
    }
}

/// Middleware built from an async closure.
pub struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        (self.f)(req, next).await
    }
}

/// Wrap an async closure as middleware.
///
/// ```ignore
/// let auth = from_fn(|req: HttpRequest, next: Next| async move {
///     if req.header("authorization").is_none() {
///         return Ok(HttpResponse::new(401));
///     }
///     next(req).await
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn Middleware>
where
    F: Fn(HttpRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(FnMiddleware { f })
}

/// Request logging middleware
///
/// Emits one `tracing` event per request with method, path, status and
/// latency.
#[derive(Debug, Clone, Default)]
pub struct LoggerMiddleware;

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, req: HttpRequest, next: Next) -> Result<HttpResponse, Error> {
        let start = std::time::Instant::now();
        let method = req.method;
        let path = req.path.clone();

        let result = next(req).await;
        let duration_us = start.elapsed().as_micros() as u64;

        match &result {
            Ok(response) => {
                info!(
                    method = %method,
                    path = %path,
                    status = response.status,
                    duration_us,
                    "HTTP request completed"
                );
            }
            Err(err) => {
                warn!(
                    method = %method,
                    path = %path,
                    duration_us,
                    error = %err,
                    "HTTP request failed"
                );
            }
        }

        result
    }
}

// ========== Error handling ==========

/// Continuation for error handlers: pass the (possibly replaced) error on to
/// the next error handler.
pub type ErrorNext = Box<dyn FnOnce(Error, HttpRequest) -> BoxFuture + Send>;

/// Receives errors raised anywhere in a pipeline.
///
/// Handlers run in registration order. A handler either produces a response
/// (recovering), or calls `next` to delegate. When every handler delegates,
/// the error is returned to the caller of the pipeline.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle(
        &self,
        error: Error,
        req: HttpRequest,
        next: ErrorNext,
    ) -> Result<HttpResponse, Error>;
}

#[derive(Clone, Default)]
pub struct ErrorChain {
    handlers: Arc<Vec<Arc<dyn ErrorHandler>>>,
}

impl ErrorChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handler: Arc<dyn ErrorHandler>) {
        Arc::make_mut(&mut self.handlers).push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the error through the handlers.
    pub async fn apply(&self, error: Error, req: HttpRequest) -> Result<HttpResponse, Error> {
        debug!(
            handler_count = self.handlers.len(),
            error = %error,
            "Executing error handler chain"
        );
        self.execute_from(0, error, req).await
    }

    fn execute_from(&self, index: usize, error: Error, req: HttpRequest) -> BoxFuture {
        let Some(handler) = self.handlers.get(index).cloned() else {
            return Box::pin(async move { Err::<HttpResponse, Error>(error) });
        };

        let chain = self.clone();
        Box::pin(async move {
            handler
                .handle(
                    error,
                    req,
                    Box::new(move |error, req| chain.execute_from(index + 1, error, req)),
                )
                .await
        })
    }
}

struct FnErrorHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ErrorHandler for FnErrorHandler<F>
where
    F: Fn(Error, HttpRequest, ErrorNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    async fn handle(
        &self,
        error: Error,
        req: HttpRequest,
        next: ErrorNext,
    ) -> Result<HttpResponse, Error> {
        (self.f)(error, req, next).await
    }
}

/// Wrap an async closure as an error handler.
pub fn error_handler_fn<F, Fut>(f: F) -> Arc<dyn ErrorHandler>
where
    F: Fn(Error, HttpRequest, ErrorNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    Arc::new(FnErrorHandler { f })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler;
    use crate::HttpMethod;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    async fn ok_handler(_req: HttpRequest) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::text("handler"))
    }

    async fn echo_header(req: HttpRequest) -> Result<HttpResponse, Error> {
        let value = req.header("x-trace").cloned().unwrap_or_default();
        Ok(HttpResponse::text(value))
    }

    async fn failing_handler(_req: HttpRequest) -> Result<HttpResponse, Error> {
        Err(Error::Internal("handler failed".into()))
    }

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::GET, "/test")
    }

    fn recorder(log: Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Arc<dyn Middleware> {
        from_fn(move |req: HttpRequest, next: Next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(name);
                next(req).await
            }
        })
    }

    #[tokio::test]
    async fn test_empty_chain_calls_handler() {
        let chain = MiddlewareChain::new();
        let response = chain.apply(request(), handler(ok_handler)).await.unwrap();
        assert_eq!(response.body_text(), "handler");
    }

    #[tokio::test]
    async fn test_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::from_layers(vec![
            recorder(log.clone(), "first"),
            recorder(log.clone(), "second"),
            recorder(log.clone(), "third"),
        ]);

        chain.apply(request(), handler(ok_handler)).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_mutations_reach_successors() {
        let mut chain = MiddlewareChain::new();
        chain.push(from_fn(|mut req: HttpRequest, next: Next| async move {
            req.headers.insert("x-trace".to_string(), "abc".to_string());
            next(req).await
        }));

        let response = chain.apply(request(), handler(echo_header)).await.unwrap();
        assert_eq!(response.body_text(), "abc");
    }

    #[tokio::test]
    async fn test_short_circuit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handler_calls = Arc::new(AtomicUsize::new(0));

        let calls = handler_calls.clone();
        let counting = handler(move |_req: HttpRequest| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(HttpResponse::ok())
            }
        });

        let chain = MiddlewareChain::from_layers(vec![
            recorder(log.clone(), "first"),
            from_fn(|_req: HttpRequest, _next: Next| async move {
                Ok::<_, Error>(HttpResponse::new(401))
            }),
            recorder(log.clone(), "never"),
        ]);

        let response = chain.apply(request(), counting).await.unwrap();
        assert_eq!(response.status, 401);
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
        assert_eq!(handler_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_error_aborts_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::from_layers(vec![
            from_fn(|_req: HttpRequest, _next: Next| async move {
                Err::<HttpResponse, _>(Error::Forbidden("denied".into()))
            }),
            recorder(log.clone(), "never"),
        ]);

        let err = chain.apply(request(), handler(ok_handler)).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_error_propagates_through_middleware() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::from_layers(vec![recorder(log.clone(), "outer")]);

        let err = chain
            .apply(request(), handler(failing_handler))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(*log.lock().unwrap(), vec!["outer"]);
    }

    #[tokio::test]
    async fn test_middleware_can_await_before_continuing() {
        let chain = MiddlewareChain::from_layers(vec![from_fn(
            |req: HttpRequest, next: Next| async move {
                tokio::task::yield_now().await;
                next(req).await
            },
        )]);

        let response = chain.apply(request(), handler(ok_handler)).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_logger_middleware_passes_through() {
        let mut chain = MiddlewareChain::new();
        chain.use_middleware(LoggerMiddleware::new());

        let response = chain.apply(request(), handler(ok_handler)).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_error_chain_without_handlers_returns_error() {
        let chain = ErrorChain::new();
        let err = chain
            .apply(Error::Internal("x".into()), request())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn test_error_chain_delegation_and_recovery() {
        let mut chain = ErrorChain::new();
        chain.push(error_handler_fn(
            |error: Error, req: HttpRequest, next: ErrorNext| async move {
                // Rewrap and delegate
                next(Error::BadRequest(format!("wrapped: {}", error)), req).await
            },
        ));
        chain.push(error_handler_fn(
            |error: Error, _req: HttpRequest, _next: ErrorNext| async move {
                Ok::<_, Error>(
                    HttpResponse::text(error.to_string()).with_status(error.status_code()),
                )
            },
        ));

        let response = chain
            .apply(Error::Internal("db down".into()), request())
            .await
            .unwrap();
        assert_eq!(response.status, 400);
        assert!(response.body_text().contains("wrapped"));
    }
}
