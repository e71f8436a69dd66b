// Handler dispatch for matched routes
//
// Handlers are opaque to the router: they are stored type-erased in the
// route table and only ever called. The `Handler` trait keeps the concrete
// future type so each handler body is monomorphized, and `BoxedHandler`
// erases it at storage time.

use crate::{Error, HttpRequest, HttpResponse};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handlers, middleware and continuations.
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<HttpResponse, Error>> + Send>>;

/// A handler that can process HTTP requests.
///
/// # Example
///
/// ```ignore
/// async fn show_user(req: HttpRequest) -> Result<HttpResponse, Error> {
///     Ok(HttpResponse::text(req.param("id").unwrap_or_default()))
/// }
///
/// router.get("/users/:id", show_user)?;
/// ```
pub trait Handler: Clone + Send + Sync + 'static {
    /// The future returned by `call`.
    type Future: Future<Output = Result<HttpResponse, Error>> + Send + 'static;

    /// Handle an HTTP request.
    fn call(&self, req: HttpRequest) -> Self::Future;
}

/// Trait for converting various function types into handlers.
pub trait IntoHandler<Args>: Clone + Send + Sync + 'static {
    /// The handler type this converts into.
    type Handler: Handler;

    /// Convert into a handler.
    fn into_handler(self) -> Self::Handler;
}

/// A function handler that wraps an async function.
#[derive(Clone)]
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Create a new function handler.
    #[inline(always)]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(HttpRequest) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    type Future = Fut;

    #[inline(always)]
    fn call(&self, req: HttpRequest) -> Self::Future {
        (self.f)(req)
    }
}

impl<F, Fut> IntoHandler<(HttpRequest,)> for F
where
    F: Fn(HttpRequest) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<HttpResponse, Error>> + Send + 'static,
{
    type Handler = FnHandler<F>;

    #[inline(always)]
    fn into_handler(self) -> Self::Handler {
        FnHandler::new(self)
    }
}

/// Type-erased handler stored in the route table.
///
/// Cloning is an `Arc` bump, so match results can carry the handler out of
/// the table and the cache without copying it.
pub struct BoxedHandler {
    inner: Arc<dyn ErasedHandler>,
}

impl BoxedHandler {
    /// Create a new boxed handler from any Handler.
    #[inline]
    pub fn new<H: Handler>(handler: H) -> Self {
        Self {
            inner: Arc::new(HandlerWrapper {
                handler,
                _marker: PhantomData,
            }),
        }
    }

    /// Call the handler.
    #[inline(always)]
    pub fn call(&self, req: HttpRequest) -> BoxFuture {
        self.inner.call(req)
    }

    /// Whether two boxed handlers share the same underlying handler.
    #[inline]
    pub fn ptr_eq(&self, other: &BoxedHandler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Clone for BoxedHandler {
    #[inline]
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for BoxedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoxedHandler")
    }
}

trait ErasedHandler: Send + Sync {
    fn call(&self, req: HttpRequest) -> BoxFuture;
}

struct HandlerWrapper<H: Handler> {
    handler: H,
    _marker: PhantomData<fn() -> H::Future>,
}

impl<H: Handler> ErasedHandler for HandlerWrapper<H> {
    #[inline(always)]
    fn call(&self, req: HttpRequest) -> BoxFuture {
        Box::pin(self.handler.call(req))
    }
}

/// Create a boxed handler from a function.
///
/// ```ignore
/// let h = handler(show_user);
/// router.add_route(HttpMethod::GET, "/users/:id", Vec::new(), h)?;
/// ```
#[inline]
pub fn handler<H, Args>(h: H) -> BoxedHandler
where
    H: IntoHandler<Args>,
{
    BoxedHandler::new(h.into_handler())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpMethod;

    async fn test_handler(_req: HttpRequest) -> Result<HttpResponse, Error> {
        Ok(HttpResponse::ok())
    }

    fn request() -> HttpRequest {
        HttpRequest::new(HttpMethod::GET, "/test")
    }

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(test_handler);
        let response = handler.call(request()).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_boxed_handler() {
        let boxed = BoxedHandler::new(test_handler.into_handler());
        let response = boxed.call(request()).await.unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_clone_shares_handler() {
        let h1 = handler(test_handler);
        let h2 = h1.clone();
        assert!(h1.ptr_eq(&h2));
        assert!(!h1.ptr_eq(&handler(test_handler)));

        assert_eq!(h2.call(request()).await.unwrap().status, 200);
    }

    #[test]
    fn test_closure_handler_outside_runtime() {
        let h = handler(|req: HttpRequest| async move {
            Ok::<_, Error>(HttpResponse::text(req.path))
        });
        let response = tokio_test::block_on(h.call(request())).unwrap();
        assert_eq!(response.body_text(), "/test");
    }

    #[test]
    fn test_handler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<BoxedHandler>();
    }
}
