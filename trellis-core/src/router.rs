//! Request router
//!
//! [`Router`] is the context object that owns everything routing needs:
//! the published route table, the match cache, middleware layers and error
//! handlers. Share it across connections with `Arc<Router>`.
//!
//! ```ignore
//! let mut router = Router::new();
//! router.use_middleware(Arc::new(LoggerMiddleware::new()));
//! router.get("/users/:id(\\d+)", show_user)?;
//! router.get("/static/*", serve_file)?;
//!
//! let response = router.handle(request).await?;
//! ```
//!
//! Routes can be added while requests are being served: each registration
//! publishes a new table and invalidates the cache. Middleware and error
//! handlers are fixed once the router is shared.

use crate::config::RouterConfig;
use crate::handler::{handler, BoxedHandler, IntoHandler};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::logging::{debug, trace};
use crate::middleware::{ErrorChain, ErrorHandler, Middleware, MiddlewareChain};
use crate::params::{parse_query_string, WILDCARD_KEY};
use crate::pattern::fold_case;
use crate::route_cache::{CacheLookup, RouteCache, RouteCacheStats};
use crate::table::{Insertion, MatchKind, MatchResult, Route, RouteTable};
use crate::Error;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct Router {
    config: RouterConfig,
    table: RwLock<Arc<RouteTable>>,
    cache: RouteCache,
    global: Vec<Arc<dyn Middleware>>,
    scoped: Vec<(String, Arc<dyn Middleware>)>,
    errors: ErrorChain,
    stats: RouterStats,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            table: RwLock::new(Arc::new(RouteTable::new(&config))),
            cache: RouteCache::new(config.cache_capacity),
            global: Vec::new(),
            scoped: Vec::new(),
            errors: ErrorChain::new(),
            stats: RouterStats::default(),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    // ========== Registration ==========

    /// Register a route.
    ///
    /// The pattern is compiled before anything is published, so an invalid
    /// pattern leaves the router untouched. Registering a route equivalent
    /// to an existing one replaces it.
    pub fn add_route(
        &self,
        method: HttpMethod,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: BoxedHandler,
    ) -> Result<(), Error> {
        let route = Route::new(method, pattern, middlewares, handler, &self.config)?;
        self.publish(vec![route]);
        Ok(())
    }

    /// Insert already compiled routes as one table swap.
    fn publish(&self, routes: Vec<Route>) {
        let mut table = self.table.write();
        let next = Arc::make_mut(&mut *table);
        for route in routes {
            let method = route.method;
            let pattern = route.pattern.source.clone();
            let outcome = next.insert(route);
            debug!(
                method = %method,
                pattern = %pattern,
                replaced = outcome == Insertion::Replaced,
                route_count = next.len(),
                "Route registered"
            );
        }
        // Cleared under the table lock so no lookup can cache a result from
        // the previous table after this point.
        self.cache.invalidate();
    }

    pub fn get<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::GET, pattern, Vec::new(), handler(h))
    }

    pub fn post<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::POST, pattern, Vec::new(), handler(h))
    }

    pub fn put<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::PUT, pattern, Vec::new(), handler(h))
    }

    pub fn delete<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::DELETE, pattern, Vec::new(), handler(h))
    }

    pub fn patch<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::PATCH, pattern, Vec::new(), handler(h))
    }

    pub fn head<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::HEAD, pattern, Vec::new(), handler(h))
    }

    pub fn options<H, Args>(&self, pattern: &str, h: H) -> Result<(), Error>
    where
        H: IntoHandler<Args>,
    {
        self.add_route(HttpMethod::OPTIONS, pattern, Vec::new(), handler(h))
    }

    /// Run `middleware` in front of every route.
    pub fn use_middleware(&mut self, middleware: Arc<dyn Middleware>) {
        self.global.push(middleware);
    }

    /// Run `middleware` for paths equal to `prefix` or below it.
    ///
    /// `/api` covers `/api` and `/api/users` but not `/apis`.
    pub fn use_at(&mut self, prefix: &str, middleware: Arc<dyn Middleware>) {
        let prefix = normalize_prefix(prefix);
        let prefix = fold_case(&prefix, self.config.case_sensitive).into_owned();
        self.scoped.push((prefix, middleware));
    }

    /// Add an error handler. Handlers run in registration order.
    pub fn on_error(&mut self, handler: Arc<dyn ErrorHandler>) {
        self.errors.push(handler);
    }

    /// Mount `inner` under `prefix`.
    ///
    /// Requests for `prefix` or anything below it are handed to `inner`
    /// with the prefix stripped from `path` and appended to `base_path`.
    /// The prefix may contain parameters; the inner router keeps them only
    /// if it was configured with `merge_params`.
    pub fn mount(&self, prefix: &str, inner: Router) -> Result<(), Error> {
        let prefix = normalize_prefix(prefix);
        let depth = if prefix == "/" {
            0
        } else {
            prefix.matches('/').count()
        };
        let inner = Arc::new(inner);

        let mounted = handler(move |req: HttpRequest| {
            let inner = inner.clone();
            async move { inner.handle(strip_mount_prefix(req, depth)).await }
        });

        let below = if prefix == "/" {
            "/*".to_string()
        } else {
            format!("{}/*", prefix)
        };
        // Compile every route before publishing any of them
        let mut routes = Vec::with_capacity(HttpMethod::ALL.len() * 2);
        for method in HttpMethod::ALL {
            for pattern in [prefix.as_str(), below.as_str()] {
                routes.push(Route::new(
                    method,
                    pattern,
                    Vec::new(),
                    mounted.clone(),
                    &self.config,
                )?);
            }
        }
        self.publish(routes);

        debug!(prefix = %prefix, "Router mounted");
        Ok(())
    }

    // ========== Matching ==========

    /// Resolve `(method, path)` to a route. `path` must not contain the
    /// query string.
    pub fn match_route(&self, method: HttpMethod, path: &str) -> Option<MatchResult> {
        self.stats.lookups.fetch_add(1, Ordering::Relaxed);

        let result = if self.config.cache_enabled {
            match self.cache.lookup(method, path) {
                CacheLookup::Hit(result) => {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    result
                }
                CacheLookup::Miss => {
                    // Generation first, then the table: see `RouteCache::store`
                    let generation = self.cache.generation();
                    let result = self.lookup_table(method, path);
                    self.cache.store(method, path, result.clone(), generation);
                    result
                }
            }
        } else {
            self.lookup_table(method, path)
        };

        if result.is_none() {
            self.stats.not_found.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            method = %method,
            path,
            pattern = result.as_ref().map(MatchResult::pattern),
            "Route lookup"
        );
        result
    }

    fn lookup_table(&self, method: HttpMethod, path: &str) -> Option<MatchResult> {
        let result = self.snapshot().find(method, path);
        match result.as_ref().map(|m| m.kind) {
            Some(MatchKind::Static) => {
                self.stats.static_matches.fetch_add(1, Ordering::Relaxed);
            }
            Some(MatchKind::Dynamic) => {
                self.stats.dynamic_matches.fetch_add(1, Ordering::Relaxed);
            }
            None => {}
        }
        result
    }

    /// Methods that have a route for `path`. Never cached.
    pub fn allowed_methods(&self, path: &str) -> Vec<HttpMethod> {
        self.snapshot().allowed_methods(path)
    }

    /// The currently published table.
    fn snapshot(&self) -> Arc<RouteTable> {
        self.table.read().clone()
    }

    /// `(method, pattern)` of every registered route, in registration order.
    pub fn routes(&self) -> Vec<(HttpMethod, String)> {
        self.snapshot()
            .routes()
            .map(|route| (route.method, route.pattern.source.clone()))
            .collect()
    }

    pub fn route_count(&self) -> usize {
        self.table.read().len()
    }

    // ========== Dispatch ==========

    /// Route a request and run it through the pipeline.
    ///
    /// The query string is split off `path` into `query_params`. Global
    /// middleware runs first, then path-scoped middleware, then the route's
    /// own middleware, then the handler. Any error from that chain is
    /// offered to the error handlers; if none of them produce a response it
    /// is returned.
    pub async fn handle(&self, mut req: HttpRequest) -> Result<HttpResponse, Error> {
        if let Some(index) = req.path.find('?') {
            let query = parse_query_string(&req.path[index + 1..]);
            req.query_params.extend(query);
            req.path.truncate(index);
        }
        if !req.path.starts_with('/') {
            req.path.insert(0, '/');
        }

        let Some(matched) = self.match_route(req.method, &req.path) else {
            return Err(self.no_route(req.method, &req.path));
        };

        let layers = self.layers_for(&req.path, matched.middlewares());
        let route_handler = matched.handler().clone();
        let mut params = matched.params;
        if self.config.merge_params {
            params.merge_outer(&req.path_params);
        }
        req.path_params = params;

        let snapshot = (!self.errors.is_empty()).then(|| req.clone());
        match MiddlewareChain::from_layers(layers)
            .apply(req, route_handler)
            .await
        {
            Ok(response) => Ok(response),
            Err(error) => {
                debug!(error = %error, "Request pipeline failed");
                match snapshot {
                    Some(req) => self.errors.apply(error, req).await,
                    None => Err(error),
                }
            }
        }
    }

    fn layers_for(
        &self,
        path: &str,
        route_layers: &[Arc<dyn Middleware>],
    ) -> Vec<Arc<dyn Middleware>> {
        let mut layers =
            Vec::with_capacity(self.global.len() + self.scoped.len() + route_layers.len());
        layers.extend(self.global.iter().cloned());

        if !self.scoped.is_empty() {
            let path = fold_case(path, self.config.case_sensitive);
            layers.extend(
                self.scoped
                    .iter()
                    .filter(|(prefix, _)| prefix_covers(prefix, &path))
                    .map(|(_, middleware)| middleware.clone()),
            );
        }

        layers.extend(route_layers.iter().cloned());
        layers
    }

    fn no_route(&self, method: HttpMethod, path: &str) -> Error {
        let allowed = self.allowed_methods(path);
        if allowed.is_empty() {
            return Error::RouteNotFound(format!("{} {}", method, path));
        }
        let allowed: Vec<&str> = allowed.iter().map(HttpMethod::as_str).collect();
        Error::MethodNotAllowed(format!("{} {} (allowed: {})", method, path, allowed.join(", ")))
    }

    // ========== Statistics ==========

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    pub fn cache_stats(&self) -> &RouteCacheStats {
        self.cache.stats()
    }

    /// Number of cached lookup outcomes.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics
#[derive(Debug, Default)]
pub struct RouterStats {
    lookups: AtomicU64,
    static_matches: AtomicU64,
    dynamic_matches: AtomicU64,
    cache_hits: AtomicU64,
    not_found: AtomicU64,
}

impl RouterStats {
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Table lookups answered by the static index.
    pub fn static_matches(&self) -> u64 {
        self.static_matches.load(Ordering::Relaxed)
    }

    /// Table lookups answered by the trie.
    pub fn dynamic_matches(&self) -> u64 {
        self.dynamic_matches.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }
}

/// Leading slash, no trailing slash (except for the root itself).
fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

fn prefix_covers(prefix: &str, path: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Move the first `depth` segments of `req.path` onto `req.base_path`.
fn strip_mount_prefix(mut req: HttpRequest, depth: usize) -> HttpRequest {
    let (consumed, rest) = split_at_segment(&req.path, depth);
    let rest = if rest.is_empty() { "/" } else { rest }.to_string();
    req.base_path.push_str(consumed);
    req.path = rest;
    req.path_params.remove(WILDCARD_KEY);
    req
}

/// Split `/a/b/c` after `depth` segments: depth 1 gives `("/a", "/b/c")`.
fn split_at_segment(path: &str, depth: usize) -> (&str, &str) {
    path.match_indices('/')
        .nth(depth)
        .map(|(index, _)| path.split_at(index))
        .unwrap_or((path, ""))
}
