//! Route table and matcher
//!
//! Routes are stored once, in registration order, and indexed two ways:
//!
//! - **Static index**: parameter-free patterns in a per-method hash map,
//!   answered with a single lookup
//! - **Dynamic index**: everything else in a per-method segment trie
//!
//! A table is an immutable value once published by the router. Adding a
//! route clones the indices and swaps the new table in.

use crate::config::RouterConfig;
use crate::error::PatternError;
use crate::handler::BoxedHandler;
use crate::http::HttpMethod;
use crate::logging::warn;
use crate::middleware::Middleware;
use crate::params::{decode_segment, decode_wildcard, Params, WILDCARD_KEY};
use crate::pattern::{fold_case, CompiledPattern};
use crate::trie::{split_path, Captures, Node, RouteId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered route: method, compiled pattern, route-scoped middleware
/// and handler.
pub struct Route {
    pub method: HttpMethod,
    pub pattern: CompiledPattern,
    pub middlewares: Arc<[Arc<dyn Middleware>]>,
    pub handler: BoxedHandler,
}

impl Route {
    pub fn new(
        method: HttpMethod,
        pattern: &str,
        middlewares: Vec<Arc<dyn Middleware>>,
        handler: BoxedHandler,
        config: &RouterConfig,
    ) -> Result<Self, PatternError> {
        Ok(Self {
            method,
            pattern: CompiledPattern::compile(pattern, config)?,
            middlewares: middlewares.into(),
            handler,
        })
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.source)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

/// Which index answered a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Static,
    Dynamic,
}

/// Outcome of a successful lookup.
///
/// Cheap to clone: the route is shared, only the params are copied.
#[derive(Clone)]
pub struct MatchResult {
    route: Arc<Route>,
    pub params: Params,
    pub kind: MatchKind,
}

impl MatchResult {
    #[inline]
    pub fn handler(&self) -> &BoxedHandler {
        &self.route.handler
    }

    /// Route-scoped middleware, in registration order.
    #[inline]
    pub fn middlewares(&self) -> &[Arc<dyn Middleware>] {
        &self.route.middlewares
    }

    #[inline]
    pub fn method(&self) -> HttpMethod {
        self.route.method
    }

    /// The pattern as it was registered.
    #[inline]
    pub fn pattern(&self) -> &str {
        &self.route.pattern.source
    }

    #[inline]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}

impl fmt::Debug for MatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchResult")
            .field("route", &self.route)
            .field("params", &self.params)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Result of inserting into a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    Added,
    /// An equivalent route existed and now points at the new handler.
    Replaced,
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
    statics: HashMap<HttpMethod, HashMap<String, RouteId>>,
    dynamic: HashMap<HttpMethod, Node>,
    case_sensitive: bool,
    strict: bool,
}

impl RouteTable {
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            routes: Vec::new(),
            statics: HashMap::new(),
            dynamic: HashMap::new(),
            case_sensitive: config.case_sensitive,
            strict: config.strict,
        }
    }

    /// Add a route. A route equivalent to an existing one (same method,
    /// same segment shape) replaces it in place.
    pub fn insert(&mut self, route: Route) -> Insertion {
        let next_id = self.routes.len();
        let slot = if route.pattern.is_static {
            let index = self.statics.entry(route.method).or_default();
            match index.get(&route.pattern.static_path) {
                Some(&id) => Some(id),
                None => {
                    index.insert(route.pattern.static_path.clone(), next_id);
                    None
                }
            }
        } else {
            let slot = self
                .dynamic
                .entry(route.method)
                .or_default()
                .slot_mut(&route.pattern.segments);
            match *slot {
                Some(id) => Some(id),
                None => {
                    *slot = Some(next_id);
                    None
                }
            }
        };

        match slot {
            Some(id) => {
                warn!(
                    method = %route.method,
                    pattern = %route.pattern.source,
                    previous = %self.routes[id].pattern.source,
                    "Route registered twice, replacing previous handler"
                );
                self.routes[id] = Arc::new(route);
                Insertion::Replaced
            }
            None => {
                self.routes.push(Arc::new(route));
                Insertion::Added
            }
        }
    }

    /// Resolve a request path (no query string) for `method`.
    ///
    /// Static routes are tried before dynamic ones. Outside strict mode a
    /// path ending in `/` that fails is retried once without it.
    pub fn find(&self, method: HttpMethod, path: &str) -> Option<MatchResult> {
        let path: Cow<'_, str> = if path.starts_with('/') {
            Cow::Borrowed(path)
        } else {
            Cow::Owned(format!("/{}", path))
        };
        let path = path.as_ref();
        let trimmed = if !self.strict && path.len() > 1 {
            path.strip_suffix('/')
        } else {
            None
        };

        self.find_static(method, path)
            .or_else(|| trimmed.and_then(|p| self.find_static(method, p)))
            .or_else(|| self.find_dynamic(method, path))
            .or_else(|| trimmed.and_then(|p| self.find_dynamic(method, p)))
    }

    fn find_static(&self, method: HttpMethod, path: &str) -> Option<MatchResult> {
        let index = self.statics.get(&method)?;
        let key = fold_case(path, self.case_sensitive);
        let id = *index.get(key.as_ref())?;

        Some(MatchResult {
            route: self.routes[id].clone(),
            params: Params::new(),
            kind: MatchKind::Static,
        })
    }

    fn find_dynamic(&self, method: HttpMethod, path: &str) -> Option<MatchResult> {
        let root = self.dynamic.get(&method)?;
        let segments = split_path(path);
        let mut captures = Captures::new();
        let hit = root.lookup(&segments, 0, self.case_sensitive, &mut captures)?;

        let route = &self.routes[hit.route];
        let mut params = Params::with_capacity(route.pattern.param_names.len());
        for (name, raw) in route.pattern.segment_params().zip(captures) {
            params.insert(name, decode_segment(raw));
        }
        if let Some(from) = hit.wildcard_from {
            params.insert(WILDCARD_KEY, decode_wildcard(&segments[from..]));
        }

        Some(MatchResult {
            route: route.clone(),
            params,
            kind: MatchKind::Dynamic,
        })
    }

    /// Methods with a route matching `path`, in [`HttpMethod::ALL`] order.
    pub fn allowed_methods(&self, path: &str) -> Vec<HttpMethod> {
        HttpMethod::ALL
            .into_iter()
            .filter(|method| self.find(*method, path).is_some())
            .collect()
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
