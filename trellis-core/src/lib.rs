// Core library for the Trellis request router
// Pattern compilation, route matching, match caching and the middleware pipeline

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod params;
pub mod pattern;
pub mod route_cache;
pub mod router;
pub mod table;
mod trie;

// Re-export commonly used types
pub use config::*;
pub use error::*;
pub use handler::{handler, BoxFuture, BoxedHandler, FnHandler, Handler, IntoHandler};
pub use http::*;
pub use middleware::{
    error_handler_fn, from_fn, ErrorChain, ErrorHandler, ErrorNext, LoggerMiddleware, Middleware,
    MiddlewareChain, Next,
};
pub use params::{Params, WILDCARD_KEY};
pub use pattern::{CompiledPattern, Segment};
pub use route_cache::{CacheLookup, RouteCache, RouteCacheStats};
pub use router::{Router, RouterStats};
pub use table::{Insertion, MatchKind, MatchResult, Route, RouteTable};
