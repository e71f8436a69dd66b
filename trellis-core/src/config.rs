//! Router configuration
//!
//! Flags here are applied uniformly to every route at compile time, never
//! per route. Values can come from code, from any serde source the host
//! application already loads, or from `TRELLIS_ROUTER_*` environment
//! variables.
//!
//! ```
//! use trellis_core::RouterConfig;
//!
//! let config = RouterConfig::new()
//!     .case_sensitive(true)
//!     .cache_capacity(4096);
//! assert!(config.case_sensitive);
//! ```

use serde::Deserialize;
use std::env;

/// Default number of cached match results.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Compare literal segments (and constraints) case-sensitively.
    pub case_sensitive: bool,
    /// Treat `/users` and `/users/` as different paths.
    pub strict: bool,
    /// Memoise match results per (method, path).
    pub cache_enabled: bool,
    /// Upper bound on cached match results.
    pub cache_capacity: usize,
    /// When mounted, overlay this router's params onto the parent's.
    pub merge_params: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            strict: false,
            cache_enabled: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            merge_params: false,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `TRELLIS_ROUTER_*` environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// - `TRELLIS_ROUTER_CASE_SENSITIVE=1|true`
    /// - `TRELLIS_ROUTER_STRICT=1|true`
    /// - `TRELLIS_ROUTER_CACHE=0|false` disables the cache
    /// - `TRELLIS_ROUTER_CACHE_CAPACITY=<n>`
    /// - `TRELLIS_ROUTER_MERGE_PARAMS=1|true`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            case_sensitive: env_flag("TRELLIS_ROUTER_CASE_SENSITIVE")
                .unwrap_or(defaults.case_sensitive),
            strict: env_flag("TRELLIS_ROUTER_STRICT").unwrap_or(defaults.strict),
            cache_enabled: env_flag("TRELLIS_ROUTER_CACHE").unwrap_or(defaults.cache_enabled),
            cache_capacity: env::var("TRELLIS_ROUTER_CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.cache_capacity),
            merge_params: env_flag("TRELLIS_ROUTER_MERGE_PARAMS")
                .unwrap_or(defaults.merge_params),
        }
    }

    pub fn case_sensitive(mut self, enabled: bool) -> Self {
        self.case_sensitive = enabled;
        self
    }

    pub fn strict(mut self, enabled: bool) -> Self {
        self.strict = enabled;
        self
    }

    pub fn cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn merge_params(mut self, enabled: bool) -> Self {
        self.merge_params = enabled;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
