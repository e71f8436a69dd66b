//! Route match caching
//!
//! Bounded LRU cache of lookup outcomes keyed by `(method, path)`. Misses
//! are cached too, so a flood of requests for an unknown path only walks
//! the table once.
//!
//! # Invalidation
//!
//! Every route registration clears the cache and bumps a generation
//! counter. A lookup that started before the registration records the
//! generation it saw and [`RouteCache::store`] refuses to write its result
//! if the generation has moved on, so a stale match can never land in the
//! cache after it was cleared.

use crate::http::HttpMethod;
use crate::table::MatchResult;
use lru::LruCache;
use parking_lot::Mutex;
use std::borrow::Borrow;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Owned cache key. Reads go through `KeyView` borrowed from a
/// `(method, &str)` pair, so only `store` allocates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RouteKey {
    method: HttpMethod,
    path: String,
}

impl RouteKey {
    #[inline]
    fn new(method: HttpMethod, path: &str) -> Self {
        Self {
            method,
            path: path.to_string(),
        }
    }
}

trait KeyView {
    fn method(&self) -> HttpMethod;
    fn path(&self) -> &str;
}

impl KeyView for RouteKey {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn path(&self) -> &str {
        &self.path
    }
}

struct BorrowedKey<'p> {
    method: HttpMethod,
    path: &'p str,
}

impl KeyView for BorrowedKey<'_> {
    fn method(&self) -> HttpMethod {
        self.method
    }

    fn path(&self) -> &str {
        self.path
    }
}

impl<'a> Borrow<dyn KeyView + 'a> for RouteKey {
    fn borrow(&self) -> &(dyn KeyView + 'a) {
        self
    }
}

// Owned and borrowed keys must hash identically
impl Hash for dyn KeyView + '_ {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.method().hash(state);
        self.path().hash(state);
    }
}

impl PartialEq for dyn KeyView + '_ {
    fn eq(&self, other: &Self) -> bool {
        self.method() == other.method() && self.path() == other.path()
    }
}

impl Eq for dyn KeyView + '_ {}

impl Hash for RouteKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self as &dyn KeyView).hash(state);
    }
}

/// A cached lookup outcome. `result` is `None` for a cached miss.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub result: Option<MatchResult>,
    pub last_accessed: Instant,
    pub hit_count: u64,
}

/// Answer from [`RouteCache::lookup`].
#[derive(Debug)]
pub enum CacheLookup {
    /// The key is cached; the inner value is the cached outcome.
    Hit(Option<MatchResult>),
    Miss,
}

struct CacheState {
    entries: LruCache<RouteKey, CacheEntry>,
    generation: u64,
}

pub struct RouteCache {
    state: Mutex<CacheState>,
    stats: RouteCacheStats,
}

impl RouteCache {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                generation: 0,
            }),
            stats: RouteCacheStats::default(),
        }
    }

    /// Look up a cached outcome, marking it most recently used.
    pub fn lookup(&self, method: HttpMethod, path: &str) -> CacheLookup {
        let key = BorrowedKey { method, path };
        let mut state = self.state.lock();
        match state.entries.get_mut(&key as &dyn KeyView) {
            Some(entry) => {
                entry.last_accessed = Instant::now();
                entry.hit_count += 1;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Hit(entry.result.clone())
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Miss
            }
        }
    }

    /// Current generation. Read this before consulting the route table.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Store an outcome computed under `generation`.
    ///
    /// Returns `false` (and stores nothing) when routes changed since.
    pub fn store(
        &self,
        method: HttpMethod,
        path: &str,
        result: Option<MatchResult>,
        generation: u64,
    ) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            self.stats.stale_discards.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let replacing = state
            .entries
            .contains(&BorrowedKey { method, path } as &dyn KeyView);
        let key = RouteKey::new(method, path);
        let entry = CacheEntry {
            result,
            last_accessed: Instant::now(),
            hit_count: 0,
        };
        if state.entries.push(key, entry).is_some() && !replacing {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Drop every entry and start a new generation.
    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.generation += 1;
        self.stats.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Peek at an entry without touching its recency.
    pub fn entry(&self, method: HttpMethod, path: &str) -> Option<CacheEntry> {
        let key = BorrowedKey { method, path };
        self.state
            .lock()
            .entries
            .peek(&key as &dyn KeyView)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().entries.cap().get()
    }

    pub fn stats(&self) -> &RouteCacheStats {
        &self.stats
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_CAPACITY)
    }
}

/// Route cache statistics
#[derive(Debug, Default)]
pub struct RouteCacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
    stale_discards: AtomicU64,
}

impl RouteCacheStats {
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn insertions(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations.load(Ordering::Relaxed)
    }

    /// Results dropped because routes changed while they were computed.
    pub fn stale_discards(&self) -> u64 {
        self.stale_discards.load(Ordering::Relaxed)
    }

    /// Cache hit ratio
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_miss_then_hit() {
        let cache = RouteCache::new(10);
        assert!(matches!(cache.lookup(HttpMethod::GET, "/a"), CacheLookup::Miss));

        let generation = cache.generation();
        assert!(cache.store(HttpMethod::GET, "/a", None, generation));

        // A cached "no route" is still a hit
        assert!(matches!(
            cache.lookup(HttpMethod::GET, "/a"),
            CacheLookup::Hit(None)
        ));
        assert_eq!(cache.stats().hits(), 1);
        assert_eq!(cache.stats().misses(), 1);
        assert_eq!(cache.stats().hit_ratio(), 0.5);
    }

    #[test]
    fn test_method_is_part_of_key() {
        let cache = RouteCache::new(10);
        cache.store(HttpMethod::GET, "/a", None, 0);
        assert!(matches!(cache.lookup(HttpMethod::POST, "/a"), CacheLookup::Miss));
    }

    #[test]
    fn test_hit_count_and_recency() {
        let cache = RouteCache::new(10);
        cache.store(HttpMethod::GET, "/a", None, 0);
        let stored_at = cache.entry(HttpMethod::GET, "/a").unwrap().last_accessed;

        cache.lookup(HttpMethod::GET, "/a");
        cache.lookup(HttpMethod::GET, "/a");

        let entry = cache.entry(HttpMethod::GET, "/a").unwrap();
        assert_eq!(entry.hit_count, 2);
        assert!(entry.last_accessed >= stored_at);
    }

    #[test]
    fn test_lru_evicts_exactly_one() {
        let cache = RouteCache::new(2);
        cache.store(HttpMethod::GET, "/a", None, 0);
        cache.store(HttpMethod::GET, "/b", None, 0);
        // Touch /a so /b becomes least recently used
        cache.lookup(HttpMethod::GET, "/a");
        cache.store(HttpMethod::GET, "/c", None, 0);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions(), 1);
        assert!(cache.entry(HttpMethod::GET, "/a").is_some());
        assert!(cache.entry(HttpMethod::GET, "/b").is_none());
        assert!(cache.entry(HttpMethod::GET, "/c").is_some());
    }

    #[test]
    fn test_overwrite_is_not_an_eviction() {
        let cache = RouteCache::new(2);
        cache.store(HttpMethod::GET, "/a", None, 0);
        cache.store(HttpMethod::GET, "/a", None, 0);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().evictions(), 0);
        assert_eq!(cache.stats().insertions(), 2);
    }

    #[test]
    fn test_invalidate_clears_and_rejects_stale_store() {
        let cache = RouteCache::new(10);
        let before = cache.generation();
        cache.store(HttpMethod::GET, "/a", None, before);

        cache.invalidate();
        assert!(cache.is_empty());
        assert_eq!(cache.generation(), before + 1);

        assert!(!cache.store(HttpMethod::GET, "/b", None, before));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().stale_discards(), 1);
        assert_eq!(cache.stats().invalidations(), 1);
    }

    #[test]
    fn test_borrowed_lookup_finds_owned_keys() {
        let cache = RouteCache::new(10);
        let path = String::from("/Users/7");
        cache.store(HttpMethod::GET, &path, None, 0);
        cache.store(HttpMethod::GET, "/users/7", None, 0);
        assert_eq!(cache.len(), 2);

        // Keys compare byte for byte; folding is the table's job
        assert!(matches!(cache.lookup(HttpMethod::GET, "/Users/7"), CacheLookup::Hit(None)));
        assert!(matches!(cache.lookup(HttpMethod::GET, "/users/7"), CacheLookup::Hit(None)));
        assert!(matches!(cache.lookup(HttpMethod::GET, "/USERS/7"), CacheLookup::Miss));
        assert!(matches!(cache.lookup(HttpMethod::HEAD, "/users/7"), CacheLookup::Miss));
        assert_eq!(cache.entry(HttpMethod::GET, "/Users/7").unwrap().hit_count, 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = RouteCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
