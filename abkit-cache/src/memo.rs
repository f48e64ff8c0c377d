//! Argument-Keyed Memoization
//!
//! The cache key is the JSON serialization of the argument tuple. serde emits
//! struct fields in declaration order, so equal arguments always produce the
//! same key.

use crate::lru::LruCache;
use serde::Serialize;
use std::marker::PhantomData;

/// Hit/miss counters for a memo cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that invoked the wrapped function
    pub misses: u64,
    /// Entries currently stored
    pub entries: usize,
    /// Configured capacity
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups served from cache (0.0 when nothing was looked up)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Build the cache key for an argument tuple.
///
/// Returns `None` if the arguments cannot be serialized (for example a map with
/// non-string keys); callers then compute without caching.
pub fn cache_key<A: Serialize + ?Sized>(args: &A) -> Option<String> {
    serde_json::to_string(args).ok()
}

/// LRU cache of computed values keyed by serialized arguments
#[derive(Debug, Clone)]
pub struct MemoCache<V> {
    family: &'static str,
    entries: LruCache<String, V>,
    hits: u64,
    misses: u64,
}

impl<V: Clone> MemoCache<V> {
    /// Create a cache for one function family
    pub fn new(family: &'static str, capacity: usize) -> Self {
        Self {
            family,
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Name of the function family this cache serves
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Return the cached value for `args`, or compute, store and return it.
    pub fn get_or_insert_with<A, F>(&mut self, args: &A, compute: F) -> V
    where
        A: Serialize + ?Sized,
        F: FnOnce() -> V,
    {
        let Some(key) = cache_key(args) else {
            tracing::trace!(family = self.family, "unserializable arguments, bypassing cache");
            self.misses += 1;
            return compute();
        };

        if let Some(value) = self.entries.get(&key) {
            self.hits += 1;
            tracing::trace!(family = self.family, "cache hit");
            return value.clone();
        }

        self.misses += 1;
        let value = compute();
        if let Some((evicted, _)) = self.entries.insert(key, value.clone()) {
            tracing::trace!(family = self.family, key = %evicted, "evicted");
        }
        value
    }

    /// Look up `args` without computing (updates recency on hit)
    pub fn get<A: Serialize + ?Sized>(&mut self, args: &A) -> Option<V> {
        let key = cache_key(args)?;
        self.entries.get(&key).cloned()
    }

    /// Drop every entry and reset counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    /// Change capacity, evicting as needed
    pub fn set_capacity(&mut self, capacity: usize) {
        self.entries.set_capacity(capacity);
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
            capacity: self.entries.capacity(),
        }
    }
}

/// A pure function bundled with its own memo cache
///
/// ```ignore
/// let mut square = Memoized::new("square", 10, |x: &u64| x * x);
/// assert_eq!(square.call(&4), 16);
/// assert_eq!(square.call(&4), 16); // served from cache
/// ```
pub struct Memoized<A: ?Sized, R, F> {
    cache: MemoCache<R>,
    func: F,
    _args: PhantomData<fn(&A)>,
}

impl<A, R, F> Memoized<A, R, F>
where
    A: Serialize + ?Sized,
    R: Clone,
    F: Fn(&A) -> R,
{
    /// Wrap `func` with a cache of `capacity` entries
    pub fn new(family: &'static str, capacity: usize, func: F) -> Self {
        Self {
            cache: MemoCache::new(family, capacity),
            func,
            _args: PhantomData,
        }
    }

    /// Call the wrapped function, reusing a cached result for identical arguments
    pub fn call(&mut self, args: &A) -> R {
        let func = &self.func;
        self.cache.get_or_insert_with(args, || func(args))
    }

    /// Drop every cached result
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Cache counters
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
