//! Least-Recently-Used Map
//!
//! Thin layer over [`lru::LruCache`] that also accepts a capacity of zero (a
//! cache that stores nothing) and reports evictions from `insert`.

use fxhash::FxBuildHasher;
use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;

type Inner<K, V> = ::lru::LruCache<K, V, FxBuildHasher>;

/// Fixed-capacity map evicting the least-recently-used entry first
pub struct LruCache<K, V> {
    inner: Option<Inner<K, V>>,
}

impl<K: Hash + Eq + Clone, V: Clone> Clone for LruCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.as_ref().map(|c| {
                let mut copy = Inner::with_hasher(c.cap(), FxBuildHasher::default());
                for (k, v) in c.iter().rev() {
                    copy.push(k.clone(), v.clone());
                }
                copy
            }),
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.inner.as_ref().map_or(0, |c| c.len()))
            .field("capacity", &self.inner.as_ref().map_or(0, |c| c.cap().get()))
            .finish()
    }
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create an empty cache holding at most `capacity` entries.
    ///
    /// A capacity of zero produces a cache that never stores anything.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: NonZeroUsize::new(capacity)
                .map(|cap| Inner::with_hasher(cap, FxBuildHasher::default())),
        }
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.cap().get())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |c| c.len())
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is present. Does not touch recency.
    pub fn contains(&self, key: &K) -> bool {
        self.inner.as_ref().is_some_and(|c| c.contains(key))
    }

    /// Look up `key` and mark it as most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.as_mut()?.get(key)
    }

    /// Look up `key` without changing eviction order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.as_ref()?.peek(key)
    }

    /// Insert or replace `key`, marking it most recently used.
    ///
    /// Returns the evicted `(key, value)` pair when the insert pushed the cache
    /// over capacity.
    pub fn insert(&mut self, key: K, value: V) -> Option<(K, V)> {
        let cache = self.inner.as_mut()?;
        if cache.contains(&key) {
            cache.put(key, value);
            return None;
        }
        cache.push(key, value)
    }

    /// Remove `key` if present.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.as_mut()?.pop(key)
    }

    /// Remove and return the least-recently-used entry.
    pub fn pop_lru(&mut self) -> Option<(K, V)> {
        self.inner.as_mut()?.pop_lru()
    }

    /// Key that would be evicted next
    pub fn lru_key(&self) -> Option<&K> {
        self.inner.as_ref()?.peek_lru().map(|(k, _)| k)
    }

    /// Change the capacity, evicting LRU entries until the cache fits.
    pub fn set_capacity(&mut self, capacity: usize) {
        let Some(cap) = NonZeroUsize::new(capacity) else {
            self.inner = None;
            return;
        };
        match self.inner.as_mut() {
            Some(cache) => cache.resize(cap),
            None => self.inner = Some(Inner::with_hasher(cap, FxBuildHasher::default())),
        }
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if let Some(cache) = self.inner.as_mut() {
            cache.clear();
        }
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> impl Iterator<Item = &K> {
        self.inner
            .iter()
            .flat_map(|c| c.iter().rev().map(|(k, _)| k))
    }
}
