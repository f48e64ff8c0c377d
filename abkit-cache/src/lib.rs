#![warn(missing_docs)]
//! abkit Cache Layer
//!
//! Bounded memoization for the statistical engines:
//! - `LruCache`: fixed-capacity map that evicts the least-recently-used entry
//! - `MemoCache`: LRU keyed by the stable JSON serialization of an argument tuple
//! - `Memoized`: wraps a pure function together with its own `MemoCache`
//!
//! Caches are plain values owned by whoever needs them. There is no process-wide
//! singleton and no invalidation besides capacity pressure: every wrapped function
//! is pure, so a cached value can never go stale.

mod lru;
mod memo;

pub use self::lru::LruCache;
pub use memo::{CacheStats, MemoCache, Memoized, cache_key};
