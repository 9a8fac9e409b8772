//! In-memory completion caching with TTL and FIFO eviction.

pub mod completion_cache;

pub use completion_cache::{CacheEntry, CacheStats, CompletionCache, CACHE_TTL, MAX_CACHE_SIZE};
