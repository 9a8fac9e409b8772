//! Completion cache with TTL expiry and FIFO eviction.
//!
//! Keyed by the exact prompt text sent to the backend. Entries expire after a
//! configurable TTL and are evicted oldest-inserted first when the store
//! reaches capacity. Lookups do not refresh an entry's position: a hot old
//! entry is still evicted before a cold newer one.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tracing::debug;

/// Default capacity.
pub const MAX_CACHE_SIZE: usize = 50;

/// Default entry lifetime (5 minutes).
pub const CACHE_TTL: Duration = Duration::from_secs(300);

/// A single cached completion.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Completion text returned by the backend.
    pub result: String,
    /// When the entry was inserted.
    pub created_at: Instant,
    /// Insertion sequence number; ties the entry to its slot in `order`.
    seq: u64,
}

/// In-memory prompt → completion cache.
///
/// `entries` gives O(1) lookup; `order` records insertion order as
/// `(seq, prompt)` pairs. A slot whose seq no longer matches the live entry
/// is a tombstone left by a removal and is skipped during eviction.
#[derive(Debug)]
pub struct CompletionCache {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<(u64, String)>,
    next_seq: u64,
    ttl: Duration,
    max_entries: usize,
    stats: CacheStats,
}

impl CompletionCache {
    /// Create a cache with the given TTL and capacity.
    ///
    /// `max_entries` is clamped to a minimum of 1.
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
            ttl,
            max_entries: max_entries.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Look up a prompt. Returns `None` if absent or expired.
    ///
    /// An expired entry is removed as a side effect.
    pub fn lookup(&mut self, prompt: &str) -> Option<String> {
        self.lookup_at(prompt, Instant::now())
    }

    fn lookup_at(&mut self, prompt: &str, now: Instant) -> Option<String> {
        let expired = self
            .entries
            .get(prompt)
            .map(|e| now.saturating_duration_since(e.created_at) >= self.ttl);
        match expired {
            Some(true) => {
                debug!(prompt_len = prompt.len(), "Cache entry expired, removing");
                self.entries.remove(prompt);
                self.stats.expirations += 1;
                self.stats.misses += 1;
                self.compact();
                None
            }
            Some(false) => {
                self.stats.hits += 1;
                self.entries.get(prompt).map(|e| e.result.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Store a completion for `prompt`.
    ///
    /// Replaces any resident entry for the same prompt, then evicts the
    /// oldest-inserted entries until there is room.
    pub fn insert(&mut self, prompt: String, result: String) {
        let now = Instant::now();
        // Dropping the live entry turns its old slot into a tombstone.
        self.entries.remove(&prompt);
        while self.entries.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((seq, prompt.clone()));
        self.entries.insert(
            prompt,
            CacheEntry {
                result,
                created_at: now,
                seq,
            },
        );
        self.compact();
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!(entries = self.entries.len(), "Clearing completion cache");
        }
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Snapshot of hit/miss/eviction counters plus the resident count.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            ..self.stats.clone()
        }
    }

    // -- private helpers ---------------------------------------------------

    /// Pop slots from the front until a live entry is removed.
    fn evict_oldest(&mut self) -> bool {
        while let Some((seq, prompt)) = self.order.pop_front() {
            let live = self.entries.get(&prompt).is_some_and(|e| e.seq == seq);
            if live {
                debug!(prompt_len = prompt.len(), "Evicting oldest cache entry");
                self.entries.remove(&prompt);
                self.stats.evictions += 1;
                return true;
            }
        }
        false
    }

    /// Drop tombstones once they outnumber live entries so `order` stays
    /// proportional to the cache size.
    fn compact(&mut self) {
        if self.order.len() <= self.entries.len() * 2 + 1 {
            return;
        }
        let entries = &self.entries;
        self.order
            .retain(|(seq, prompt)| entries.get(prompt).is_some_and(|e| e.seq == *seq));
    }
}

impl Default for CompletionCache {
    fn default() -> Self {
        Self::new(CACHE_TTL, MAX_CACHE_SIZE)
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache.
    pub total_entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room.
    pub evictions: u64,
    /// Entries dropped because their TTL passed.
    pub expirations: u64,
}
