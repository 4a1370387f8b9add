//! In-memory object cache with size limits and LRU eviction.
//!
//! Provides a thread-safe URI -> response store with:
//! - Per-object size cap (larger responses are never stored)
//! - Total size cap enforced by evicting least recently used entries
//! - Immutable `Bytes` snapshots handed to readers
//!
//! Lookups share a read lock and bump the entry's recency through an atomic,
//! so hits never wait on each other. Inserts, including their eviction pass,
//! hold the write lock for the whole mutation.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, trace};

/// A single cached response
#[derive(Debug)]
pub struct CacheEntry {
    /// Raw response bytes (status line, headers and payload)
    body: Bytes,
    /// Logical access time; the smallest value is evicted first
    recency: AtomicU64,
}

impl CacheEntry {
    fn new(body: Bytes, recency: u64) -> Self {
        Self {
            body,
            recency: AtomicU64::new(recency),
        }
    }

    /// Size charged against the cache budget
    pub fn size(&self) -> usize {
        self.body.len()
    }

    fn recency(&self) -> u64 {
        self.recency.load(Ordering::Relaxed)
    }
}

/// Result of an insert
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// Entry stored; `evicted` other entries were removed to make room
    Stored { evicted: usize },
    /// Entry exceeds the per-object or total budget and was not stored
    TooLarge,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    used: usize,
}

/// Thread-safe, bounded object cache keyed by request URI
#[derive(Debug)]
pub struct ObjectCache {
    state: RwLock<CacheState>,
    max_cache_size: usize,
    max_object_size: usize,
    /// Monotonic recency source; every insert and hit takes a fresh value
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ObjectCache {
    /// Create an empty cache
    pub fn new(max_cache_size: usize, max_object_size: usize) -> Self {
        info!(max_cache_size, max_object_size, "Initializing object cache");
        Self {
            state: RwLock::new(CacheState::default()),
            max_cache_size,
            max_object_size,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn max_object_size(&self) -> usize {
        self.max_object_size
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a response by exact URI, marking it as recently used on a hit.
    pub fn lookup(&self, uri: &str) -> Option<Bytes> {
        let state = self.read_state();
        match state.entries.get(uri) {
            Some(entry) => {
                entry.recency.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(uri, size = entry.size(), "Cache hit");
                Some(entry.body.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(uri, "Cache miss");
                None
            }
        }
    }

    /// Store a response under `uri`, evicting least recently used entries
    /// until it fits. Replaces any existing entry for the same URI.
    pub fn insert(&self, uri: &str, body: Bytes) -> InsertOutcome {
        let size = body.len();
        if size > self.max_object_size || size > self.max_cache_size {
            debug!(uri, size, "Object too large to cache");
            return InsertOutcome::TooLarge;
        }

        let mut state = self.write_state();

        if let Some(old) = state.entries.remove(uri) {
            state.used -= old.size();
        }

        let mut evicted = 0;
        while state.used + size > self.max_cache_size {
            if !Self::evict_lru(&mut state) {
                break;
            }
            evicted += 1;
        }

        let entry = CacheEntry::new(body, self.tick());
        state.used += size;
        state.entries.insert(uri.to_string(), entry);

        trace!(
            uri,
            size,
            evicted,
            used = state.used,
            "Object cached"
        );
        InsertOutcome::Stored { evicted }
    }

    /// Remove the entry with the oldest recency. Returns false if empty.
    fn evict_lru(state: &mut CacheState) -> bool {
        let victim = state
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.recency())
            .map(|(key, _)| key.clone());

        match victim {
            Some(key) => {
                if let Some(entry) = state.entries.remove(&key) {
                    state.used -= entry.size();
                    debug!(uri = %key, size = entry.size(), "Evicting LRU object");
                }
                true
            }
            None => false,
        }
    }

    /// Get statistics about the cache
    pub fn stats(&self) -> CacheStats {
        let state = self.read_state();
        CacheStats {
            entries: state.entries.len(),
            bytes_used: state.used,
            max_cache_size: self.max_cache_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes_used: usize,
    pub max_cache_size: usize,
    pub hits: u64,
    pub misses: u64,
}

#[cfg(test)]
impl ObjectCache {
    /// Sum of entry sizes recomputed from scratch.
    fn recount(&self) -> usize {
        self.read_state().entries.values().map(CacheEntry::size).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn body(len: usize, fill: u8) -> Bytes {
        Bytes::from(vec![fill; len])
    }

    #[test]
    fn test_insert_then_lookup() {
        let cache = ObjectCache::new(1024, 256);
        let response = Bytes::from_static(b"HTTP/1.0 200 OK\r\n\r\nhello");

        let outcome = cache.insert("example.com:80/", response.clone());
        assert_eq!(outcome, InsertOutcome::Stored { evicted: 0 });
        assert_eq!(cache.lookup("example.com:80/"), Some(response.clone()));
        assert_eq!(cache.lookup("example.com:80/"), Some(response));
    }

    #[test]
    fn test_lookup_is_exact_match() {
        let cache = ObjectCache::new(1024, 256);
        cache.insert("example.com:80/", body(4, b'a'));

        assert!(cache.lookup("example.com:80").is_none());
        assert!(cache.lookup("EXAMPLE.com:80/").is_none());
        assert!(cache.lookup("example.com:80/ ").is_none());
    }

    #[test]
    fn test_oversized_object_not_stored() {
        let cache = ObjectCache::new(1024, 100);

        assert_eq!(cache.insert("big", body(101, 0)), InsertOutcome::TooLarge);
        assert!(cache.lookup("big").is_none());
        assert_eq!(cache.stats().bytes_used, 0);

        assert_eq!(
            cache.insert("exact", body(100, 0)),
            InsertOutcome::Stored { evicted: 0 }
        );
        assert!(cache.lookup("exact").is_some());
    }

    #[test]
    fn test_object_larger_than_cache_not_stored() {
        let cache = ObjectCache::new(50, 100);
        cache.insert("small", body(10, 0));

        assert_eq!(cache.insert("big", body(60, 0)), InsertOutcome::TooLarge);
        assert!(cache.lookup("small").is_some(), "nothing evicted for a declined insert");
    }

    #[test]
    fn test_evicts_least_recently_inserted() {
        let cache = ObjectCache::new(300, 100);
        cache.insert("a", body(100, b'a'));
        cache.insert("b", body(100, b'b'));
        cache.insert("c", body(100, b'c'));

        let outcome = cache.insert("d", body(100, b'd'));
        assert_eq!(outcome, InsertOutcome::Stored { evicted: 1 });

        assert!(cache.lookup("a").is_none());
        assert!(cache.lookup("b").is_some());
        assert!(cache.lookup("c").is_some());
        assert!(cache.lookup("d").is_some());
    }

    #[test]
    fn test_lookup_refreshes_recency() {
        let cache = ObjectCache::new(300, 100);
        cache.insert("a", body(100, b'a'));
        cache.insert("b", body(100, b'b'));
        cache.insert("c", body(100, b'c'));

        // "a" is now the most recently used
        assert!(cache.lookup("a").is_some());

        cache.insert("d", body(100, b'd'));
        assert!(cache.lookup("a").is_some());
        assert!(cache.lookup("b").is_none());
    }

    #[test]
    fn test_eviction_frees_enough_room() {
        let cache = ObjectCache::new(300, 300);
        cache.insert("a", body(100, 0));
        cache.insert("b", body(100, 0));
        cache.insert("c", body(100, 0));

        let outcome = cache.insert("big", body(250, 0));
        assert_eq!(outcome, InsertOutcome::Stored { evicted: 3 });

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes_used, 250);
    }

    #[test]
    fn test_replace_counts_size_once() {
        let cache = ObjectCache::new(200, 200);
        cache.insert("a", body(150, b'1'));

        let outcome = cache.insert("a", body(180, b'2'));
        assert_eq!(outcome, InsertOutcome::Stored { evicted: 0 });
        assert_eq!(cache.lookup("a"), Some(body(180, b'2')));

        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.bytes_used, 180);
    }

    #[test]
    fn test_replace_evicts_others_when_growing() {
        let cache = ObjectCache::new(200, 200);
        cache.insert("a", body(50, 0));
        cache.insert("b", body(100, 0));

        cache.insert("b", body(160, 1));
        assert!(cache.lookup("a").is_none());
        assert_eq!(cache.stats().bytes_used, 160);
    }

    #[test]
    fn test_size_invariant_under_churn() {
        let cache = ObjectCache::new(1000, 120);

        for i in 0..200 {
            let key = format!("host:80/{i}");
            cache.insert(&key, body(i % 150, 0));
            if i % 3 == 0 {
                cache.lookup(&format!("host:80/{}", i / 2));
            }
        }

        let stats = cache.stats();
        assert!(stats.bytes_used <= 1000);
        assert_eq!(stats.bytes_used, cache.recount());
    }

    #[test]
    fn test_stats_count_hits_and_misses() {
        let cache = ObjectCache::new(1024, 256);
        cache.insert("a", body(10, 0));

        cache.lookup("a");
        cache.lookup("a");
        cache.lookup("missing");

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.max_cache_size, 1024);
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let cache = Arc::new(ObjectCache::new(4096, 512));
        let mut handles = Vec::new();

        for writer in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..250 {
                    let key = format!("w{writer}:80/{}", i % 20);
                    cache.insert(&key, body(64 + (i % 400), writer as u8));
                }
            }));
        }

        for reader in 0..4 {
            let cache = Arc::clone(&cache);
            handles.push(thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("w{}:80/{}", reader, i % 20);
                    if let Some(bytes) = cache.lookup(&key) {
                        // Snapshots are never torn
                        assert!(bytes.iter().all(|b| *b == reader as u8));
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let stats = cache.stats();
        assert!(stats.bytes_used <= 4096);
        assert_eq!(stats.bytes_used, cache.recount());
    }
}
