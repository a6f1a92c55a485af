//! In-memory image cache with LRU eviction
//!
//! Holds decoded content keyed by resource identifier. Every entry carries
//! its byte footprint and the total footprint never exceeds the configured
//! capacity: inserting new content evicts the least recently accessed
//! entries until it fits.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::CacheConfig;

/// Byte footprint of a cached value.
///
/// This is the default measure used by [`MemoryCache::new`]. Decoded images
/// report their raw pixel byte count.
pub trait ByteSize {
    /// Number of bytes this value occupies in memory
    fn byte_size(&self) -> usize;
}

impl ByteSize for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

/// Pluggable sizing function used by the cache.
pub type Sizer<V> = Arc<dyn Fn(&V) -> usize + Send + Sync>;

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently resident
    pub entry_count: usize,

    /// Total bytes used by resident entries
    pub memory_used: usize,

    /// Maximum bytes allowed
    pub capacity: usize,

    /// Lookups that found content
    pub hits: u64,

    /// Lookups that found nothing
    pub misses: u64,

    /// Successful insertions
    pub insertions: u64,

    /// Entries removed to make room for new content
    pub evictions: u64,

    /// Insertions refused because the content alone exceeds the capacity
    pub rejected: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.memory_used as f64 / self.capacity as f64
        }
    }
}

struct Entry<V> {
    content: Arc<V>,
    size: usize,
}

struct CacheState<V> {
    entries: HashMap<String, Entry<V>>,

    /// Least recently used at the front, most recently used at the back
    lru_queue: VecDeque<String>,

    memory_used: usize,
    capacity: usize,
    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru_queue: VecDeque::new(),
            memory_used: 0,
            capacity,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    /// Mark a key as most recently used
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.lru_queue.iter().position(|k| k == key) {
            if let Some(k) = self.lru_queue.remove(pos) {
                self.lru_queue.push_back(k);
            }
        }
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.lru_queue.pop_front() else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&key) {
            self.memory_used = self.memory_used.saturating_sub(entry.size);
            self.stats.evictions += 1;
            debug!("evicted {key} ({} bytes)", entry.size);
        }
        true
    }

    /// Evict entries until `required` more bytes fit under the capacity
    fn evict_to_fit(&mut self, required: usize) {
        while self.memory_used > self.capacity.saturating_sub(required) {
            if !self.evict_lru() {
                break;
            }
        }
        self.sync_stats();
    }

    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.memory_used = self.memory_used;
        self.stats.capacity = self.capacity;
    }
}

/// Thread-safe, byte-bounded LRU cache keyed by resource identifier.
///
/// Content is stored behind an [`Arc`] so lookups hand out shared references
/// without copying pixel buffers. Inserting a key that is already resident is
/// a no-op: the first stored content wins.
///
/// # Example
///
/// ```
/// use photowall_cache::MemoryCache;
///
/// let cache: MemoryCache<Vec<u8>> = MemoryCache::new(1024);
///
/// cache.put("https://img.example/a.jpg", vec![0u8; 512]);
/// assert!(cache.get("https://img.example/a.jpg").is_some());
///
/// // Second put for the same key keeps the first content.
/// cache.put("https://img.example/a.jpg", vec![1u8; 16]);
/// assert_eq!(cache.get("https://img.example/a.jpg").unwrap().len(), 512);
/// ```
pub struct MemoryCache<V> {
    state: Mutex<CacheState<V>>,
    sizer: Sizer<V>,
}

impl<V: ByteSize + 'static> MemoryCache<V> {
    /// Create a cache holding at most `capacity` bytes, measured by [`ByteSize`]
    pub fn new(capacity: usize) -> Self {
        Self::with_sizer(capacity, |value: &V| value.byte_size())
    }

    /// Create a cache sized by a [`CacheConfig`]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.capacity_bytes)
    }
}

impl<V> MemoryCache<V> {
    /// Create a cache with a custom sizing function
    pub fn with_sizer<F>(capacity: usize, sizer: F) -> Self
    where
        F: Fn(&V) -> usize + Send + Sync + 'static,
    {
        Self {
            state: Mutex::new(CacheState::new(capacity)),
            sizer: Arc::new(sizer),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Byte size of `value` as seen by this cache
    pub fn size_of(&self, value: &V) -> usize {
        (self.sizer)(value)
    }

    /// Look up content for `key`.
    ///
    /// A hit marks the entry as most recently used. Never blocks on I/O.
    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.lock();

        let content = state.entries.get(key).map(|e| Arc::clone(&e.content));
        match content {
            Some(content) => {
                state.touch(key);
                state.stats.hits += 1;
                Some(content)
            }
            None => {
                state.stats.misses += 1;
                None
            }
        }
    }

    /// Store content for `key`.
    ///
    /// Returns `true` when the content was inserted. An already resident key
    /// keeps its existing content (the call only refreshes its recency), and
    /// content larger than the whole capacity is refused.
    pub fn put(&self, key: &str, content: V) -> bool {
        self.put_shared(key, Arc::new(content))
    }

    /// Store already shared content for `key`. See [`MemoryCache::put`].
    pub fn put_shared(&self, key: &str, content: Arc<V>) -> bool {
        let size = self.size_of(&content);
        let mut state = self.lock();

        if state.entries.contains_key(key) {
            state.touch(key);
            return false;
        }

        if size > state.capacity {
            state.stats.rejected += 1;
            debug!(
                "refusing {key}: {size} bytes exceeds capacity {}",
                state.capacity
            );
            return false;
        }

        state.evict_to_fit(size);

        state.memory_used += size;
        state.entries.insert(key.to_owned(), Entry { content, size });
        state.lru_queue.push_back(key.to_owned());
        state.stats.insertions += 1;
        state.sync_stats();
        true
    }

    /// Check residency without touching LRU order or statistics
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Remove an entry, returning its content
    pub fn remove(&self, key: &str) -> Option<Arc<V>> {
        let mut state = self.lock();

        let entry = state.entries.remove(key)?;
        state.memory_used = state.memory_used.saturating_sub(entry.size);
        state.lru_queue.retain(|k| k != key);
        state.sync_stats();
        Some(entry.content)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.lru_queue.clear();
        state.memory_used = 0;
        state.sync_stats();
    }

    /// Current statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Keys from least to most recently used
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.lock().lru_queue.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    pub fn memory_used(&self) -> usize {
        self.lock().memory_used
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

impl<V> fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCache")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
