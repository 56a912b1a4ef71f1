//! LRU result cache.
//!
//! Entries are keyed by `"<source>:<intensity>"` with the intensity rounded to
//! one decimal, so slider positions that differ by less than 0.05 share a
//! result. The cache is bounded both by entry count and by an estimate of the
//! pixel memory it holds; the least recently used entries are evicted first.
//!
//! # Example
//!
//! ```rust
//! use blur_cache::{PutOutcome, ResultCache};
//! use blur_core::{Channels, PixelBuffer};
//!
//! let cache = ResultCache::new(5, 16 * 1024 * 1024).unwrap();
//! let blurred = PixelBuffer::new(32, 32, Channels::Rgba);
//!
//! assert_eq!(cache.put("img_a1b2", 2.46, &blurred), PutOutcome::Inserted);
//! assert!(cache.get("img_a1b2", 2.5).is_some());
//! assert!(cache.get("img_a1b2", 2.4).is_none());
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use blur_core::{Error, PixelBuffer, Result};
use tracing::{debug, trace};

/// Fixed bookkeeping cost added to each entry's pixel bytes.
pub const ENTRY_OVERHEAD_BYTES: usize = 1024;

/// Smallest accepted memory limit (1 MiB).
pub const MIN_MEMORY_BYTES: usize = 1024 * 1024;

/// Rounds an intensity to one decimal, half away from zero.
///
/// `2.45` and `2.46` both round to `2.5`.
#[inline]
pub fn round_intensity(intensity: f64) -> f64 {
    let r = (intensity * 10.0).round() / 10.0;
    // Collapse -0.0 so it formats like 0.0
    if r == 0.0 { 0.0 } else { r }
}

/// Builds the cache key for a source identity and intensity.
pub fn make_key(source: &str, intensity: f64) -> String {
    format!("{source}:{:.1}", round_intensity(intensity))
}

/// Accounted size of a cached image.
#[inline]
pub fn entry_size(image: &PixelBuffer) -> usize {
    image.byte_len() + ENTRY_OVERHEAD_BYTES
}

/// Result of [`ResultCache::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The image was stored.
    Inserted,
    /// An entry already existed for the key; it was kept as is.
    AlreadyCached,
    /// The image is larger than the whole memory budget.
    Rejected,
}

impl PutOutcome {
    /// True unless the entry was rejected.
    #[inline]
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Entry limit.
    pub max_entries: usize,
    /// Accounted bytes currently held.
    pub memory: usize,
    /// Memory limit in bytes.
    pub max_memory: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Failed lookups.
    pub misses: u64,
    /// Entries dropped to make room or by [`ResultCache::evict_lru`].
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate as percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

struct Entry {
    image: PixelBuffer,
    size_bytes: usize,
    last_access: Instant,
    /// Toward the most recently used end.
    prev: Option<String>,
    /// Toward the least recently used end.
    next: Option<String>,
}

#[derive(Default)]
struct Inner {
    map: HashMap<String, Entry>,
    /// Most recently used.
    head: Option<String>,
    /// Least recently used.
    tail: Option<String>,
    memory: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl Inner {
    /// Unlinks `key` from the recency list, leaving it in the map.
    fn detach(&mut self, key: &str) {
        let Some(entry) = self.map.get_mut(key) else {
            return;
        };
        let prev = entry.prev.take();
        let next = entry.next.take();

        match &prev {
            Some(p) => {
                if let Some(e) = self.map.get_mut(p) {
                    e.next = next.clone();
                }
            }
            None => self.head = next.clone(),
        }
        match &next {
            Some(n) => {
                if let Some(e) = self.map.get_mut(n) {
                    e.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    /// Links an already-mapped `key` in as most recently used.
    fn attach_front(&mut self, key: &str) {
        let old_head = self.head.replace(key.to_string());
        match &old_head {
            Some(h) => {
                if let Some(e) = self.map.get_mut(h) {
                    e.prev = Some(key.to_string());
                }
            }
            None => self.tail = Some(key.to_string()),
        }
        if let Some(e) = self.map.get_mut(key) {
            e.prev = None;
            e.next = old_head;
        }
    }

    fn touch(&mut self, key: &str) {
        if self.head.as_deref() == Some(key) {
            return;
        }
        self.detach(key);
        self.attach_front(key);
    }

    fn remove(&mut self, key: &str) -> Option<Entry> {
        self.detach(key);
        let entry = self.map.remove(key)?;
        self.memory = self.memory.saturating_sub(entry.size_bytes);
        Some(entry)
    }

    fn evict_lru(&mut self) -> bool {
        let Some(key) = self.tail.clone() else {
            return false;
        };
        if let Some(entry) = self.remove(&key) {
            self.evictions += 1;
            debug!(
                key = %key,
                bytes = entry.size_bytes,
                idle_ms = entry.last_access.elapsed().as_millis() as u64,
                "Evicted cache entry"
            );
        }
        true
    }

    fn clear(&mut self) {
        self.map.clear();
        self.head = None;
        self.tail = None;
        self.memory = 0;
    }
}

/// Thread-safe, bounded LRU cache of blurred images.
///
/// All operations are serialized by one mutex and are O(1) amortized apart
/// from [`remove`](Self::remove), which scans the keys.
pub struct ResultCache {
    max_entries: usize,
    max_memory: usize,
    inner: Mutex<Inner>,
}

impl ResultCache {
    /// Creates a cache holding at most `max_entries` images and
    /// `max_memory` accounted bytes.
    ///
    /// Fails with [`Error::InvalidConfig`] if `max_entries` is 0 or
    /// `max_memory` is below [`MIN_MEMORY_BYTES`].
    pub fn new(max_entries: u32, max_memory: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(Error::InvalidConfig("cache needs at least one entry".into()));
        }
        if max_memory < MIN_MEMORY_BYTES {
            return Err(Error::InvalidConfig(format!(
                "cache memory limit {max_memory} is below the {MIN_MEMORY_BYTES} byte minimum"
            )));
        }
        debug!(max_entries, max_memory, "Created result cache");
        Ok(Self {
            max_entries: max_entries as usize,
            max_memory,
            inner: Mutex::new(Inner::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Looks up a result, marking it most recently used on a hit.
    pub fn get(&self, source: &str, intensity: f64) -> Option<PixelBuffer> {
        let key = make_key(source, intensity);
        let mut inner = self.lock();

        let image = match inner.map.get_mut(&key) {
            Some(entry) => {
                entry.last_access = Instant::now();
                entry.image.clone()
            }
            None => {
                inner.misses += 1;
                trace!(key = %key, "Cache miss");
                return None;
            }
        };
        inner.touch(&key);
        inner.hits += 1;
        trace!(key = %key, "Cache hit");
        Some(image)
    }

    /// Stores a result.
    ///
    /// An existing entry for the same key is kept (first writer wins).
    /// Otherwise least recently used entries are evicted until the new entry
    /// fits both limits. An image whose accounted size exceeds the memory
    /// limit on its own is rejected without evicting anything.
    pub fn put(&self, source: &str, intensity: f64, image: &PixelBuffer) -> PutOutcome {
        let key = make_key(source, intensity);
        let size = entry_size(image);
        let mut inner = self.lock();

        if inner.map.contains_key(&key) {
            trace!(key = %key, "Already cached");
            return PutOutcome::AlreadyCached;
        }
        if size > self.max_memory {
            debug!(key = %key, size, max = self.max_memory, "Entry exceeds cache memory limit");
            return PutOutcome::Rejected;
        }

        while inner.map.len() >= self.max_entries || inner.memory + size > self.max_memory {
            if !inner.evict_lru() {
                break;
            }
        }

        inner.map.insert(
            key.clone(),
            Entry {
                image: image.clone(),
                size_bytes: size,
                last_access: Instant::now(),
                prev: None,
                next: None,
            },
        );
        inner.attach_front(&key);
        inner.memory += size;

        debug!(
            key = %key,
            size,
            entries = inner.map.len(),
            memory = inner.memory,
            "Cached blur result"
        );
        PutOutcome::Inserted
    }

    /// Drops every entry belonging to `source`; returns how many were removed.
    ///
    /// Matches on `"<source>:"`, so `img_1` never touches `img_12`'s entries.
    /// Not counted as evictions.
    pub fn remove(&self, source: &str) -> usize {
        let prefix = format!("{source}:");
        let mut inner = self.lock();

        let keys: Vec<String> = inner
            .map
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in &keys {
            inner.remove(key);
        }
        if !keys.is_empty() {
            debug!(source, removed = keys.len(), "Removed cached results");
        }
        keys.len()
    }

    /// Drops every entry. Statistics counters are kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        let dropped = inner.map.len();
        inner.clear();
        debug!(dropped, "Cleared result cache");
    }

    /// Evicts up to `count` least recently used entries; returns how many went.
    pub fn evict_lru(&self, count: usize) -> usize {
        let mut inner = self.lock();
        let mut evicted = 0;
        while evicted < count && inner.evict_lru() {
            evicted += 1;
        }
        evicted
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        CacheStats {
            entries: inner.map.len(),
            max_entries: self.max_entries,
            memory: inner.memory,
            max_memory: self.max_memory,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }

    /// Accounted bytes currently held.
    pub fn memory_usage(&self) -> usize {
        self.lock().memory
    }

    /// True if usage is at or above `threshold` (clamped to `[0, 1]`) of the limit.
    pub fn is_memory_pressure(&self, threshold: f64) -> bool {
        let threshold = if threshold.is_nan() { 1.0 } else { threshold.clamp(0.0, 1.0) };
        self.lock().memory as f64 >= threshold * self.max_memory as f64
    }

    /// True if a result is cached. Does not affect recency or statistics.
    pub fn contains(&self, source: &str, intensity: f64) -> bool {
        self.lock().map.contains_key(&make_key(source, intensity))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// True if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.lock().map.is_empty()
    }

    /// Entry limit.
    #[inline]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Memory limit in bytes.
    #[inline]
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Keys from most to least recently used.
    pub fn keys_by_recency(&self) -> Vec<String> {
        let inner = self.lock();
        let mut keys = Vec::with_capacity(inner.map.len());
        let mut cursor = inner.head.clone();
        while let Some(key) = cursor {
            cursor = inner.map.get(&key).and_then(|e| e.next.clone());
            keys.push(key);
        }
        keys
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResultCache")
            .field("entries", &stats.entries)
            .field("max_entries", &stats.max_entries)
            .field("memory", &stats.memory)
            .field("max_memory", &stats.max_memory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blur_core::Channels;

    const MIB: usize = 1024 * 1024;

    fn img(w: u32, h: u32) -> PixelBuffer {
        PixelBuffer::new(w, h, Channels::Rgb)
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_intensity(2.46), 2.5);
        assert_eq!(round_intensity(2.45), 2.5);
        assert_eq!(round_intensity(2.44), 2.4);
        assert_eq!(round_intensity(-0.01), 0.0);
        assert_eq!(make_key("a1b2c3", 2.46), "a1b2c3:2.5");
        assert_eq!(make_key("a1b2c3", 0.0), "a1b2c3:0.0");
        assert_eq!(make_key("x", 10.0), "x:10.0");
    }

    #[test]
    fn test_entry_size() {
        assert_eq!(entry_size(&img(10, 10)), 300 + ENTRY_OVERHEAD_BYTES);
        let rgba = PixelBuffer::new(10, 10, Channels::Rgba);
        assert_eq!(entry_size(&rgba), 400 + ENTRY_OVERHEAD_BYTES);
    }

    #[test]
    fn test_create_limits() {
        assert!(ResultCache::new(0, MIB).is_err());
        assert!(ResultCache::new(1, MIB - 1).is_err());
        let cache = ResultCache::new(1, MIB).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().max_memory, MIB);
    }

    #[test]
    fn test_put_get() {
        let cache = ResultCache::new(3, 5 * MIB).unwrap();
        let image = img(50, 50);
        assert_eq!(cache.put("h", 3.0, &image), PutOutcome::Inserted);

        let got = cache.get("h", 3.0).unwrap();
        assert!(got.ptr_eq(&image));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.memory, entry_size(&image));
    }

    #[test]
    fn test_miss_counts() {
        let cache = ResultCache::new(3, 5 * MIB).unwrap();
        assert!(cache.get("nope", 1.0).is_none());
        assert!(cache.get("nope", 2.0).is_none());
        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = ResultCache::new(3, 5 * MIB).unwrap();
        let first = img(4, 4);
        let second = img(8, 8);
        assert_eq!(cache.put("h", 1.0, &first), PutOutcome::Inserted);
        assert_eq!(cache.put("h", 1.04, &second), PutOutcome::AlreadyCached);
        assert!(cache.get("h", 1.0).unwrap().ptr_eq(&first));
        assert_eq!(cache.memory_usage(), entry_size(&first));
    }

    #[test]
    fn test_lru_by_count() {
        let cache = ResultCache::new(2, 50 * MIB).unwrap();
        cache.put("hash1", 1.0, &img(10, 10));
        cache.put("hash2", 2.0, &img(10, 10));
        cache.put("hash3", 3.0, &img(10, 10));

        assert!(cache.get("hash1", 1.0).is_none());
        assert!(cache.get("hash2", 2.0).is_some());
        assert!(cache.get("hash3", 3.0).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let cache = ResultCache::new(2, 50 * MIB).unwrap();
        cache.put("a", 1.0, &img(10, 10));
        cache.put("b", 1.0, &img(10, 10));
        assert!(cache.get("a", 1.0).is_some());
        cache.put("c", 1.0, &img(10, 10));

        assert!(cache.contains("a", 1.0));
        assert!(!cache.contains("b", 1.0));
        assert_eq!(cache.keys_by_recency(), vec!["c:1.0", "a:1.0"]);
    }

    #[test]
    fn test_lru_by_memory() {
        // Each 512x512 RGB image accounts for 768 KiB + overhead
        let cache = ResultCache::new(10, 2 * MIB).unwrap();
        cache.put("a", 1.0, &img(512, 512));
        cache.put("b", 1.0, &img(512, 512));
        cache.put("c", 1.0, &img(512, 512));

        assert!(!cache.contains("a", 1.0));
        assert_eq!(cache.len(), 2);
        assert!(cache.memory_usage() <= 2 * MIB);
    }

    #[test]
    fn test_oversized_rejected() {
        let cache = ResultCache::new(4, MIB).unwrap();
        cache.put("small", 1.0, &img(8, 8));
        assert_eq!(cache.put("big", 1.0, &img(1024, 1024)), PutOutcome::Rejected);
        assert!(!PutOutcome::Rejected.is_accepted());
        // Nothing was flushed for the rejected entry
        assert!(cache.contains("small", 1.0));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_remove_by_source() {
        let cache = ResultCache::new(10, 10 * MIB).unwrap();
        cache.put("img_1", 1.0, &img(4, 4));
        cache.put("img_1", 2.0, &img(4, 4));
        cache.put("img_12", 1.0, &img(4, 4));

        assert_eq!(cache.remove("img_1"), 2);
        assert!(!cache.contains("img_1", 1.0));
        assert!(cache.contains("img_12", 1.0));
        assert_eq!(cache.memory_usage(), entry_size(&img(4, 4)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_clear_keeps_counters() {
        let cache = ResultCache::new(10, 10 * MIB).unwrap();
        cache.put("a", 1.0, &img(4, 4));
        cache.get("a", 1.0);
        cache.clear();

        let stats = cache.stats();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.memory, 0);
        assert_eq!(stats.hits, 1);
        assert!(cache.keys_by_recency().is_empty());
    }

    #[test]
    fn test_manual_eviction_and_pressure() {
        let cache = ResultCache::new(10, 2 * MIB).unwrap();
        cache.put("a", 1.0, &img(512, 512));
        cache.put("b", 1.0, &img(256, 256));
        assert!(cache.is_memory_pressure(0.4));
        assert!(!cache.is_memory_pressure(1.0));

        assert_eq!(cache.evict_lru(1), 1);
        assert!(!cache.contains("a", 1.0));
        assert_eq!(cache.evict_lru(5), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[test]
    fn test_contains_has_no_side_effects() {
        let cache = ResultCache::new(2, 10 * MIB).unwrap();
        cache.put("a", 1.0, &img(4, 4));
        cache.put("b", 1.0, &img(4, 4));
        assert!(cache.contains("a", 1.0));
        cache.put("c", 1.0, &img(4, 4));

        // "a" stayed least recent despite contains()
        assert!(!cache.contains("a", 1.0));
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 0);
    }
}
