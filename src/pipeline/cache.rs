//! Memory cache of decoded images.
//!
//! LRU over both entry count and total pixel bytes. Keys are the xxh3 hash of the
//! locator string, so callers never hold on to the locator itself.

use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use super::DecodedImage;
use crate::models::Locator;

/// Minimum memory budget in megabytes.
const MIN_MEMORY_MB: usize = 16;

/// Maximum memory budget in megabytes.
const MAX_MEMORY_MB: usize = 512;

/// Bump when decode semantics change.
const CACHE_VERSION: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(locator: &Locator) -> Self {
        let raw = locator.as_str().as_bytes();
        let mut data = Vec::with_capacity(raw.len() + 1);
        data.push(CACHE_VERSION);
        data.extend_from_slice(raw);
        Self(xxh3_64(&data))
    }
}

struct CacheState {
    entries: LruCache<CacheKey, DecodedImage>,
    current_bytes: usize,
}

pub struct ImageCache {
    max_memory_bytes: usize,
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub fn new(max_entries: usize, max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        debug!(max_entries = capacity.get(), max_memory_mb, "Initialized image cache");

        Self {
            max_memory_bytes: max_memory_mb * 1024 * 1024,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                current_bytes: 0,
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<DecodedImage> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, image: DecodedImage) {
        let needed = image.memory_bytes();
        if needed > self.max_memory_bytes {
            trace!(needed, "Image larger than cache budget, not caching");
            return;
        }

        let mut state = self.state.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.current_bytes = state.current_bytes.saturating_sub(old.memory_bytes());
        }

        while state.current_bytes + needed > self.max_memory_bytes {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_bytes =
                        state.current_bytes.saturating_sub(evicted.memory_bytes());
                    trace!(
                        evicted_bytes = evicted.memory_bytes(),
                        current_bytes = state.current_bytes,
                        "Evicted image from memory cache"
                    );
                }
                None => break,
            }
        }

        // Count-based eviction from `push` must also release its bytes.
        if let Some((_, evicted)) = state.entries.push(key, image) {
            state.current_bytes = state.current_bytes.saturating_sub(evicted.memory_bytes());
        }
        state.current_bytes += needed;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn memory_usage(&self) -> usize {
        self.state.lock().current_bytes
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn image(locator: &str, side: u32) -> DecodedImage {
        DecodedImage::new(Locator::from(locator), RgbaImage::new(side, side))
    }

    #[test]
    fn test_cache_key_hash() {
        let a = CacheKey::new(&Locator::from("https://x/a.jpg"));
        let b = CacheKey::new(&Locator::from("https://x/a.jpg"));
        let c = CacheKey::new(&Locator::from("https://x/b.jpg"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_memory_limit_clamping() {
        assert_eq!(ImageCache::new(8, 1).max_memory(), MIN_MEMORY_MB * 1024 * 1024);
        assert_eq!(ImageCache::new(8, 4096).max_memory(), MAX_MEMORY_MB * 1024 * 1024);
        assert_eq!(ImageCache::new(8, 64).max_memory(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_entry_eviction_tracks_bytes() {
        let cache = ImageCache::new(2, 64);
        for name in ["a", "b", "c"] {
            let img = image(name, 10);
            cache.insert(CacheKey::new(&img.locator), img);
        }

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.memory_usage(), 2 * 10 * 10 * 4);
        assert!(cache.get(&CacheKey::new(&Locator::from("a"))).is_none());
        assert!(cache.get(&CacheKey::new(&Locator::from("c"))).is_some());
    }

    #[test]
    fn test_memory_eviction() {
        // 16MB budget; each 1500x1500 RGBA image is ~9MB.
        let cache = ImageCache::new(16, 16);
        let first = image("first", 1500);
        let second = image("second", 1500);
        cache.insert(CacheKey::new(&first.locator), first);
        cache.insert(CacheKey::new(&second.locator), second);

        assert_eq!(cache.len(), 1);
        assert!(cache.get(&CacheKey::new(&Locator::from("second"))).is_some());
        assert!(cache.memory_usage() <= cache.max_memory());
    }

    #[test]
    fn test_reinsert_same_key_does_not_double_count() {
        let cache = ImageCache::new(4, 64);
        let img = image("a", 10);
        let key = CacheKey::new(&img.locator);
        cache.insert(key, img.clone());
        cache.insert(key, img);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 400);
    }
}
