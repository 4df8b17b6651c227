//! Bounded cache for rasterized page bitmaps

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use super::Bitmap;

/// Default number of cached page bitmaps.
///
/// Enough for back/forward navigation plus the transition lookahead while
/// keeping memory bounded on large documents.
pub const DEFAULT_CACHE_CAPACITY: usize = 18;

/// Cache key for rasterized pages.
///
/// A page rendered at a different pixel size or zoom is a distinct entry,
/// never an update of an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterKey {
    /// Page number (0-indexed)
    pub page: usize,
    /// Target width in device pixels
    pub width_px: u32,
    /// Target height in device pixels
    pub height_px: u32,
    /// Zoom factor (stored as hundredths for stable hashing)
    pub zoom_hundredths: u32,
}

impl RasterKey {
    /// Build a key from CSS-pixel geometry and a device pixel ratio
    #[must_use]
    pub fn new(page: usize, css_width: f32, css_height: f32, zoom: f32, dpr: f32) -> Self {
        Self {
            page,
            width_px: (css_width * dpr).round().max(1.0) as u32,
            height_px: (css_height * dpr).round().max(1.0) as u32,
            zoom_hundredths: (zoom * 100.0).round() as u32,
        }
    }
}

/// Bounded bitmap cache with insertion-order eviction.
///
/// Reads go through `peek` and never promote an entry, so the underlying
/// LRU order stays equal to insertion order: overflow always evicts the
/// oldest-produced bitmap first.
pub struct RasterCache {
    cache: LruCache<RasterKey, Arc<Bitmap>>,
}

impl RasterCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached bitmap without touching eviction order
    #[must_use]
    pub fn get(&self, key: &RasterKey) -> Option<Arc<Bitmap>> {
        self.cache.peek(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &RasterKey) -> bool {
        self.cache.contains(key)
    }

    /// Insert a bitmap, evicting the oldest entries beyond capacity
    pub fn insert(&mut self, key: RasterKey, bitmap: Arc<Bitmap>) {
        self.cache.put(key, bitmap);
    }

    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
