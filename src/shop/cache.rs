//! Single-value TTL cache for expensive read views.

use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default lifetime of a cached view.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct CacheEntry<T> {
    value: T,
    created_at: Instant,
}

/// Holds at most one value, served until it expires or is invalidated.
pub struct TtlCache<T> {
    entry: RwLock<Option<CacheEntry<T>>>,
    ttl: Duration,
}

impl<T: Clone> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entry: RwLock::new(None),
            ttl,
        }
    }

    /// Get the cached value if present and fresh.
    pub fn get(&self) -> Option<T> {
        let entry = self.entry.read().ok()?;
        entry
            .as_ref()
            .filter(|e| e.created_at.elapsed() < self.ttl)
            .map(|e| e.value.clone())
    }

    pub fn put(&self, value: T) {
        if let Ok(mut entry) = self.entry.write() {
            *entry = Some(CacheEntry {
                value,
                created_at: Instant::now(),
            });
        }
    }

    pub fn invalidate(&self) {
        if let Ok(mut entry) = self.entry.write() {
            *entry = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_misses() {
        let cache: TtlCache<i64> = TtlCache::default();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_put_then_get() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put(7);
        assert_eq!(cache.get(), Some(7));
        cache.put(8);
        assert_eq!(cache.get(), Some(8));
    }

    #[test]
    fn test_invalidate_clears() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.put("board".to_string());
        cache.invalidate();
        assert_eq!(cache.get(), None);
    }

    #[test]
    fn test_zero_ttl_never_serves() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.put(1);
        assert_eq!(cache.get(), None);
    }
}
