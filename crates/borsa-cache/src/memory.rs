//! In-memory cache implementation.

use borsa_core::{CachedValue, Clock, DataCache, SystemClock};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument};

/// Cache entry with its expiry instant.
#[derive(Clone)]
struct CacheEntry {
    value: CachedValue,
    expires_at: DateTime<Utc>,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Thread-safe expiring key/value store.
///
/// All entries live in one `HashMap` behind one `Mutex`. Expired entries are
/// removed when read or by [`DataCache::cleanup`]; there is no background
/// sweeper. Values are shared snapshots, so a hit clones an `Arc` and nothing
/// else runs under the lock.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Create a new empty cache using the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new empty cache reading time from `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DataCache for MemoryCache {
    #[instrument(skip(self))]
    fn get_raw(&self, key: &str) -> Option<CachedValue> {
        let now = self.clock.now();
        let mut entries = self.entries();

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                debug!("Cache hit");
                Some(Arc::clone(&entry.value))
            }
            Some(_) => {
                entries.remove(key);
                debug!("Cache entry expired");
                None
            }
            None => {
                debug!("Cache miss");
                None
            }
        }
    }

    #[instrument(skip(self, value), fields(ttl_secs = ttl.as_secs()))]
    fn set_raw(&self, key: String, value: CachedValue, ttl: Duration) {
        let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.entries()
            .insert(key, CacheEntry { value, expires_at });
        debug!("Cached entry");
    }

    #[instrument(skip(self))]
    fn delete(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    #[instrument(skip(self))]
    fn clear(&self) {
        self.entries().clear();
        debug!("Cleared all cache entries");
    }

    #[instrument(skip(self))]
    fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        removed
    }

    fn len(&self) -> usize {
        self.entries().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsa_core::{DataKind, ManualClock};
    use chrono::TimeZone;
    use std::thread;

    fn setup() -> (Arc<ManualClock>, Arc<dyn DataCache>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 10, 10, 0, 0).unwrap(),
        ));
        let cache: Arc<dyn DataCache> = Arc::new(MemoryCache::with_clock(clock.clone()));
        (clock, cache)
    }

    #[test]
    fn test_hit_before_expiry_miss_at_expiry() {
        let (clock, cache) = setup();
        cache.set_for("k", 42_u32, Duration::from_secs(60));

        clock.advance(TimeDelta::seconds(59));
        assert_eq!(cache.get::<u32>("k"), Some(42));

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(cache.get::<u32>("k"), None);
        // the expired entry was evicted by the read
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_is_already_expired() {
        let (_clock, cache) = setup();
        cache.set_for("k", "v".to_string(), Duration::ZERO);
        assert_eq!(cache.get::<String>("k"), None);
    }

    #[test]
    fn test_set_replaces_and_refreshes_ttl() {
        let (clock, cache) = setup();
        cache.set_for("k", 1_u32, Duration::from_secs(10));
        clock.advance(TimeDelta::seconds(8));
        cache.set_for("k", 2_u32, Duration::from_secs(10));
        clock.advance(TimeDelta::seconds(8));
        assert_eq!(cache.get::<u32>("k"), Some(2));
    }

    #[test]
    fn test_cleanup_removes_exactly_expired_keys() {
        let (clock, cache) = setup();
        cache.set("quote", 1.0_f64, DataKind::RealtimeQuote);
        cache.set("history", 2.0_f64, DataKind::History);
        cache.set_for("boundary", 3.0_f64, Duration::from_secs(3600));
        cache.set("lookup", 4.0_f64, DataKind::Lookup);

        clock.advance(TimeDelta::seconds(3600));
        assert_eq!(cache.cleanup(), 3);
        assert_eq!(cache.len(), 1);
        assert!(cache.get::<f64>("quote").is_none());
        assert!(cache.get::<f64>("history").is_none());
        assert!(cache.get::<f64>("boundary").is_none());
        assert_eq!(cache.get::<f64>("lookup"), Some(4.0));
        assert_eq!(cache.cleanup(), 0);
    }

    #[test]
    fn test_type_mismatch_is_a_miss() {
        let (_clock, cache) = setup();
        cache.set("k", 42_u32, DataKind::History);
        assert_eq!(cache.get::<String>("k"), None);
        assert_eq!(cache.get::<u32>("k"), Some(42));
    }

    #[test]
    fn test_delete_and_clear() {
        let (_clock, cache) = setup();
        cache.set("a", 1_u8, DataKind::History);
        cache.set("b", 2_u8, DataKind::History);

        assert!(cache.delete("a"));
        assert!(!cache.delete("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_concurrent_writers() {
        let (_clock, cache) = setup();
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..100 {
                        cache.set(format!("{t}:{i}"), i, DataKind::History);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 800);
        assert_eq!(cache.get::<i32>("3:42"), Some(42));
    }
}
