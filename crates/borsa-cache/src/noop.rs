//! No-op cache implementation.

use borsa_core::{CachedValue, DataCache};
use std::time::Duration;
use tracing::trace;

/// A no-op cache that doesn't store anything.
///
/// Every read is a miss and every write is dropped. Useful for disabling
/// caching or testing code paths without cache hits.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

impl NoopCache {
    /// Create a new no-op cache.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DataCache for NoopCache {
    fn get_raw(&self, key: &str) -> Option<CachedValue> {
        trace!(key, "NoopCache: get called, returning None");
        None
    }

    fn set_raw(&self, key: String, _value: CachedValue, _ttl: Duration) {
        trace!(key = %key, "NoopCache: set called, doing nothing");
    }

    fn delete(&self, _key: &str) -> bool {
        false
    }

    fn clear(&self) {}

    fn cleanup(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }
}
