//! Cache trait for storing fetched market data.
//!
//! This module defines the [`DataCache`] trait that every provider shares, the
//! [`DataKind`] TTL policy and the [`CacheKey`] builder used to derive keys.
//!
//! Values are stored type-erased as [`CachedValue`] and handed out as clones of
//! the `Arc`, so a stored snapshot is never mutated after insertion. The typed
//! helpers on `dyn DataCache` do the downcasting.

use std::any::Any;
use std::fmt::{self, Debug, Display};
use std::sync::Arc;
use std::time::Duration;

/// A shared, immutable cached value.
pub type CachedValue = Arc<dyn Any + Send + Sync>;

/// Expiring key/value store shared by all providers.
///
/// Implementations must be safe to call from many threads at once and must not
/// perform I/O or parsing while holding internal locks.
pub trait DataCache: Send + Sync + Debug {
    /// Returns the value for `key` if present and not expired.
    ///
    /// An expired entry is removed and reported as a miss.
    fn get_raw(&self, key: &str) -> Option<CachedValue>;

    /// Inserts or replaces `key`, expiring `ttl` from now.
    fn set_raw(&self, key: String, value: CachedValue, ttl: Duration);

    /// Removes `key`. Returns whether it was present.
    fn delete(&self, key: &str) -> bool;

    /// Removes every entry.
    fn clear(&self);

    /// Removes every expired entry and returns how many were removed.
    fn cleanup(&self) -> usize;

    /// Number of stored entries, expired or not.
    fn len(&self) -> usize;

    /// Returns true when nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl dyn DataCache {
    /// Typed lookup. A value stored under `key` with a different type is a miss.
    pub fn get<T>(&self, key: &str) -> Option<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.get_raw(key)
            .and_then(|value| value.downcast_ref::<T>().cloned())
    }

    /// Typed insert using the TTL of `kind`.
    pub fn set<T>(&self, key: impl Into<String>, value: T, kind: DataKind)
    where
        T: Send + Sync + 'static,
    {
        self.set_raw(key.into(), Arc::new(value), kind.ttl());
    }

    /// Typed insert with an explicit TTL.
    pub fn set_for<T>(&self, key: impl Into<String>, value: T, ttl: Duration)
    where
        T: Send + Sync + 'static,
    {
        self.set_raw(key.into(), Arc::new(value), ttl);
    }
}

/// Category of cached data. Determines the time-to-live.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Real-time quotes.
    RealtimeQuote,
    /// Historical OHLCV series.
    History,
    /// Company profile data, metrics, holders and analyst data.
    CompanyInfo,
    /// Financial statements.
    FinancialStatements,
    /// Discovery results: symbol to URL or identifier, company lists.
    Lookup,
    /// Derivatives board snapshots. The upstream is delayed by about 15 minutes.
    Derivatives,
}

impl DataKind {
    /// Time-to-live for entries of this kind.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        match self {
            Self::RealtimeQuote => Duration::from_secs(60),
            Self::Derivatives => Duration::from_secs(300),
            Self::History | Self::CompanyInfo => Duration::from_secs(3600),
            Self::FinancialStatements | Self::Lookup => Duration::from_secs(86_400),
        }
    }

    /// Short label used as the second key segment.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RealtimeQuote => "quote",
            Self::History => "history",
            Self::CompanyInfo => "info",
            Self::FinancialStatements => "financials",
            Self::Lookup => "lookup",
            Self::Derivatives => "derivatives",
        }
    }
}

/// Builder for cache keys.
///
/// A key is `provider:kind` followed by every part that affects the result.
/// Optional parts are always present as `name=value` or `name=-`, so two
/// requests differing in any parameter never share a key.
///
/// ```
/// use borsa_core::cache::{CacheKey, DataKind};
///
/// let key = CacheKey::new("paratic", DataKind::History)
///     .part("THYAO")
///     .part("1mo")
///     .opt("start", None::<&str>)
///     .build();
/// assert_eq!(key, "paratic:history:THYAO:1mo:start=-");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    /// Starts a key for a provider and data kind.
    pub fn new(provider: &str, kind: DataKind) -> Self {
        Self {
            key: format!("{}:{}", provider.to_lowercase(), kind.as_str()),
        }
    }

    /// Appends a positional segment.
    #[must_use]
    pub fn part(mut self, part: impl Display) -> Self {
        self.key.push(':');
        self.key.push_str(&part.to_string());
        self
    }

    /// Appends a named optional segment, `name=-` when absent.
    #[must_use]
    pub fn opt(mut self, name: &str, value: Option<impl Display>) -> Self {
        self.key.push(':');
        self.key.push_str(name);
        self.key.push('=');
        match value {
            Some(value) => self.key.push_str(&value.to_string()),
            None => self.key.push('-'),
        }
        self
    }

    /// Finishes the key.
    #[must_use]
    pub fn build(self) -> String {
        self.key
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ttl_table() {
        assert_eq!(DataKind::RealtimeQuote.ttl(), Duration::from_secs(60));
        assert_eq!(DataKind::History.ttl(), Duration::from_secs(3600));
        assert_eq!(DataKind::CompanyInfo.ttl(), Duration::from_secs(3600));
        assert_eq!(DataKind::FinancialStatements.ttl(), Duration::from_secs(86_400));
        assert_eq!(DataKind::Lookup.ttl(), Duration::from_secs(86_400));
        assert_eq!(DataKind::Derivatives.ttl(), Duration::from_secs(300));
        assert_eq!(DataKind::Derivatives.as_str(), "derivatives");
    }

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new("Paratic", DataKind::RealtimeQuote)
            .part("THYAO")
            .build();
        assert_eq!(key, "paratic:quote:THYAO");

        let key = CacheKey::new("isyatirim", DataKind::FinancialStatements)
            .part("THYAO")
            .part("balance_sheet")
            .opt("quarterly", Some(true))
            .opt("group", None::<&str>)
            .to_string();
        assert_eq!(
            key,
            "isyatirim:financials:THYAO:balance_sheet:quarterly=true:group=-"
        );
    }

    #[test]
    fn test_keys_differing_in_any_temporal_part_never_collide() {
        let build = |period: &str,
                     interval: &str,
                     quarterly: bool,
                     start: Option<&str>,
                     end: Option<&str>| {
            CacheKey::new("paratic", DataKind::History)
                .part("THYAO")
                .part(period)
                .part(interval)
                .opt("quarterly", Some(quarterly))
                .opt("start", start)
                .opt("end", end)
                .build()
        };

        let mut keys = HashSet::new();
        for period in ["1mo", "3mo"] {
            for interval in ["1d", "1h"] {
                for quarterly in [false, true] {
                    for start in [None, Some("2024-01-01")] {
                        for end in [None, Some("2024-01-01")] {
                            assert!(keys.insert(build(period, interval, quarterly, start, end)));
                        }
                    }
                }
            }
        }
        assert_eq!(keys.len(), 32);

        // start-only and end-only with the same date stay distinct
        assert_ne!(
            build("1mo", "1d", false, Some("2024-01-01"), None),
            build("1mo", "1d", false, None, Some("2024-01-01"))
        );
    }

    #[test]
    fn test_kind_separates_keys() {
        let quote = CacheKey::new("isyatirim", DataKind::RealtimeQuote).part("XU100");
        let info = CacheKey::new("isyatirim", DataKind::CompanyInfo).part("XU100");
        assert_ne!(quote, info);
    }
}
