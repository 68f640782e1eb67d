#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! HedefFiyat data provider.
//!
//! This crate provides a hedeffiyat.com.tr data provider that implements the
//! [`DataProvider`] and [`AnalystDataProvider`] traits from `borsa-core`.
//!
//! The site answers many pages with a 404 status and a full body, so page
//! requests use [`StatusMode::Lenient`]. Both operations fail soft: a page that
//! cannot be found or read yields empty targets or zero counts.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use borsa_cache::MemoryCache;
//! use borsa_core::{AnalystDataProvider, ProviderContext, Symbol};
//! use borsa_hedeffiyat::HedefFiyatProvider;
//!
//! # async fn example() -> borsa_core::Result<()> {
//! let provider = HedefFiyatProvider::new(&ProviderContext::new(Arc::new(MemoryCache::new())))?;
//! let targets = provider.fetch_price_targets(&Symbol::new("THYAO")).await?;
//! println!("{:?} analysts, mean {:?}", targets.analyst_count, targets.mean);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use borsa_cache::MemoryCache;
use borsa_core::{
    AnalystDataProvider, CacheKey, DataCache, DataError, DataKind, DataProvider, HttpTransport,
    PriceTargets, ProviderContext, RecommendationSummary, Result, RetryPolicy, StatusMode, Symbol,
    normalize::{parse_number, round_to},
};
use regex::Regex;
use tracing::{debug, instrument, warn};

/// hedeffiyat.com.tr root.
pub const HEDEFFIYAT_URL: &str = "https://www.hedeffiyat.com.tr";

const PROVIDER: &str = "HedefFiyat";

/// Key prefix for cache entries.
const CACHE_PREFIX: &str = "hedeffiyat";

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex is valid")
}

static CURRENT_PRICE: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"(?is)Güncel\s*Fiyat.*?<strong[^>]*>\s*([\d.,]+)\s*₺"));
static HIGH_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?is)En\s*Yüksek\s*Tahmin</div>\s*<div[^>]*>\s*([\d.,]+)\s*₺")
});
static LOW_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?is)En\s*Düşük\s*Tahmin</div>\s*<div[^>]*>\s*([\d.,]+)\s*₺")
});
static MEAN_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?is)Ortalama\s*Fiyat\s*Tahmini</div>\s*<div[^>]*>\s*([\d.,]+)\s*₺")
});
static ANALYST_COUNT: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"(?is)Kurum\s*Sayısı.*?<strong[^>]*>\s*(\d+)\s*</strong>"));
static RECOMMENDATION_BUTTON: LazyLock<Regex> = LazyLock::new(|| {
    static_regex(r"(?i)btn-sm\s+btn-(success|warning|danger|primary)[^>]*>([^<]+)</a")
});

fn capture<'h>(re: &Regex, html: &'h str) -> Option<&'h str> {
    re.captures(html).and_then(|caps| caps.get(1)).map(|m| m.as_str())
}

pub(crate) fn parse_price_targets(html: &str) -> PriceTargets {
    let price = |re: &Regex| capture(re, html).and_then(parse_number);
    let low = price(&LOW_TARGET);
    let high = price(&HIGH_TARGET);
    PriceTargets {
        current: price(&CURRENT_PRICE),
        low,
        high,
        mean: price(&MEAN_TARGET),
        median: low.zip(high).map(|(l, h)| round_to((l + h) / 2.0, 2)),
        analyst_count: capture(&ANALYST_COUNT, html).and_then(|n| n.parse().ok()),
    }
}

/// Recommendation bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Bucket {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

/// Buckets a button by label, falling back to its colour.
fn classify(class: &str, label: &str) -> Option<Bucket> {
    match label.trim().to_lowercase().as_str() {
        "güçlü al" | "güçlü alım" => Some(Bucket::StrongBuy),
        "al" | "alım" | "endeks üstü get." | "endeks üstü getiri" => Some(Bucket::Buy),
        "tut" | "tutma" | "nötr" | "endekse paralel" => Some(Bucket::Hold),
        "sat" | "satım" | "endeks altı get." | "endeks altı getiri" => Some(Bucket::Sell),
        "güçlü sat" | "güçlü satım" => Some(Bucket::StrongSell),
        _ => match class.to_ascii_lowercase().as_str() {
            "success" => Some(Bucket::Buy),
            "warning" | "primary" => Some(Bucket::Hold),
            "danger" => Some(Bucket::Sell),
            _ => None,
        },
    }
}

pub(crate) fn parse_recommendations(html: &str) -> RecommendationSummary {
    let mut summary = RecommendationSummary::default();
    for caps in RECOMMENDATION_BUTTON.captures_iter(html) {
        let counter = match classify(&caps[1], &caps[2]) {
            Some(Bucket::StrongBuy) => &mut summary.strong_buy,
            Some(Bucket::Buy) => &mut summary.buy,
            Some(Bucket::Hold) => &mut summary.hold,
            Some(Bucket::Sell) => &mut summary.sell,
            Some(Bucket::StrongSell) => &mut summary.strong_sell,
            None => continue,
        };
        *counter += 1;
    }
    summary
}

/// HedefFiyat data provider.
///
/// Implements [`DataProvider`] and [`AnalystDataProvider`].
#[derive(Debug)]
pub struct HedefFiyatProvider {
    transport: HttpTransport,
    cache: Arc<dyn DataCache>,
    retry: RetryPolicy,
    /// Symbol to stock page URL.
    urls: Arc<dyn DataCache>,
    base_url: String,
}

impl HedefFiyatProvider {
    /// Create a provider from shared context.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, &ctx.transport)?,
            cache: Arc::clone(&ctx.cache),
            retry: ctx.retry,
            urls: Arc::new(MemoryCache::with_clock(Arc::clone(&ctx.clock))),
            base_url: HEDEFFIYAT_URL.to_string(),
        })
    }

    /// Point the provider at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn link_pattern(attribute: &str, symbol: &Symbol) -> Result<Regex> {
        let pattern = format!(
            r#"(?i){attribute}="(/senet/{}-[^"]+)""#,
            regex::escape(&symbol.as_str().to_lowercase())
        );
        Regex::new(&pattern).map_err(|e| DataError::InvalidParameter(e.to_string()))
    }

    /// Looks the symbol up in the `/senetler` dropdown.
    async fn find_in_list(&self, symbol: &Symbol) -> Result<Option<String>> {
        let html = self
            .transport
            .get(&format!("{}/senetler", self.base_url))
            .header("Accept", PAGE_ACCEPT)
            .header("Upgrade-Insecure-Requests", "1")
            .send(StatusMode::Lenient)
            .await?
            .text();
        let re = Self::link_pattern("value", symbol)?;
        Ok(capture(&re, &html).map(str::to_string))
    }

    /// Looks the symbol up through site search. Unlike page requests this one
    /// requires a 2xx answer.
    async fn find_in_search(&self, symbol: &Symbol) -> Result<Option<String>> {
        let html = self
            .transport
            .get(&format!("{}/arama", self.base_url))
            .header("Accept", "text/html,application/xhtml+xml")
            .query(&[("q", symbol.as_str())])
            .send(StatusMode::Strict)
            .await?
            .text();
        let re = Self::link_pattern("href", symbol)?;
        Ok(capture(&re, &html).map(str::to_string))
    }

    /// Stock page URL, discovered once and kept for a day.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn stock_url(&self, symbol: &Symbol) -> Option<String> {
        let key = format!("{CACHE_PREFIX}:lookup:url:{symbol}");
        if let Some(url) = self.urls.get::<String>(&key) {
            return Some(url);
        }

        let listed = self
            .retry
            .run("hedeffiyat stock list", || self.find_in_list(symbol))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Stock list unavailable");
                None
            });
        let path = match listed {
            Some(path) => path,
            None => {
                debug!("Symbol not in stock list, trying search");
                self.retry
                    .run("hedeffiyat search", || self.find_in_search(symbol))
                    .await
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "Search unavailable");
                        None
                    })?
            }
        };

        let url = format!("{}{path}", self.base_url);
        self.urls.set(key, url.clone(), DataKind::Lookup);
        Some(url)
    }

    async fn fetch_stock_page(&self, symbol: &Symbol) -> Option<String> {
        let url = self.stock_url(symbol).await?;
        match self
            .transport
            .get(&url)
            .header("Accept", PAGE_ACCEPT)
            .send(StatusMode::Lenient)
            .await
        {
            Ok(payload) => Some(payload.text()),
            Err(e) => {
                warn!(url, error = %e, "Stock page unavailable");
                None
            }
        }
    }
}

impl DataProvider for HedefFiyatProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn description(&self) -> &str {
        "hedeffiyat.com.tr analyst price targets and recommendations"
    }
}

#[async_trait]
impl AnalystDataProvider for HedefFiyatProvider {
    /// Cached for a day once the analyst count is known.
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_price_targets(&self, symbol: &Symbol) -> Result<PriceTargets> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::Lookup)
            .part(symbol)
            .part("targets")
            .build();
        if let Some(targets) = self.cache.get::<PriceTargets>(&key) {
            debug!("Serving price targets from cache");
            return Ok(targets);
        }

        let Some(html) = self.fetch_stock_page(symbol).await else {
            return Ok(PriceTargets::default());
        };
        let targets = parse_price_targets(&html);
        if targets.analyst_count.is_some_and(|n| n > 0) {
            self.cache.set(key, targets.clone(), DataKind::Lookup);
        }
        Ok(targets)
    }

    /// Cached for a day once at least one recommendation was counted.
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_recommendation_summary(&self, symbol: &Symbol) -> Result<RecommendationSummary> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::Lookup)
            .part(symbol)
            .part("recommendations")
            .build();
        if let Some(summary) = self.cache.get::<RecommendationSummary>(&key) {
            debug!("Serving recommendation summary from cache");
            return Ok(summary);
        }

        let Some(html) = self.fetch_stock_page(symbol).await else {
            return Ok(RecommendationSummary::default());
        };
        let summary = parse_recommendations(&html);
        if !summary.is_empty() {
            self.cache.set(key, summary, DataKind::Lookup);
        }
        Ok(summary)
    }
}
