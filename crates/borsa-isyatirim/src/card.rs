//! Company card page (şirket kartı): shareholders, valuation metrics and
//! business summary.

use std::sync::LazyLock;

use borsa_core::{
    CacheKey, CompanyMetrics, DataKind, MajorHolder, Result, StatusMode, Symbol,
    normalize::{parse_js_array, round_to},
};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{CACHE_PREFIX, IsYatirimProvider};

static CARD_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<th[^>]*>([^<]+)</th>\s*<td[^>]*>([^<]+)</td>").expect("static regex is valid")
});

static BUSINESS_SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<th[^>]*>Faal Alanı</th>\s*<td[^>]*>([^<]+)</td>").expect("static regex is valid")
});

/// Section heading of the valuation table.
const METRICS_ANCHOR: &str = "Cari Değerler";

/// Characters scanned after [`METRICS_ANCHOR`].
const METRICS_WINDOW: usize = 3000;

/// Chart variable holding the shareholder structure.
const HOLDERS_VAR: &str = "OrtaklikYapisidata";

/// One slice of the shareholder pie chart: `{name: 'x', y: 50.88}`.
#[derive(Debug, Deserialize)]
struct HolderSlice {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    y: f64,
}

/// Reads a card value written with Turkish separators, e.g. `"1.234,5"` or
/// `"% 12,3"`. Dots are always thousands separators on this page.
fn card_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .replace('.', "")
        .replace(',', ".")
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Text from the anchor onward, at most [`METRICS_WINDOW`] characters.
fn metrics_snippet(html: &str) -> Option<&str> {
    let start = html.find(METRICS_ANCHOR)?;
    let rest = &html[start..];
    let end = rest
        .char_indices()
        .nth(METRICS_WINDOW)
        .map_or(rest.len(), |(idx, _)| idx);
    Some(&rest[..end])
}

fn parse_metrics(html: &str) -> CompanyMetrics {
    let mut metrics = CompanyMetrics::default();
    let Some(snippet) = metrics_snippet(html) else {
        debug!("Valuation table not found");
        return metrics;
    };

    for caps in CARD_ROW.captures_iter(snippet) {
        let label = caps[1].trim();
        let Some(value) = card_number(&caps[2]) else {
            continue;
        };
        if label.contains("F/K") && !label.contains("FD") {
            metrics.pe_ratio = Some(value);
        } else if label.contains("PD/DD") {
            metrics.pb_ratio = Some(value);
        } else if label.contains("FD/FAVÖK") {
            metrics.ev_ebitda = Some(value);
        } else if label.contains("Piyasa Değeri") {
            // mn TL
            metrics.market_cap = Some((value * 1_000_000.0).round());
        } else if label.contains("Net Borç") {
            metrics.net_debt = Some((value * 1_000_000.0).round());
        } else if label.contains("Halka Açıklık") {
            metrics.free_float = Some(value);
        } else if label.contains("Yabancı Oranı") {
            metrics.foreign_ratio = Some(value);
        }
    }
    metrics
}

fn parse_holders(html: &str) -> Vec<MajorHolder> {
    parse_js_array::<HolderSlice>(html, HOLDERS_VAR)
        .into_iter()
        .map(|slice| MajorHolder {
            holder: slice.name.unwrap_or_else(|| "Unknown".to_string()),
            percentage: round_to(slice.y, 2),
        })
        .collect()
}

impl IsYatirimProvider {
    async fn fetch_card_page(&self, symbol: &Symbol) -> Result<String> {
        let payload = self
            .transport
            .get(&self.stock_page_url(symbol))
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send(StatusMode::Strict)
            .await?;
        Ok(payload.text())
    }

    /// Shareholder structure.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_major_holders(&self, symbol: &Symbol) -> Result<Vec<MajorHolder>> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::FinancialStatements)
            .part(symbol)
            .part("major_holders")
            .build();
        if let Some(holders) = self.cache.get::<Vec<MajorHolder>>(&key) {
            debug!("Serving major holders from cache");
            return Ok(holders);
        }

        let html = self
            .fetch_card_page(symbol)
            .await
            .map_err(|e| e.context(format!("major holders for {symbol}")))?;
        let holders = parse_holders(&html);
        if !holders.is_empty() {
            self.cache
                .set(key, holders.clone(), DataKind::FinancialStatements);
        }
        Ok(holders)
    }

    /// Valuation metrics. The page is flaky, so transient failures are retried.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_metrics(&self, symbol: &Symbol) -> Result<CompanyMetrics> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::CompanyInfo)
            .part(symbol)
            .part("metrics")
            .build();
        if let Some(metrics) = self.cache.get::<CompanyMetrics>(&key) {
            debug!("Serving metrics from cache");
            return Ok(metrics);
        }

        let html = self
            .retry
            .run("isyatirim metrics", || self.fetch_card_page(symbol))
            .await
            .map_err(|e| e.context(format!("metrics for {symbol}")))?;
        let metrics = parse_metrics(&html);

        self.cache.set(key, metrics.clone(), DataKind::CompanyInfo);
        Ok(metrics)
    }

    /// Business summary (faal alanı). Any failure yields `None`.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_business_summary(&self, symbol: &Symbol) -> Result<Option<String>> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::Lookup)
            .part(symbol)
            .part("business_summary")
            .build();
        if let Some(summary) = self.cache.get::<String>(&key) {
            debug!("Serving business summary from cache");
            return Ok(Some(summary));
        }

        let html = match self.fetch_card_page(symbol).await {
            Ok(html) => html,
            Err(e) => {
                warn!(error = %e, "Business summary unavailable");
                return Ok(None);
            }
        };
        let summary = BUSINESS_SUMMARY
            .captures(&html)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty());

        if let Some(summary) = &summary {
            self.cache.set(key, summary.clone(), DataKind::Lookup);
        }
        Ok(summary)
    }
}
