#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Paratic data provider.
//!
//! This crate provides a Paratic data provider that implements the
//! [`DataProvider`], [`QuoteProvider`], and [`PriceDataProvider`] traits from
//! `borsa-core`.
//!
//! # Features
//!
//! - Latest quote derived from the two most recent daily bars
//! - OHLCV history from one-minute to monthly bars
//! - Cached results (60s for quotes, one hour for history)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use borsa_cache::MemoryCache;
//! use borsa_core::{HistoryRequest, Interval, Period, PriceDataProvider, ProviderContext, Symbol};
//! use borsa_paratic::ParaticProvider;
//!
//! # async fn example() -> borsa_core::Result<()> {
//! let provider = ParaticProvider::new(&ProviderContext::new(Arc::new(MemoryCache::new())))?;
//! let request = HistoryRequest::new(Period::ThreeMonths, Interval::OneDay);
//!
//! let history = provider.fetch_history(&Symbol::new("THYAO"), &request).await?;
//! println!("Fetched {} bars", history.len());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use borsa_core::{
    CacheKey, Clock, DataCache, DataError, DataKind, DataProvider, HistoryRequest, HttpTransport,
    Interval, MARKET_TZ, OhlcvBar, PriceDataProvider, PriceHistory, ProviderContext, Quote,
    QuoteProvider, Result, SkipReason, StatusMode, Symbol,
    normalize::{round_to, value_as_f64},
    parse::collect_rows,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

/// Paratic historical data endpoint.
pub const PARATIC_URL: &str = "https://piyasa.paratic.com/API/historical.php";

/// `Referer` required by the endpoint.
const REFERER: &str = "https://piyasa.paratic.com/";

const PROVIDER: &str = "Paratic";

/// Key prefix for cache entries.
const CACHE_PREFIX: &str = "paratic";

/// One upstream row: `{"d": ms, "o", "h", "l", "c", "v", "a"}`.
#[derive(Debug, Clone, PartialEq)]
struct ParaticRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
    amount: f64,
}

impl ParaticRow {
    fn parse(row: usize, value: &Value) -> std::result::Result<Self, SkipReason> {
        let price = |name: &str| {
            value
                .get(name)
                .and_then(value_as_f64)
                .ok_or_else(|| SkipReason::new(row, format!("missing or invalid `{name}`")))
        };

        let millis = value
            .get("d")
            .and_then(|d| d.as_i64().or_else(|| d.as_f64().map(|f| f as i64)))
            .ok_or_else(|| SkipReason::new(row, "missing timestamp `d`"))?;
        let timestamp = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| SkipReason::new(row, format!("timestamp {millis} out of range")))?;

        Ok(Self {
            timestamp,
            open: price("o")?,
            high: price("h")?,
            low: price("l")?,
            close: price("c")?,
            volume: value.get("v").and_then(value_as_f64).unwrap_or(0.0),
            amount: value.get("a").and_then(value_as_f64).unwrap_or(0.0),
        })
    }

    const fn into_bar(self) -> OhlcvBar {
        OhlcvBar::new(
            self.timestamp,
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Paratic data provider.
///
/// Implements [`DataProvider`], [`QuoteProvider`], and [`PriceDataProvider`].
/// Non-2xx responses are errors.
#[derive(Debug)]
pub struct ParaticProvider {
    transport: HttpTransport,
    cache: Arc<dyn DataCache>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl ParaticProvider {
    /// Create a provider from shared context.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, &ctx.transport)?,
            cache: Arc::clone(&ctx.cache),
            clock: Arc::clone(&ctx.clock),
            base_url: PARATIC_URL.to_string(),
        })
    }

    /// Point the provider at a different endpoint.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Fetch the raw rows ending at `at`.
    async fn fetch_rows(
        &self,
        symbol: &Symbol,
        interval: Interval,
        at: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let minutes = interval.minutes().to_string();
        let at = at.with_timezone(&MARKET_TZ).format("%Y%m%d%H%M%S").to_string();

        let payload = self
            .transport
            .get(&self.base_url)
            .header("Referer", REFERER)
            .query(&[
                ("a", "d"),
                ("c", symbol.as_str()),
                ("p", minutes.as_str()),
                ("from", ""),
                ("at", at.as_str()),
                ("group", "f"),
            ])
            .send(StatusMode::Strict)
            .await?;

        match payload.json::<Value>()? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Err(DataError::Parse(format!(
                "expected a JSON array from {PROVIDER}, got {}",
                json_kind(&other)
            ))),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl DataProvider for ParaticProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn description(&self) -> &str {
        "Paratic historical OHLCV data for BIST stocks and indices"
    }

    fn supported_intervals(&self) -> &[Interval] {
        &Interval::ALL
    }
}

#[async_trait]
impl QuoteProvider for ParaticProvider {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::RealtimeQuote)
            .part(symbol)
            .build();
        if let Some(quote) = self.cache.get::<Quote>(&key) {
            debug!("Serving quote from cache");
            return Ok(quote);
        }

        let rows = self
            .fetch_rows(symbol, Interval::OneDay, self.clock.now())
            .await
            .map_err(|e| e.context(format!("quote for {symbol}")))?;

        let Some((last_idx, latest)) = rows.iter().enumerate().last() else {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        };
        let latest = ParaticRow::parse(last_idx, latest)
            .map_err(|skip| DataError::Parse(format!("{PROVIDER} quote for {symbol}: {skip}")))?;

        let previous_close = rows
            .len()
            .checked_sub(2)
            .and_then(|idx| rows[idx].get("c"))
            .and_then(value_as_f64)
            .unwrap_or(0.0);

        let last = latest.close;
        let change = if previous_close > 0.0 {
            last - previous_close
        } else {
            0.0
        };
        let change_percent = if previous_close > 0.0 {
            change / previous_close * 100.0
        } else {
            0.0
        };
        // Paratic's `v` is unreliable; derive lots from the TRY amount.
        let volume = if last > 0.0 {
            (latest.amount / last).trunc()
        } else {
            0.0
        };

        let quote = Quote {
            symbol: symbol.clone(),
            last,
            open: latest.open,
            high: latest.high,
            low: latest.low,
            previous_close,
            volume,
            amount: Some(latest.amount),
            change: round_to(change, 2),
            change_percent: round_to(change_percent, 2),
            bid: None,
            ask: None,
            update_time: latest.timestamp,
        };

        self.cache.set(key, quote.clone(), DataKind::RealtimeQuote);
        Ok(quote)
    }
}

#[async_trait]
impl PriceDataProvider for ParaticProvider {
    #[instrument(
        skip(self, request),
        fields(symbol = %symbol, period = %request.period, interval = %request.interval)
    )]
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<PriceHistory> {
        let key = request.cache_key(CACHE_PREFIX, symbol);
        if let Some(history) = self.cache.get::<PriceHistory>(&key) {
            debug!("Serving history from cache");
            return Ok(history);
        }

        let (start, end) = request.window(self.clock.now());
        debug!(%start, %end, "Resolved history window");

        let rows = self
            .fetch_rows(symbol, request.interval, end)
            .await
            .map_err(|e| e.context(format!("history for {symbol}")))?;
        if rows.is_empty() {
            return Err(DataError::unavailable(symbol.as_str(), "empty history response"));
        }

        let (parsed, report) = collect_rows(
            "paratic history",
            rows.iter()
                .enumerate()
                .map(|(idx, row)| ParaticRow::parse(idx, row)),
        );
        if parsed.is_empty() {
            return Err(DataError::unavailable(
                symbol.as_str(),
                format!("none of {} history rows could be parsed", report.total()),
            ));
        }

        let bars = parsed
            .into_iter()
            .filter(|row| row.timestamp >= start && row.timestamp <= end)
            .map(ParaticRow::into_bar)
            .collect();
        let history = PriceHistory::new(symbol.clone(), request.interval, bars, report);

        self.cache.set(key, history.clone(), DataKind::History);
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsa_cache::MemoryCache;
    use borsa_core::{ManualClock, Period};
    use chrono::{TimeDelta, TimeZone};
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap()
    }

    fn provider(server: &ServerGuard) -> ParaticProvider {
        let clock = Arc::new(ManualClock::new(now()));
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let ctx = ProviderContext::new(cache).with_clock(clock);
        ParaticProvider::new(&ctx)
            .unwrap()
            .with_base_url(format!("{}/API/historical.php", server.url()))
    }

    fn day_row(days_ago: i64, close: f64) -> Value {
        let ts = now() - TimeDelta::days(days_ago);
        json!({
            "d": ts.timestamp_millis(),
            "o": close - 1.0,
            "h": close + 2.0,
            "l": close - 2.0,
            "c": close,
            "v": 1,
            "a": close * 1000.0,
        })
    }

    #[test]
    fn test_provider_info() {
        let server = mockito::Server::new();
        let provider = provider(&server);
        assert_eq!(provider.name(), "Paratic");
        assert!(provider.supported_intervals().contains(&Interval::FiveMinutes));
    }

    #[tokio::test]
    async fn test_quote_fetch_then_cache_hit() {
        let mut server = Server::new_async().await;
        let rows = json!([day_row(2, 250.0), day_row(1, 260.0), day_row(0, 268.5)]);
        let mock = server
            .mock("GET", "/API/historical.php")
            .match_header("referer", REFERER)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("a".into(), "d".into()),
                Matcher::UrlEncoded("c".into(), "THYAO".into()),
                Matcher::UrlEncoded("p".into(), "1440".into()),
                Matcher::UrlEncoded("group".into(), "f".into()),
                // 09:00 UTC is 12:00 in Istanbul
                Matcher::UrlEncoded("at".into(), "20250210120000".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(rows.to_string())
            .expect(1)
            .create_async()
            .await;

        let provider = provider(&server);
        let symbol = Symbol::new("THYAO");
        let quote = provider.fetch_quote(&symbol).await.unwrap();

        assert_eq!(quote.last, 268.5);
        assert_eq!(quote.previous_close, 260.0);
        assert_eq!(quote.change, 8.5);
        assert_eq!(quote.change_percent, 3.27);
        assert_eq!(quote.volume, 1000.0);
        assert_eq!(quote.amount, Some(268_500.0));
        assert_eq!(quote.update_time, now());

        let again = provider.fetch_quote(&symbol).await.unwrap();
        assert_eq!(again, quote);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quote_unknown_symbol() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/API/historical.php")
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_quote(&Symbol::new("NOPE"))
            .await
            .unwrap_err();
        assert_eq!(err, DataError::SymbolNotFound("NOPE".to_string()));
    }

    #[tokio::test]
    async fn test_history_skips_malformed_rows() {
        let mut server = Server::new_async().await;
        let mut rows: Vec<Value> = (0..10).map(|i| day_row(10 - i, 100.0 + i as f64)).collect();
        rows[3] = json!({"d": rows[3]["d"], "o": 1.0, "h": 2.0, "l": 0.5, "c": "n/a"});
        rows[7] = json!({"o": 1.0, "h": 2.0, "l": 0.5, "c": 1.5});
        server
            .mock("GET", "/API/historical.php")
            .match_query(Matcher::Any)
            .with_body(Value::Array(rows).to_string())
            .create_async()
            .await;

        let request = HistoryRequest::new(Period::OneMonth, Interval::OneDay);
        let history = provider(&server)
            .fetch_history(&Symbol::new("THYAO"), &request)
            .await
            .unwrap();

        assert_eq!(history.len(), 8);
        assert_eq!(history.report.parsed, 8);
        assert_eq!(
            history.report.skipped.iter().map(|s| s.row).collect::<Vec<_>>(),
            vec![3, 7]
        );
        assert!(history.bars.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[tokio::test]
    async fn test_history_window_filters_old_rows() {
        let mut server = Server::new_async().await;
        let rows = json!([
            day_row(45, 90.0),
            day_row(31, 95.0),
            day_row(29, 99.0),
            day_row(0, 101.0)
        ]);
        let mock = server
            .mock("GET", "/API/historical.php")
            .match_query(Matcher::Any)
            .with_body(rows.to_string())
            .expect(2)
            .create_async()
            .await;

        let provider = provider(&server);
        let symbol = Symbol::new("THYAO");

        // 1mo resolves to a 30-day lookback ending now
        let monthly = provider
            .fetch_history(&symbol, &HistoryRequest::new(Period::OneMonth, Interval::OneDay))
            .await
            .unwrap();
        assert_eq!(
            monthly.bars.iter().map(|b| b.close).collect::<Vec<_>>(),
            vec![99.0, 101.0]
        );

        // a different period is a different cache entry
        let quarterly = provider
            .fetch_history(&symbol, &HistoryRequest::new(Period::ThreeMonths, Interval::OneDay))
            .await
            .unwrap();
        assert_eq!(quarterly.len(), 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_history_all_rows_malformed() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/API/historical.php")
            .match_query(Matcher::Any)
            .with_body(r#"[{"x": 1}, {"d": "soon"}]"#)
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_history(&Symbol::new("THYAO"), &HistoryRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::DataNotAvailable { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/API/historical.php")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_quote(&Symbol::new("THYAO"))
            .await
            .unwrap_err();
        match err {
            DataError::Upstream { status, message, .. } => {
                assert_eq!(status, Some(500));
                assert!(message.starts_with("quote for THYAO"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
