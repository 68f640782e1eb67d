#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! İş Yatırım data provider.
//!
//! This crate provides an İş Yatırım data provider that implements the
//! [`DataProvider`], [`QuoteProvider`], [`PriceDataProvider`],
//! [`FundamentalDataProvider`], and [`CorporateActionsProvider`] traits from
//! `borsa-core`.
//!
//! # Features
//!
//! - Latest quotes for stocks and indices
//! - Daily index history
//! - Balance sheet, income statement and cash flow (up to five periods per call)
//! - Dividends, capital increases and the analyst recommendation
//! - Shareholder structure, valuation metrics and business summary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use borsa_cache::MemoryCache;
//! use borsa_core::{
//!     FinancialGroup, FundamentalDataProvider, PeriodType, ProviderContext, StatementKind, Symbol,
//! };
//! use borsa_isyatirim::IsYatirimProvider;
//!
//! # async fn example() -> borsa_core::Result<()> {
//! let provider = IsYatirimProvider::new(&ProviderContext::new(Arc::new(MemoryCache::new())))?;
//! let table = provider
//!     .fetch_financials(
//!         &Symbol::new("THYAO"),
//!         StatementKind::IncomeStatement,
//!         PeriodType::Quarterly,
//!         FinancialGroup::Industrial,
//!         4,
//!     )
//!     .await?;
//! println!("{:?}", table.periods);
//! # Ok(())
//! # }
//! ```

mod card;
mod corporate;
mod financials;

use std::sync::Arc;

use async_trait::async_trait;
use borsa_core::{
    CacheKey, Clock, DataCache, DataError, DataKind, DataProvider, HistoryRequest, HttpTransport,
    IndexInfo, Interval, MARKET_TZ, OhlcvBar, PriceDataProvider, PriceHistory, ProviderContext,
    Quote, QuoteProvider, Result, RetryPolicy, SkipReason, StatusMode, Symbol,
    normalize::{round_to, value_as_f64},
    parse::collect_rows,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

/// İş Yatırım website root.
pub const ISYATIRIM_URL: &str = "https://www.isyatirim.com.tr";

const COMMON_PATH: &str = "/_Layouts/15/IsYatirim.Website/Common";
const STOCK_INFO_PATH: &str = "/_layouts/15/IsYatirim.Website/StockInfo/CompanyInfoAjax.aspx";
const STOCK_PAGE_PATH: &str = "/tr-tr/analiz/hisse/Sayfalar/sirket-karti.aspx";

const PROVIDER: &str = "IsYatirim";

/// Key prefix for cache entries.
const CACHE_PREFIX: &str = "isyatirim";

/// Default index history lookback.
const INDEX_HISTORY_DAYS: i64 = 365;

/// Known BIST indices and their display names.
pub const INDICES: &[(&str, &str)] = &[
    ("XU100", "BIST 100"),
    ("XU050", "BIST 50"),
    ("XU030", "BIST 30"),
    ("XBANK", "BIST Banka"),
    ("XUSIN", "BIST Sınai"),
    ("XHOLD", "BIST Holding ve Yatırım"),
    ("XUTEK", "BIST Teknoloji"),
    ("XGIDA", "BIST Gıda"),
    ("XTRZM", "BIST Turizm"),
    ("XULAS", "BIST Ulaştırma"),
    ("XSGRT", "BIST Sigorta"),
    ("XMANA", "BIST Metal Ana"),
    ("XKMYA", "BIST Kimya"),
    ("XMADN", "BIST Maden"),
    ("XELKT", "BIST Elektrik"),
    ("XTEKS", "BIST Tekstil"),
    ("XILTM", "BIST İletişim"),
    ("XUMAL", "BIST Mali"),
    ("XUTUM", "BIST Tüm"),
];

/// Display name of a known index code.
#[must_use]
pub fn index_name(code: &str) -> Option<&'static str> {
    INDICES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// İş Yatırım data provider.
///
/// Implements [`DataProvider`], [`QuoteProvider`], [`PriceDataProvider`] (daily
/// index history), [`FundamentalDataProvider`], and [`CorporateActionsProvider`].
/// Non-2xx responses are errors.
#[derive(Debug)]
pub struct IsYatirimProvider {
    transport: HttpTransport,
    cache: Arc<dyn DataCache>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    base_url: String,
}

impl IsYatirimProvider {
    /// Create a provider from shared context.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, &ctx.transport)?,
            cache: Arc::clone(&ctx.cache),
            clock: Arc::clone(&ctx.clock),
            retry: ctx.retry,
            base_url: ISYATIRIM_URL.to_string(),
        })
    }

    /// Point the provider at a different host. Endpoint paths are kept.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn common_url(&self, endpoint: &str) -> String {
        format!("{}{COMMON_PATH}/{endpoint}", self.base_url)
    }

    fn stock_info_url(&self, method: &str) -> String {
        format!("{}{STOCK_INFO_PATH}/{method}", self.base_url)
    }

    fn stock_page_url(&self, symbol: &Symbol) -> String {
        format!("{}{STOCK_PAGE_PATH}?hisse={symbol}", self.base_url)
    }

    fn today(&self) -> NaiveDate {
        self.clock.market_now().date_naive()
    }

    /// Daily history of an index between two dates, inclusive.
    ///
    /// `end` defaults to today and `start` to one year before `end`.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_index_history(
        &self,
        symbol: &Symbol,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<PriceHistory> {
        let end = end.unwrap_or_else(|| self.today());
        let start = start.unwrap_or(end - TimeDelta::days(INDEX_HISTORY_DAYS));
        let start_str = start.format("%d-%m-%Y").to_string();
        let end_str = end.format("%d-%m-%Y").to_string();

        let key = CacheKey::new(CACHE_PREFIX, DataKind::History)
            .part(symbol)
            .part("index")
            .part(&start_str)
            .part(&end_str)
            .build();
        if let Some(history) = self.cache.get::<PriceHistory>(&key) {
            debug!("Serving index history from cache");
            return Ok(history);
        }

        let rows = self
            .transport
            .get(&self.common_url("ChartData.aspx/IndexHistoricalAll"))
            .query(&[
                ("endeks", symbol.as_str()),
                ("startdate", start_str.as_str()),
                ("enddate", end_str.as_str()),
            ])
            .send(StatusMode::Strict)
            .await
            .and_then(|payload| payload.json::<Value>())
            .map_err(|e| e.context(format!("index history for {symbol}")))?;

        let rows = match rows {
            Value::Array(rows) if !rows.is_empty() => rows,
            _ => return Err(DataError::unavailable(symbol.as_str(), "empty index history")),
        };

        let (bars, report) = collect_rows(
            "isyatirim index history",
            rows.iter().enumerate().map(|(idx, row)| parse_index_row(idx, row)),
        );
        if bars.is_empty() {
            return Err(DataError::unavailable(
                symbol.as_str(),
                format!("none of {} index rows could be parsed", report.total()),
            ));
        }

        let history = PriceHistory::new(symbol.clone(), Interval::OneDay, bars, report);
        self.cache.set(key, history.clone(), DataKind::History);
        Ok(history)
    }

    /// Quote and display name of a known BIST index.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_index_info(&self, symbol: &Symbol) -> Result<IndexInfo> {
        let Some(name) = index_name(symbol.as_str()) else {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        };
        let quote = self.fetch_quote(symbol).await?;
        Ok(IndexInfo {
            symbol: symbol.clone(),
            name: name.to_string(),
            quote,
        })
    }
}

fn number(value: &Value, name: &str) -> f64 {
    value.get(name).and_then(value_as_f64).unwrap_or(0.0)
}

fn parse_index_row(row: usize, value: &Value) -> std::result::Result<OhlcvBar, SkipReason> {
    let date = value
        .get("date")
        .and_then(Value::as_str)
        .and_then(|d| d.get(..10))
        .ok_or_else(|| SkipReason::new(row, "missing `date`"))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| SkipReason::new(row, format!("invalid date {date:?}: {e}")))?;
    let timestamp = date
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_local_timezone(MARKET_TZ).single())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| SkipReason::new(row, format!("date {date} has no local midnight")))?;

    let close = value
        .get("close")
        .and_then(value_as_f64)
        .ok_or_else(|| SkipReason::new(row, "missing or invalid `close`"))?;
    let price = |name: &str| value.get(name).and_then(value_as_f64).unwrap_or(close);

    Ok(OhlcvBar::new(
        timestamp,
        price("open"),
        price("high"),
        price("low"),
        close,
        number(value, "volume"),
    ))
}

/// Reads `updateDate`, e.g. `2025-02-10T18:10:00+03`.
fn parse_update_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let fixed = match raw.strip_suffix("+03") {
        Some(head) => format!("{head}+03:00"),
        None => raw.to_string(),
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(&fixed) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .and_then(|dt| dt.and_local_timezone(MARKET_TZ).single())
        .map(|dt| dt.with_timezone(&Utc))
}

impl DataProvider for IsYatirimProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn description(&self) -> &str {
        "İş Yatırım quotes, index history, financial statements and corporate actions"
    }

    fn supported_intervals(&self) -> &[Interval] {
        &[Interval::OneDay]
    }
}

#[async_trait]
impl QuoteProvider for IsYatirimProvider {
    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::RealtimeQuote)
            .part(symbol)
            .build();
        if let Some(quote) = self.cache.get::<Quote>(&key) {
            debug!("Serving quote from cache");
            return Ok(quote);
        }

        let data = self
            .transport
            .get(&self.common_url("ChartData.aspx/OneEndeks"))
            .query(&[("endeks", symbol.as_str())])
            .send(StatusMode::Strict)
            .await
            .and_then(|payload| payload.json::<Value>())
            .map_err(|e| e.context(format!("quote for {symbol}")))?;

        let data = match data {
            Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            other => other,
        };
        let known = data
            .get("symbol")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !known {
            return Err(DataError::SymbolNotFound(symbol.to_string()));
        }

        let last = number(&data, "last");
        let previous_close = number(&data, "dayClose");
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
        let positive = |name: &str| Some(number(&data, name)).filter(|v| *v > 0.0);

        let quote = Quote {
            symbol: symbol.clone(),
            last,
            open: number(&data, "open"),
            high: number(&data, "high"),
            low: number(&data, "low"),
            previous_close,
            volume: number(&data, "volume"),
            amount: None,
            change: round_to(change, 2),
            change_percent: round_to(change_percent, 2),
            bid: positive("bid"),
            ask: positive("ask"),
            update_time: data
                .get("updateDate")
                .and_then(Value::as_str)
                .and_then(parse_update_time)
                .unwrap_or_else(|| self.clock.now()),
        };

        self.cache.set(key, quote.clone(), DataKind::RealtimeQuote);
        Ok(quote)
    }
}

#[async_trait]
impl PriceDataProvider for IsYatirimProvider {
    /// Daily index history over the request window.
    #[instrument(skip(self, request), fields(symbol = %symbol, period = %request.period))]
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<PriceHistory> {
        if request.interval != Interval::OneDay {
            return Err(DataError::NotSupported(format!(
                "{PROVIDER} only serves daily history, got {}",
                request.interval
            )));
        }
        let (start, end) = request.window(self.clock.now());
        let start = start.with_timezone(&MARKET_TZ).date_naive();
        let end = end.with_timezone(&MARKET_TZ).date_naive();
        self.fetch_index_history(symbol, Some(start), Some(end)).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{now, provider};
    use super::*;
    use borsa_core::Period;
    use chrono::TimeZone;
    use mockito::{Matcher, Server};
    use serde_json::json;

    const QUOTE_PATH: &str = "/_Layouts/15/IsYatirim.Website/Common/ChartData.aspx/OneEndeks";
    const HISTORY_PATH: &str =
        "/_Layouts/15/IsYatirim.Website/Common/ChartData.aspx/IndexHistoricalAll";

    #[test]
    fn test_index_name_lookup() {
        assert_eq!(index_name("XU100"), Some("BIST 100"));
        assert_eq!(index_name("xbank"), Some("BIST Banka"));
        assert_eq!(index_name("THYAO"), None);
        assert_eq!(INDICES.len(), 19);
    }

    #[test]
    fn test_parse_update_time() {
        let expected = Utc.with_ymd_and_hms(2025, 2, 10, 15, 10, 0).unwrap();
        assert_eq!(parse_update_time("2025-02-10T18:10:00+03"), Some(expected));
        assert_eq!(parse_update_time("2025-02-10T18:10:00+03:00"), Some(expected));
        assert_eq!(parse_update_time("2025-02-10T18:10:00"), Some(expected));
        assert_eq!(parse_update_time("yesterday"), None);
    }

    #[tokio::test]
    async fn test_quote_parsing_and_cache() {
        let mut server = Server::new_async().await;
        let body = json!({
            "symbol": "THYAO",
            "last": 268.5,
            "dayClose": 260.0,
            "open": 261.0,
            "high": 270.0,
            "low": 259.5,
            "volume": 1_250_000,
            "quantity": 4650,
            "bid": 268.25,
            "ask": 268.5,
            "updateDate": "2025-02-10T18:10:00+03",
        });
        let mock = server
            .mock("GET", QUOTE_PATH)
            .match_query(Matcher::UrlEncoded("endeks".into(), "THYAO".into()))
            .with_body(body.to_string())
            .expect(1)
            .create_async()
            .await;

        let provider = provider(&server);
        let symbol = Symbol::new("thyao.is");
        let quote = provider.fetch_quote(&symbol).await.unwrap();

        assert_eq!(quote.last, 268.5);
        assert_eq!(quote.previous_close, 260.0);
        assert_eq!(quote.change, 8.5);
        assert_eq!(quote.change_percent, 3.27);
        assert_eq!(quote.bid, Some(268.25));
        assert_eq!(
            quote.update_time,
            Utc.with_ymd_and_hms(2025, 2, 10, 15, 10, 0).unwrap()
        );

        provider.fetch_quote(&symbol).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_quote_without_symbol_is_not_found() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", QUOTE_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"last": 0}"#)
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_quote(&Symbol::new("NOPE"))
            .await
            .unwrap_err();
        assert_eq!(err, DataError::SymbolNotFound("NOPE".to_string()));
    }

    #[tokio::test]
    async fn test_quote_falls_back_to_clock_time() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", QUOTE_PATH)
            .match_query(Matcher::Any)
            .with_body(r#"{"symbol": "XU100", "last": 9800.5, "dayClose": 0}"#)
            .create_async()
            .await;

        let quote = provider(&server)
            .fetch_quote(&Symbol::new("XU100"))
            .await
            .unwrap();
        assert_eq!(quote.update_time, now());
        assert_eq!(quote.change, 0.0);
        assert_eq!(quote.bid, None);
    }

    #[tokio::test]
    async fn test_index_info_rejects_unknown_index() {
        let server = Server::new_async().await;
        let err = provider(&server)
            .fetch_index_info(&Symbol::new("THYAO"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound(_)));
    }

    #[tokio::test]
    async fn test_index_history_default_window() {
        let mut server = Server::new_async().await;
        let rows = json!([
            {"date": "2025-02-07T00:00:00", "open": 9700, "high": 9820, "low": 9650, "close": 9800, "volume": 10},
            {"date": "bad"},
            {"date": "2025-02-06T00:00:00", "close": "9.650,25"},
        ]);
        let mock = server
            .mock("GET", HISTORY_PATH)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("endeks".into(), "XU100".into()),
                Matcher::UrlEncoded("startdate".into(), "11-02-2024".into()),
                Matcher::UrlEncoded("enddate".into(), "10-02-2025".into()),
            ]))
            .with_body(rows.to_string())
            .expect(1)
            .create_async()
            .await;

        let history = provider(&server)
            .fetch_index_history(&Symbol::new("XU100"), None, None)
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history.report.skipped.len(), 1);
        // sorted ascending, midnight Istanbul
        assert_eq!(
            history.bars[0].timestamp,
            Utc.with_ymd_and_hms(2025, 2, 5, 21, 0, 0).unwrap()
        );
        assert_eq!(history.bars[0].open, 9650.25);
        assert_eq!(history.bars[1].close, 9800.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_index_history_empty_is_unavailable() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", HISTORY_PATH)
            .match_query(Matcher::Any)
            .with_body("[]")
            .create_async()
            .await;

        let err = provider(&server)
            .fetch_history(&Symbol::new("XU100"), &HistoryRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::DataNotAvailable { .. }));
    }

    #[tokio::test]
    async fn test_history_rejects_intraday() {
        let server = Server::new_async().await;
        let request = HistoryRequest::new(Period::OneDay, Interval::FiveMinutes);
        let err = provider(&server)
            .fetch_history(&Symbol::new("XU100"), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::NotSupported(_)));
    }
}
