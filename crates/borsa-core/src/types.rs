//! Core data types for Turkish market data.
//!
//! This module defines the uniform record shapes every provider produces:
//!
//! - [`Symbol`] - BIST ticker
//! - [`Quote`] - Latest price snapshot
//! - [`OhlcvBar`] / [`PriceHistory`] - Historical series
//! - [`FinancialTable`] - Financial statement with one column per fiscal period
//! - Corporate actions, holders, disclosures and analyst records

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use polars::prelude::{Column, DataFrame, DataType, TimeUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::cache::{CacheKey, DataKind};
use crate::error::{DataError, Result};
use crate::parse::ParseReport;
use crate::period::{Interval, Period, PeriodType, resolve_window};

/// A BIST ticker.
///
/// Symbols are uppercased on creation and lose the `.IS` / `.E` suffixes
/// used by international data vendors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol, normalizing case and suffixes.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        let upper = s.into().trim().to_uppercase();
        let stripped = upper
            .strip_suffix(".IS")
            .or_else(|| upper.strip_suffix(".E"))
            .unwrap_or(upper.as_str());
        Self(stripped.to_string())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Latest price snapshot for a stock or index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    /// Symbol the quote is for.
    pub symbol: Symbol,
    /// Last traded price.
    pub last: f64,
    /// Session open.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Previous session close.
    pub previous_close: f64,
    /// Traded volume in shares.
    pub volume: f64,
    /// Traded amount in TRY, when the upstream reports it.
    pub amount: Option<f64>,
    /// `last - previous_close`.
    pub change: f64,
    /// Change relative to the previous close, in percent.
    pub change_percent: f64,
    /// Best bid.
    pub bid: Option<f64>,
    /// Best ask.
    pub ask: Option<f64>,
    /// Time of the last update.
    pub update_time: DateTime<Utc>,
}

/// OHLCV (Open, High, Low, Close, Volume) bar data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    /// Timestamp of the bar.
    pub timestamp: DateTime<Utc>,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
}

impl OhlcvBar {
    /// Creates a new OHLCV bar.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Parameters of a history query.
///
/// Either a lookback [`Period`] or explicit bounds; missing bounds are filled in
/// by [`HistoryRequest::window`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    /// Lookback period used when `start` is absent.
    pub period: Period,
    /// Bar granularity.
    pub interval: Interval,
    /// Explicit start (inclusive).
    pub start: Option<DateTime<Utc>>,
    /// Explicit end (inclusive). Defaults to now.
    pub end: Option<DateTime<Utc>>,
}

impl HistoryRequest {
    /// A lookback query.
    #[must_use]
    pub const fn new(period: Period, interval: Interval) -> Self {
        Self {
            period,
            interval,
            start: None,
            end: None,
        }
    }

    /// An explicit range query.
    #[must_use]
    pub const fn between(start: DateTime<Utc>, end: DateTime<Utc>, interval: Interval) -> Self {
        Self {
            period: Period::OneMonth,
            interval,
            start: Some(start),
            end: Some(end),
        }
    }

    /// Sets the start bound.
    #[must_use]
    pub const fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the end bound.
    #[must_use]
    pub const fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    /// Resolves the concrete `(start, end)` window.
    #[must_use]
    pub fn window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        resolve_window(self.period, self.start, self.end, now)
    }

    /// Cache key for this query against one provider and symbol.
    #[must_use]
    pub fn cache_key(&self, provider: &str, symbol: &Symbol) -> String {
        CacheKey::new(provider, DataKind::History)
            .part(symbol)
            .part(self.period)
            .part(self.interval)
            .opt("start", self.start.map(|t| t.timestamp()))
            .opt("end", self.end.map(|t| t.timestamp()))
            .build()
    }
}

/// A historical series: bars ascending by timestamp, unique per timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    /// Symbol the series is for.
    pub symbol: Symbol,
    /// Bar granularity.
    pub interval: Interval,
    /// The bars.
    pub bars: Vec<OhlcvBar>,
    /// Rows that were skipped while parsing.
    pub report: ParseReport,
}

impl PriceHistory {
    /// Builds a series, sorting bars and dropping duplicate timestamps.
    ///
    /// The first bar seen for a timestamp wins.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        interval: Interval,
        mut bars: Vec<OhlcvBar>,
        report: ParseReport,
    ) -> Self {
        bars.sort_by_key(|bar| bar.timestamp);
        bars.dedup_by_key(|bar| bar.timestamp);
        Self {
            symbol,
            interval,
            bars,
            report,
        }
    }

    /// Number of bars.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    /// Returns true if there are no bars.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Most recent bar.
    #[must_use]
    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    /// Converts to a DataFrame with columns `date, open, high, low, close, volume`.
    ///
    /// `date` is a millisecond UTC datetime column.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let dates: Vec<i64> = self.bars.iter().map(|b| b.timestamp.timestamp_millis()).collect();
        let column = |name: &str, pick: fn(&OhlcvBar) -> f64| {
            Column::new(name.into(), self.bars.iter().map(pick).collect::<Vec<f64>>())
        };

        let date_col = Column::new("date".into(), dates)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .map_err(|e| DataError::Other(e.to_string()))?;

        DataFrame::new(vec![
            date_col,
            column("open", |b| b.open),
            column("high", |b| b.high),
            column("low", |b| b.low),
            column("close", |b| b.close),
            column("volume", |b| b.volume),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}

/// Kind of financial statement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatementKind {
    /// Bilanço: assets and liabilities.
    BalanceSheet,
    /// Gelir tablosu.
    IncomeStatement,
    /// Nakit akım tablosu.
    CashFlow,
}

impl StatementKind {
    /// Short label used in cache keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BalanceSheet => "balance_sheet",
            Self::IncomeStatement => "income_stmt",
            Self::CashFlow => "cashflow",
        }
    }
}

/// Reporting template used by the issuer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FinancialGroup {
    /// Industrial companies.
    #[default]
    Industrial,
    /// Banks.
    Bank,
}

impl FinancialGroup {
    /// Upstream code of the template.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Industrial => "XI_29",
            Self::Bank => "UFRS",
        }
    }
}

/// One row of a financial statement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Turkish item description.
    pub name: String,
    /// English item description, when provided.
    pub name_en: Option<String>,
    /// One value per period of the owning table.
    pub values: Vec<Option<f64>>,
}

/// A financial statement with one column per fiscal period, most recent first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialTable {
    /// Issuer.
    pub symbol: Symbol,
    /// Statement kind.
    pub statement: StatementKind,
    /// Annual or quarterly.
    pub period_type: PeriodType,
    /// Period labels (`"2024"` or `"2024Q3"`).
    pub periods: Vec<String>,
    /// Line items.
    pub items: Vec<LineItem>,
}

impl FinancialTable {
    /// Value of the first item whose Turkish name contains `needle`, for the
    /// most recent period.
    #[must_use]
    pub fn latest_value(&self, needle: &str) -> Option<f64> {
        self.items
            .iter()
            .find(|item| item.name.contains(needle))
            .and_then(|item| item.values.first().copied().flatten())
    }

    /// Converts to a DataFrame: an `item` column followed by one column per period.
    pub fn to_frame(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.periods.len() + 1);
        columns.push(Column::new(
            "item".into(),
            self.items.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
        ));
        for (idx, period) in self.periods.iter().enumerate() {
            let values: Vec<Option<f64>> = self
                .items
                .iter()
                .map(|item| item.values.get(idx).copied().flatten())
                .collect();
            columns.push(Column::new(period.as_str().into(), values));
        }

        DataFrame::new(columns).map_err(|e| DataError::Other(e.to_string()))
    }
}

/// A cash dividend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    /// Distribution date.
    pub date: NaiveDate,
    /// Gross amount per share in TRY.
    pub amount: f64,
    /// Gross rate over nominal value, in percent.
    pub gross_rate: f64,
    /// Net rate over nominal value, in percent.
    pub net_rate: f64,
    /// Total distributed amount in TRY.
    pub total_dividend: f64,
}

/// A capital increase (rights issue or bonus shares).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CapitalIncrease {
    /// Effective date.
    pub date: NaiveDate,
    /// Capital after the increase.
    pub capital: f64,
    /// Rights issue (bedelli) rate, in percent.
    pub rights_issue: f64,
    /// Bonus from internal resources (bedelsiz iç kaynak) rate, in percent.
    pub bonus_from_capital: f64,
    /// Bonus from dividend (bedelsiz temettü) rate, in percent.
    pub bonus_from_dividend: f64,
}

/// A shareholder and its stake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MajorHolder {
    /// Holder name.
    pub holder: String,
    /// Stake, in percent.
    pub percentage: f64,
}

/// Consensus recommendation published by the broker.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalystRecommendation {
    /// Recommendation label (`AL`, `TUT`, `SAT`, ...).
    pub recommendation: Option<String>,
    /// Target price.
    pub target_price: Option<f64>,
    /// Upside to the target, in percent.
    pub upside_potential: Option<f64>,
}

/// Valuation metrics from the company card.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompanyMetrics {
    /// Market capitalization in TRY.
    pub market_cap: Option<f64>,
    /// Price to earnings.
    pub pe_ratio: Option<f64>,
    /// Price to book.
    pub pb_ratio: Option<f64>,
    /// Enterprise value to EBITDA.
    pub ev_ebitda: Option<f64>,
    /// Net debt in TRY.
    pub net_debt: Option<f64>,
    /// Free float, in percent.
    pub free_float: Option<f64>,
    /// Foreign ownership, in percent.
    pub foreign_ratio: Option<f64>,
}

/// A listed company.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    /// Ticker.
    pub ticker: String,
    /// Legal name.
    pub name: String,
    /// Registered city.
    pub city: String,
}

/// Registry details from the disclosure platform.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyDetails {
    /// Sector.
    pub sector: Option<String>,
    /// Market segment (Yıldız Pazar, Ana Pazar, ...).
    pub market: Option<String>,
    /// Website.
    pub website: Option<String>,
}

/// A public disclosure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disclosure {
    /// Publication time as shown upstream (`dd.mm.YYYY HH:MM:SS`).
    pub published: String,
    /// Parsed publication time, local to Istanbul.
    pub published_at: Option<NaiveDateTime>,
    /// Upstream disclosure index.
    pub index: u64,
    /// Title.
    pub title: String,
    /// Link to the disclosure page.
    pub url: String,
}

impl Disclosure {
    /// Upstream timestamp format.
    pub const DATE_FORMAT: &'static str = "%d.%m.%Y %H:%M:%S";

    /// Creates a disclosure, parsing the publication time when possible.
    pub fn new(
        published: impl Into<String>,
        index: u64,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let published = published.into();
        let published_at = NaiveDateTime::parse_from_str(published.trim(), Self::DATE_FORMAT).ok();
        Self {
            published,
            published_at,
            index,
            title: title.into(),
            url: url.into(),
        }
    }
}

/// An announced upcoming disclosure.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedDisclosure {
    /// Window start as shown upstream.
    pub start_date: String,
    /// Window end as shown upstream.
    pub end_date: String,
    /// Subject (e.g. financial report).
    pub subject: String,
    /// Period term (e.g. `Yıllık`, `3 Aylık`).
    pub period: String,
    /// Fiscal year.
    pub year: String,
}

/// Analyst price targets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceTargets {
    /// Current price.
    pub current: Option<f64>,
    /// Lowest target.
    pub low: Option<f64>,
    /// Highest target.
    pub high: Option<f64>,
    /// Mean target.
    pub mean: Option<f64>,
    /// Midpoint of the lowest and highest targets.
    pub median: Option<f64>,
    /// Number of covering institutions.
    pub analyst_count: Option<u32>,
}

/// Count of analyst recommendations per bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSummary {
    /// Strong buy.
    pub strong_buy: u32,
    /// Buy or outperform.
    pub buy: u32,
    /// Hold or market perform.
    pub hold: u32,
    /// Sell or underperform.
    pub sell: u32,
    /// Strong sell.
    pub strong_sell: u32,
}

impl RecommendationSummary {
    /// Total number of recommendations.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.strong_buy + self.buy + self.hold + self.sell + self.strong_sell
    }

    /// Returns true when no recommendation was counted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// Derivatives contract type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    /// Vadeli işlem.
    Future,
    /// Opsiyon.
    Option,
}

/// Asset class of a contract's underlying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnderlyingClass {
    /// Single stock.
    Stock,
    /// Equity index.
    Index,
    /// Currency pair.
    Currency,
    /// Precious metal.
    Commodity,
}

impl UnderlyingClass {
    /// Lowercase label used in frames.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Index => "index",
            Self::Currency => "currency",
            Self::Commodity => "commodity",
        }
    }
}

/// One row of the VİOP board.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DerivativeContract {
    /// Contract code (`F_AKBNK0226`). Empty when the board does not show one.
    pub code: String,
    /// Display name (`AKBNK Şubat 2026 Vadeli`).
    pub name: String,
    /// Last price.
    pub price: Option<f64>,
    /// Price change.
    pub change: Option<f64>,
    /// Traded value in TRY.
    pub volume_try: Option<f64>,
    /// Traded contracts.
    pub volume_contracts: Option<f64>,
    /// Future or option.
    pub kind: ContractKind,
    /// Underlying asset class.
    pub underlying: UnderlyingClass,
}

impl DerivativeContract {
    /// Returns true when the code or the name mentions `symbol`.
    #[must_use]
    pub fn references(&self, symbol: &Symbol) -> bool {
        let needle = symbol.as_str();
        self.code.to_uppercase().contains(needle) || self.name.to_uppercase().contains(needle)
    }

    /// Converts contracts to a DataFrame with columns
    /// `code, contract, price, change, volume_tl, volume_qty, category`.
    pub fn to_frame(contracts: &[Self]) -> Result<DataFrame> {
        let text = |name: &str, pick: fn(&Self) -> &str| {
            Column::new(name.into(), contracts.iter().map(pick).collect::<Vec<_>>())
        };
        let number = |name: &str, pick: fn(&Self) -> Option<f64>| {
            Column::new(name.into(), contracts.iter().map(pick).collect::<Vec<_>>())
        };

        DataFrame::new(vec![
            text("code", |c| c.code.as_str()),
            text("contract", |c| c.name.as_str()),
            number("price", |c| c.price),
            number("change", |c| c.change),
            number("volume_tl", |c| c.volume_try),
            number("volume_qty", |c| c.volume_contracts),
            text("category", |c| c.underlying.as_str()),
        ])
        .map_err(|e| DataError::Other(e.to_string()))
    }
}

/// A BIST index with its latest quote.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index code (`XU100`).
    pub symbol: Symbol,
    /// Display name (`BIST 100`).
    pub name: String,
    /// Latest quote.
    pub quote: Quote,
}
