//! Ticker info loaded lazily in three groups.

use std::fmt;

use borsa_core::{
    CompanyDetails, CompanyMetrics, CorporateActionsProvider, DataError, Dividend,
    HistoryRequest, Interval, MARKET_TZ, Period, PriceHistory, Quote, ReferenceDataProvider,
    Result, Symbol, normalize::round_to,
};
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::ProviderRegistry;

/// Alternative field names and the field they read.
const ALIASES: &[(&str, &str)] = &[
    ("regularMarketPrice", "last"),
    ("currentPrice", "last"),
    ("regularMarketOpen", "open"),
    ("regularMarketDayHigh", "high"),
    ("regularMarketDayLow", "low"),
    ("regularMarketPreviousClose", "close"),
    ("regularMarketVolume", "volume"),
    ("regularMarketChange", "change"),
    ("regularMarketChangePercent", "change_percent"),
];

const BASIC_KEYS: &[&str] = &[
    "symbol",
    "last",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "amount",
    "change",
    "change_percent",
    "update_time",
];

const EXTENDED_KEYS: &[&str] = &[
    "currency",
    "exchange",
    "timezone",
    "sector",
    "industry",
    "market",
    "website",
    "marketCap",
    "sharesOutstanding",
    "trailingPE",
    "priceToBook",
    "enterpriseToEbitda",
    "netDebt",
    "floatShares",
    "foreignRatio",
    "fiftyTwoWeekHigh",
    "fiftyTwoWeekLow",
    "fiftyDayAverage",
    "twoHundredDayAverage",
    "longBusinessSummary",
];

const DIVIDEND_KEYS: &[&str] = &[
    "dividendYield",
    "exDividendDate",
    "trailingAnnualDividendRate",
    "trailingAnnualDividendYield",
];

/// Days counted for the trailing dividend rate.
const TRAILING_DAYS: i64 = 365;

/// Group a field is loaded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoGroup {
    /// Quote fields.
    Basic,
    /// Valuation, price range and registry fields.
    Extended,
    /// Dividend fields.
    Dividends,
}

impl InfoGroup {
    /// Group of a field, after alias resolution. `None` for unknown fields.
    #[must_use]
    pub fn of(key: &str) -> Option<Self> {
        let key = TickerInfo::resolve_key(key);
        if BASIC_KEYS.contains(&key) {
            Some(Self::Basic)
        } else if EXTENDED_KEYS.contains(&key) {
            Some(Self::Extended)
        } else if DIVIDEND_KEYS.contains(&key) {
            Some(Self::Dividends)
        } else {
            None
        }
    }
}

/// A single info field.
#[derive(Clone, Debug, PartialEq)]
pub enum InfoValue {
    /// A price, ratio or amount.
    Number(f64),
    /// A share count.
    Integer(u64),
    /// Free text.
    Text(String),
    /// A calendar date.
    Date(NaiveDate),
    /// An instant.
    Time(DateTime<Utc>),
}

impl InfoValue {
    /// The value as a float, for numeric variants.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// The value as text, for the text variant.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Date(d) => write!(f, "{d}"),
            Self::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

/// Valuation metrics, price statistics and registry details.
///
/// Every field is best effort: a source that fails leaves its fields empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtendedInfo {
    /// Valuation metrics from the company card.
    pub metrics: CompanyMetrics,
    /// Sector, market segment and website.
    pub details: CompanyDetails,
    /// Business summary.
    pub business_summary: Option<String>,
    /// Market cap divided by the last price.
    pub shares_outstanding: Option<u64>,
    /// Highest high over the last year.
    pub fifty_two_week_high: Option<f64>,
    /// Lowest low over the last year.
    pub fifty_two_week_low: Option<f64>,
    /// Mean close of the last 50 bars.
    pub fifty_day_average: Option<f64>,
    /// Mean close of the last 200 bars.
    pub two_hundred_day_average: Option<f64>,
}

/// Dividend statistics. Empty when the company paid none or the source failed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DividendInfo {
    /// Date of the most recent dividend.
    pub ex_dividend_date: Option<NaiveDate>,
    /// Dividends per share paid over the last year.
    pub trailing_annual_dividend_rate: Option<f64>,
    /// Trailing rate over the last price, in percent.
    pub dividend_yield: Option<f64>,
    /// Trailing rate over the last price, as a fraction.
    pub trailing_annual_dividend_yield: Option<f64>,
}

/// Mean close of the last `n` bars, when there are at least `n`.
fn trailing_mean(history: &PriceHistory, n: usize) -> Option<f64> {
    let bars = history.bars.len().checked_sub(n).map(|skip| &history.bars[skip..])?;
    let mean = bars.iter().map(|b| b.close).sum::<f64>() / n as f64;
    Some(round_to(mean, 2))
}

fn price_statistics(info: &mut ExtendedInfo, history: &PriceHistory) {
    if history.is_empty() {
        return;
    }
    info.fifty_two_week_high = history.bars.iter().map(|b| b.high).reduce(f64::max);
    info.fifty_two_week_low = history.bars.iter().map(|b| b.low).reduce(f64::min);
    info.fifty_day_average = trailing_mean(history, 50);
    info.two_hundred_day_average = trailing_mean(history, 200);
}

/// Dividend statistics as of `today`. `dividends` are most recent first.
fn dividend_statistics(
    dividends: &[Dividend],
    price: Option<f64>,
    today: NaiveDate,
) -> DividendInfo {
    let Some(latest) = dividends.first() else {
        return DividendInfo::default();
    };
    let since = today - TimeDelta::days(TRAILING_DAYS);
    let annual: f64 = dividends
        .iter()
        .filter(|d| d.date >= since)
        .map(|d| d.amount)
        .sum();

    let mut info = DividendInfo {
        ex_dividend_date: Some(latest.date),
        trailing_annual_dividend_rate: Some(round_to(annual, 4)),
        ..DividendInfo::default()
    };
    if let Some(price) = price.filter(|p| *p > 0.0 && annual > 0.0) {
        let yield_pct = annual / price * 100.0;
        info.dividend_yield = Some(round_to(yield_pct, 2));
        info.trailing_annual_dividend_yield = Some(round_to(yield_pct / 100.0, 4));
    }
    info
}

/// Quote, valuation and dividend fields for one symbol.
///
/// Each group is fetched on first access and memoized for the life of the
/// value. Field lookups by name go through a fixed alias table first, so
/// `regularMarketPrice` reads `last`.
///
/// # Example
///
/// ```no_run
/// use borsa::{ProviderRegistry, Symbol};
///
/// # async fn example() -> borsa::Result<()> {
/// let info = ProviderRegistry::global().ticker_info(Symbol::new("THYAO"));
/// println!("{:?}", info.get("regularMarketPrice").await?);
/// println!("{:?}", info.extended().await?.metrics.market_cap);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct TickerInfo<'r> {
    registry: &'r ProviderRegistry,
    symbol: Symbol,
    basic: OnceCell<Quote>,
    extended: OnceCell<ExtendedInfo>,
    dividends: OnceCell<DividendInfo>,
}

impl ProviderRegistry {
    /// Lazily loaded info for `symbol`.
    #[must_use]
    pub fn ticker_info(&self, symbol: impl Into<Symbol>) -> TickerInfo<'_> {
        TickerInfo::new(self, symbol)
    }
}

impl<'r> TickerInfo<'r> {
    /// Info for `symbol` served by `registry`. Nothing is fetched yet.
    #[must_use]
    pub fn new(registry: &'r ProviderRegistry, symbol: impl Into<Symbol>) -> Self {
        Self {
            registry,
            symbol: symbol.into(),
            basic: OnceCell::new(),
            extended: OnceCell::new(),
            dividends: OnceCell::new(),
        }
    }

    /// The symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Canonical name of a field.
    #[must_use]
    pub fn resolve_key(key: &str) -> &str {
        ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map_or(key, |&(_, target)| target)
    }

    /// All field names, aliases included.
    pub fn keys() -> impl Iterator<Item = &'static str> {
        BASIC_KEYS
            .iter()
            .chain(EXTENDED_KEYS)
            .chain(DIVIDEND_KEYS)
            .copied()
            .chain(ALIASES.iter().map(|(alias, _)| *alias))
    }

    /// Returns true when `key` or the field it aliases exists.
    #[must_use]
    pub fn contains_key(key: &str) -> bool {
        InfoGroup::of(key).is_some()
    }

    /// Quote fields. Fails when no quote provider can serve the symbol.
    pub async fn basic(&self) -> Result<&Quote> {
        self.basic
            .get_or_try_init(|| self.registry.fetch_quote(&self.symbol))
            .await
    }

    /// Valuation, price range and registry fields.
    #[instrument(skip(self), fields(symbol = %self.symbol))]
    pub async fn extended(&self) -> Result<&ExtendedInfo> {
        self.extended
            .get_or_try_init(|| async { self.load_extended().await })
            .await
    }

    /// Dividend fields.
    #[instrument(skip(self), fields(symbol = %self.symbol))]
    pub async fn dividends(&self) -> Result<&DividendInfo> {
        self.dividends
            .get_or_try_init(|| async { self.load_dividends().await })
            .await
    }

    async fn last_price(&self) -> Option<f64> {
        match self.basic().await {
            Ok(quote) => Some(quote.last),
            Err(e) => {
                warn!(error = %e, "Quote unavailable");
                None
            }
        }
    }

    async fn load_extended(&self) -> Result<ExtendedInfo> {
        let isyatirim = self.registry.isyatirim()?;
        let kap = self.registry.kap()?;
        let request = HistoryRequest::new(Period::OneYear, Interval::OneDay);

        let (price, metrics, history, details, summary) = tokio::join!(
            self.last_price(),
            isyatirim.fetch_metrics(&self.symbol),
            self.registry.fetch_history(&self.symbol, &request),
            kap.fetch_company_details(&self.symbol),
            isyatirim.fetch_business_summary(&self.symbol),
        );

        let mut info = ExtendedInfo {
            metrics: metrics.unwrap_or_else(|e| {
                warn!(error = %e, "Metrics unavailable");
                CompanyMetrics::default()
            }),
            details: details.unwrap_or_default(),
            business_summary: summary.ok().flatten(),
            ..ExtendedInfo::default()
        };
        match history {
            Ok(history) => price_statistics(&mut info, &history),
            Err(e) => warn!(error = %e, "History unavailable"),
        }
        info.shares_outstanding = info
            .metrics
            .market_cap
            .zip(price.filter(|p| *p > 0.0))
            .and_then(|(cap, price)| {
                let shares = (cap / price).floor();
                (shares >= 0.0).then_some(shares as u64)
            });

        debug!("Loaded extended info");
        Ok(info)
    }

    async fn load_dividends(&self) -> Result<DividendInfo> {
        let isyatirim = self.registry.isyatirim()?;
        let (price, dividends) = tokio::join!(
            self.last_price(),
            isyatirim.fetch_dividends(&self.symbol),
        );
        let dividends = dividends.unwrap_or_else(|e| {
            warn!(error = %e, "Dividends unavailable");
            Vec::new()
        });
        let today = self.registry.context().clock.market_now().date_naive();
        Ok(dividend_statistics(&dividends, price, today))
    }

    /// Field by name or alias.
    ///
    /// Only the group holding the field is loaded. Returns `Ok(None)` for a
    /// field that has no value and an error for an unknown name.
    pub async fn get(&self, key: &str) -> Result<Option<InfoValue>> {
        let resolved = Self::resolve_key(key);
        let group = InfoGroup::of(resolved).ok_or_else(|| {
            DataError::InvalidParameter(format!("unknown info field `{key}`"))
        })?;

        let value = match group {
            InfoGroup::Basic => basic_field(self.basic().await?, resolved),
            InfoGroup::Extended => extended_field(self.extended().await?, resolved),
            InfoGroup::Dividends => dividend_field(self.dividends().await?, resolved),
        };
        Ok(value)
    }
}

fn number(value: Option<f64>) -> Option<InfoValue> {
    value.map(InfoValue::Number)
}

fn text(value: Option<&str>) -> Option<InfoValue> {
    value.map(|s| InfoValue::Text(s.to_string()))
}

fn basic_field(quote: &Quote, key: &str) -> Option<InfoValue> {
    match key {
        "symbol" => text(Some(quote.symbol.as_str())),
        "last" => number(Some(quote.last)),
        "open" => number(Some(quote.open)),
        "high" => number(Some(quote.high)),
        "low" => number(Some(quote.low)),
        "close" => number(Some(quote.previous_close)),
        "volume" => number(Some(quote.volume)),
        "amount" => number(quote.amount),
        "change" => number(Some(quote.change)),
        "change_percent" => number(Some(quote.change_percent)),
        "update_time" => Some(InfoValue::Time(quote.update_time)),
        _ => None,
    }
}

fn extended_field(info: &ExtendedInfo, key: &str) -> Option<InfoValue> {
    let metrics = &info.metrics;
    match key {
        "currency" => text(Some("TRY")),
        "exchange" => text(Some("BIST")),
        "timezone" => text(Some(MARKET_TZ.name())),
        // KAP has a single sector level
        "sector" | "industry" => text(info.details.sector.as_deref()),
        "market" => text(info.details.market.as_deref()),
        "website" => text(info.details.website.as_deref()),
        "marketCap" => number(metrics.market_cap),
        "sharesOutstanding" => info.shares_outstanding.map(InfoValue::Integer),
        "trailingPE" => number(metrics.pe_ratio),
        "priceToBook" => number(metrics.pb_ratio),
        "enterpriseToEbitda" => number(metrics.ev_ebitda),
        "netDebt" => number(metrics.net_debt),
        "floatShares" => number(metrics.free_float),
        "foreignRatio" => number(metrics.foreign_ratio),
        "fiftyTwoWeekHigh" => number(info.fifty_two_week_high),
        "fiftyTwoWeekLow" => number(info.fifty_two_week_low),
        "fiftyDayAverage" => number(info.fifty_day_average),
        "twoHundredDayAverage" => number(info.two_hundred_day_average),
        "longBusinessSummary" => text(info.business_summary.as_deref()),
        _ => None,
    }
}

fn dividend_field(info: &DividendInfo, key: &str) -> Option<InfoValue> {
    match key {
        "dividendYield" => number(info.dividend_yield),
        "exDividendDate" => info.ex_dividend_date.map(InfoValue::Date),
        "trailingAnnualDividendRate" => number(info.trailing_annual_dividend_rate),
        "trailingAnnualDividendYield" => number(info.trailing_annual_dividend_yield),
        _ => None,
    }
}
