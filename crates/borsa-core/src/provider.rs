//! Provider traits for fetching Turkish market data.
//!
//! Each upstream implements the capability traits it can serve:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`QuoteProvider`] - Latest price snapshots
//! - [`PriceDataProvider`] - OHLCV history
//! - [`FundamentalDataProvider`] - Financial statements
//! - [`CorporateActionsProvider`] - Dividends and capital increases
//! - [`ReferenceDataProvider`] - Company list, search and registry details
//! - [`DisclosureProvider`] - Public disclosures and the expected-disclosure calendar
//! - [`AnalystDataProvider`] - Price targets and recommendation counts
//! - [`DerivativesProvider`] - VİOP futures and options

use async_trait::async_trait;
use polars::prelude::DataFrame;
use std::fmt::Debug;

use crate::{
    error::Result,
    period::{Interval, PeriodType},
    types::{
        CapitalIncrease, Company, CompanyDetails, DerivativeContract, Disclosure, Dividend,
        ExpectedDisclosure, FinancialGroup, FinancialTable, HistoryRequest, PriceHistory,
        PriceTargets, Quote, RecommendationSummary, StatementKind, Symbol, UnderlyingClass,
    },
};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "Paratic").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;

    /// Returns the bar intervals supported by this provider.
    fn supported_intervals(&self) -> &[Interval] {
        &[]
    }
}

/// Provider for latest quotes.
#[async_trait]
pub trait QuoteProvider: DataProvider {
    /// Fetches the latest quote.
    ///
    /// Returns [`DataError::SymbolNotFound`](crate::DataError::SymbolNotFound)
    /// when the upstream reports no such symbol.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote>;
}

/// Provider for OHLCV price history.
#[async_trait]
pub trait PriceDataProvider: DataProvider {
    /// Fetches a historical series.
    ///
    /// Malformed rows are skipped and reported in [`PriceHistory::report`]. Returns
    /// [`DataError::DataNotAvailable`](crate::DataError::DataNotAvailable) when the
    /// upstream answered but no row could be used.
    async fn fetch_history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<PriceHistory>;

    /// Fetches a historical series as a DataFrame.
    ///
    /// Columns: date, open, high, low, close, volume.
    async fn fetch_history_frame(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<DataFrame> {
        self.fetch_history(symbol, request).await?.to_frame()
    }
}

/// Provider for financial statements.
#[async_trait]
pub trait FundamentalDataProvider: DataProvider {
    /// Fetches one statement for the most recent `count` periods, most recent first.
    async fn fetch_financials(
        &self,
        symbol: &Symbol,
        statement: StatementKind,
        period_type: PeriodType,
        group: FinancialGroup,
        count: usize,
    ) -> Result<FinancialTable>;
}

/// Provider for corporate actions.
#[async_trait]
pub trait CorporateActionsProvider: DataProvider {
    /// Cash dividends, most recent first.
    async fn fetch_dividends(&self, symbol: &Symbol) -> Result<Vec<Dividend>>;

    /// Capital increases, most recent first.
    async fn fetch_capital_increases(&self, symbol: &Symbol) -> Result<Vec<CapitalIncrease>>;
}

/// Provider for company reference data.
#[async_trait]
pub trait ReferenceDataProvider: DataProvider {
    /// All listed companies.
    async fn fetch_companies(&self) -> Result<Vec<Company>>;

    /// Companies matching `query`, best match first.
    async fn search(&self, query: &str) -> Result<Vec<Company>>;

    /// Registry details. Missing fields stay empty.
    async fn fetch_company_details(&self, symbol: &Symbol) -> Result<CompanyDetails>;
}

/// Provider for public disclosures.
#[async_trait]
pub trait DisclosureProvider: DataProvider {
    /// Most recent disclosures, at most `limit`.
    async fn fetch_disclosures(&self, symbol: &Symbol, limit: usize) -> Result<Vec<Disclosure>>;

    /// Disclosures announced for the coming months.
    async fn fetch_calendar(&self, symbol: &Symbol) -> Result<Vec<ExpectedDisclosure>>;
}

/// Provider for analyst coverage.
#[async_trait]
pub trait AnalystDataProvider: DataProvider {
    /// Price targets. Fields the upstream does not show stay empty.
    async fn fetch_price_targets(&self, symbol: &Symbol) -> Result<PriceTargets>;

    /// Recommendation counts per bucket.
    async fn fetch_recommendation_summary(&self, symbol: &Symbol) -> Result<RecommendationSummary>;
}

/// Provider for listed derivatives.
#[async_trait]
pub trait DerivativesProvider: DataProvider {
    /// Futures, restricted to one underlying class when given.
    async fn fetch_futures(
        &self,
        underlying: Option<UnderlyingClass>,
    ) -> Result<Vec<DerivativeContract>>;

    /// Options, restricted to one underlying class when given.
    async fn fetch_options(
        &self,
        underlying: Option<UnderlyingClass>,
    ) -> Result<Vec<DerivativeContract>>;

    /// Futures then options whose code or name mentions `symbol`.
    async fn fetch_contracts_for(&self, symbol: &Symbol) -> Result<Vec<DerivativeContract>> {
        let mut contracts = self.fetch_futures(None).await?;
        contracts.extend(self.fetch_options(None).await?);
        contracts.retain(|c| c.references(symbol));
        Ok(contracts)
    }
}
