#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for Turkish market data providers.
//!
//! This crate provides the foundational abstractions shared by every provider:
//!
//! - [`QuoteProvider`](provider::QuoteProvider) / [`PriceDataProvider`](provider::PriceDataProvider) - Quotes and OHLCV history
//! - [`FundamentalDataProvider`](provider::FundamentalDataProvider) - Financial statements
//! - [`ReferenceDataProvider`](provider::ReferenceDataProvider) - Company list and details
//! - [`DataCache`](cache::DataCache) - Expiring cache contract and TTL policy
//! - [`HttpTransport`](transport::HttpTransport) - Shared HTTP policy with strict/lenient status handling
//! - [`period`] - Period, interval and fiscal-period resolution
//! - [`normalize`] - Turkish number and text normalization

/// Cache trait, TTL policy and key builder.
pub mod cache;
/// Time source abstraction.
pub mod clock;
/// Shared provider resources.
pub mod context;
/// Error types for data operations.
pub mod error;
/// Turkish number and text normalization.
pub mod normalize;
/// Per-row parse results.
pub mod parse;
/// Period, interval and fiscal-period resolution.
pub mod period;
/// Provider traits for fetching market data.
pub mod provider;
/// HTTP transport policy and retry.
pub mod transport;
/// Core data types (Symbol, Quote, OHLCV, statements, ...).
pub mod types;

// Re-export commonly used items at crate root
pub use cache::{CacheKey, CachedValue, DataCache, DataKind};
pub use clock::{Clock, MARKET_TZ, ManualClock, SystemClock};
pub use context::ProviderContext;
pub use error::{DataError, Result};
pub use parse::{ParseReport, SkipReason};
pub use period::{FiscalPeriod, Interval, Period, PeriodType};
pub use provider::{
    AnalystDataProvider, CorporateActionsProvider, DataProvider, DerivativesProvider,
    DisclosureProvider, FundamentalDataProvider, PriceDataProvider, QuoteProvider,
    ReferenceDataProvider,
};
pub use transport::{HttpTransport, Payload, RetryPolicy, StatusMode, TransportConfig};
pub use types::{
    AnalystRecommendation, CapitalIncrease, Company, CompanyDetails, CompanyMetrics,
    ContractKind, DerivativeContract, Disclosure, Dividend, ExpectedDisclosure, FinancialGroup,
    FinancialTable, HistoryRequest, IndexInfo, LineItem, MajorHolder, OhlcvBar, PriceHistory,
    PriceTargets, Quote, RecommendationSummary, StatementKind, Symbol, UnderlyingClass,
};
