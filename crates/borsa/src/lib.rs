#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Unified Turkish market data interface.
//!
//! This crate re-exports the core types and provider implementations, and
//! provides a [`ProviderRegistry`] that builds each provider once and falls back
//! across price providers.
//!
//! # Features
//!
//! - `paratic` - Paratic provider for quotes and OHLCV history
//! - `isyatirim` - İş Yatırım provider for quotes, statements and corporate actions
//! - `kap` - KAP provider for the company registry and disclosures
//! - `hedeffiyat` - HedefFiyat provider for analyst price targets
//! - `viop` - VİOP provider for futures and options
//!
//! [`TickerInfo`] needs both `isyatirim` and `kap`.
//!
//! # Example
//!
//! ```no_run
//! use borsa::{HistoryRequest, Interval, Period, ProviderRegistry, Symbol};
//!
//! # async fn example() -> borsa::Result<()> {
//! let registry = ProviderRegistry::global();
//! let symbol = Symbol::new("THYAO");
//!
//! let quote = registry.fetch_quote(&symbol).await?;
//! let history = registry
//!     .fetch_history(&symbol, &HistoryRequest::new(Period::OneYear, Interval::OneDay))
//!     .await?;
//! println!("{} at {}, {} bars", symbol, quote.last, history.len());
//! # Ok(())
//! # }
//! ```

// Core types and traits
pub use borsa_core::*;

// Cache implementations
pub use borsa_cache::{MemoryCache, NoopCache};

// Providers
#[cfg(feature = "hedeffiyat")]
pub use borsa_hedeffiyat::HedefFiyatProvider;
#[cfg(feature = "isyatirim")]
pub use borsa_isyatirim::IsYatirimProvider;
#[cfg(feature = "kap")]
pub use borsa_kap::KapProvider;
#[cfg(feature = "paratic")]
pub use borsa_paratic::ParaticProvider;
#[cfg(feature = "viop")]
pub use borsa_viop::ViopProvider;

#[cfg(all(feature = "isyatirim", feature = "kap"))]
mod info;
mod registry;

#[cfg(all(feature = "isyatirim", feature = "kap"))]
pub use info::{DividendInfo, ExtendedInfo, InfoGroup, InfoValue, TickerInfo};
pub use registry::ProviderRegistry;
