#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! VİOP data provider.
//!
//! This crate provides a derivatives provider that implements the
//! [`DataProvider`] and [`DerivativesProvider`] traits from `borsa-core`.
//!
//! The whole board is one page, so every call is served from a single cached
//! snapshot that expires after [`DataKind::Derivatives`]'s TTL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use borsa_cache::MemoryCache;
//! use borsa_core::{DerivativesProvider, ProviderContext, Symbol, UnderlyingClass};
//! use borsa_viop::ViopProvider;
//!
//! # async fn example() -> borsa_core::Result<()> {
//! let provider = ViopProvider::new(&ProviderContext::new(Arc::new(MemoryCache::new())))?;
//! let index_futures = provider.fetch_futures(Some(UnderlyingClass::Index)).await?;
//! let akbnk = provider.fetch_contracts_for(&Symbol::new("AKBNK")).await?;
//! println!("{} index futures, {} AKBNK contracts", index_futures.len(), akbnk.len());
//! # Ok(())
//! # }
//! ```

mod board;

use std::sync::Arc;

use async_trait::async_trait;
use borsa_core::{
    CacheKey, ContractKind, DataCache, DataKind, DataProvider, DerivativeContract,
    DerivativesProvider, HttpTransport, ProviderContext, Result, RetryPolicy, StatusMode,
    UnderlyingClass,
};
use tracing::{debug, instrument, warn};

use crate::board::parse_board;

/// İş Yatırım website root, which hosts the board.
pub const VIOP_URL: &str = "https://www.isyatirim.com.tr";

const BOARD_PATH: &str = "/tr-tr/analiz/Sayfalar/viop.aspx";

const PROVIDER: &str = "VIOP";

/// Key prefix for cache entries.
const CACHE_PREFIX: &str = "viop";

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// VİOP data provider.
///
/// Implements [`DataProvider`] and [`DerivativesProvider`]. Non-2xx responses
/// are errors.
#[derive(Debug)]
pub struct ViopProvider {
    transport: HttpTransport,
    cache: Arc<dyn DataCache>,
    retry: RetryPolicy,
    base_url: String,
}

impl ViopProvider {
    /// Create a provider from shared context.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, &ctx.transport)?,
            cache: Arc::clone(&ctx.cache),
            retry: ctx.retry,
            base_url: VIOP_URL.to_string(),
        })
    }

    /// Point the provider at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Every contract on the board, futures first.
    ///
    /// The page is retried on transient failures. A board without any
    /// recognizable section is returned empty and not cached.
    #[instrument(skip(self))]
    pub async fn fetch_board(&self) -> Result<Vec<DerivativeContract>> {
        let key = CacheKey::new(CACHE_PREFIX, DataKind::Derivatives)
            .part("board")
            .build();
        if let Some(contracts) = self.cache.get::<Vec<DerivativeContract>>(&key) {
            debug!("Serving board from cache");
            return Ok(contracts);
        }

        let url = format!("{}{BOARD_PATH}", self.base_url);
        let html = self
            .retry
            .run("viop board", || async {
                self.transport
                    .get(&url)
                    .header("Accept", PAGE_ACCEPT)
                    .send(StatusMode::Strict)
                    .await
                    .map(|payload| payload.text())
            })
            .await
            .map_err(|e| e.context("VİOP board"))?;

        let (contracts, report) = parse_board(&html);
        if contracts.is_empty() {
            warn!("No contracts on the VİOP board");
            return Ok(contracts);
        }
        debug!(
            contracts = contracts.len(),
            skipped = report.skipped.len(),
            "Parsed VİOP board"
        );
        self.cache
            .set(key, contracts.clone(), DataKind::Derivatives);
        Ok(contracts)
    }

    async fn select(
        &self,
        kind: ContractKind,
        underlying: Option<UnderlyingClass>,
    ) -> Result<Vec<DerivativeContract>> {
        let mut contracts = self.fetch_board().await?;
        contracts.retain(|c| c.kind == kind && underlying.is_none_or(|u| c.underlying == u));
        Ok(contracts)
    }
}

impl DataProvider for ViopProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn description(&self) -> &str {
        "VİOP futures and options board, delayed by about 15 minutes"
    }
}

#[async_trait]
impl DerivativesProvider for ViopProvider {
    #[instrument(skip(self))]
    async fn fetch_futures(
        &self,
        underlying: Option<UnderlyingClass>,
    ) -> Result<Vec<DerivativeContract>> {
        self.select(ContractKind::Future, underlying).await
    }

    /// Options exist for stock and index underlyings only.
    #[instrument(skip(self))]
    async fn fetch_options(
        &self,
        underlying: Option<UnderlyingClass>,
    ) -> Result<Vec<DerivativeContract>> {
        self.select(ContractKind::Option, underlying).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use borsa_cache::MemoryCache;
    use borsa_core::{DataError, ManualClock, Symbol};
    use chrono::{TimeZone, Utc};
    use mockito::{Server, ServerGuard};
    use std::time::Duration;

    const BOARD: &str = include_str!("../testdata/board.html");

    fn provider(server: &ServerGuard) -> ViopProvider {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap(),
        ));
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let retry = RetryPolicy {
            max_attempts: 2,
            backoff_step: Duration::from_millis(1),
        };
        let ctx = ProviderContext::new(cache).with_clock(clock).with_retry(retry);
        ViopProvider::new(&ctx).unwrap().with_base_url(server.url())
    }

    #[tokio::test]
    async fn test_board_is_fetched_once_and_filtered() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", BOARD_PATH)
            .with_body(BOARD)
            .expect(1)
            .create_async()
            .await;

        let provider = provider(&server);
        assert_eq!(provider.fetch_futures(None).await.unwrap().len(), 3);
        let currency = provider
            .fetch_futures(Some(UnderlyingClass::Currency))
            .await
            .unwrap();
        assert_eq!(currency.len(), 1);
        assert_eq!(currency[0].code, "F_USDTRY0226");

        assert_eq!(provider.fetch_options(None).await.unwrap().len(), 2);
        assert!(
            provider
                .fetch_options(Some(UnderlyingClass::Currency))
                .await
                .unwrap()
                .is_empty()
        );

        let akbnk = provider
            .fetch_contracts_for(&Symbol::new("akbnk"))
            .await
            .unwrap();
        assert_eq!(akbnk.len(), 1);
        assert_eq!(akbnk[0].price, Some(68.45));
        let xu030 = provider
            .fetch_contracts_for(&Symbol::new("XU030"))
            .await
            .unwrap();
        assert!(xu030.iter().all(|c| c.kind == ContractKind::Option));
        assert_eq!(xu030.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_board_failures_are_retried_then_reported() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", BOARD_PATH)
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let err = provider(&server).fetch_futures(None).await.unwrap_err();
        assert!(matches!(err, DataError::Upstream { status: Some(503), .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_board_is_not_cached() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", BOARD_PATH)
            .with_body("<html><body>Bakım çalışması</body></html>")
            .expect(2)
            .create_async()
            .await;

        let provider = provider(&server);
        assert!(provider.fetch_board().await.unwrap().is_empty());
        assert!(provider.fetch_board().await.unwrap().is_empty());
        mock.assert_async().await;
    }
}
