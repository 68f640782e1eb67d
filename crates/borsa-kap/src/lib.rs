#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/borsa-rs/borsa/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! KAP data provider.
//!
//! This crate provides a KAP data provider that implements the
//! [`DataProvider`], [`ReferenceDataProvider`], and [`DisclosureProvider`]
//! traits from `borsa-core`.
//!
//! KAP addresses companies by an internal member id (`mkkMemberOid`). The
//! ticker to member id map is scraped from the BIST companies page and kept
//! for a day, together with the company list and per-symbol details, in a
//! cache owned by the provider.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use borsa_cache::MemoryCache;
//! use borsa_core::{DisclosureProvider, ProviderContext, ReferenceDataProvider, Symbol};
//! use borsa_kap::KapProvider;
//!
//! # async fn example() -> borsa_core::Result<()> {
//! let provider = KapProvider::new(&ProviderContext::new(Arc::new(MemoryCache::new())))?;
//!
//! for company in provider.search("garanti").await? {
//!     println!("{} {}", company.ticker, company.name);
//! }
//! let disclosures = provider.fetch_disclosures(&Symbol::new("THYAO"), 10).await?;
//! # Ok(())
//! # }
//! ```

mod companies;
mod disclosures;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use borsa_cache::MemoryCache;
use borsa_core::{
    Clock, DataCache, DataKind, DataProvider, HttpTransport, ProviderContext, Result, RetryPolicy,
    StatusMode, Symbol,
};
use regex::Regex;
use tracing::{debug, instrument, warn};

/// KAP website root.
pub const KAP_URL: &str = "https://www.kap.org.tr";

/// Host of the JSON APIs and the company summary pages.
pub const KAP_API_URL: &str = "https://kap.org.tr";

const PROVIDER: &str = "KAP";

const BIST_COMPANIES_PATH: &str = "/tr/bist-sirketler";

/// Member id and ticker pairs inside the escaped Next.js payload, e.g.
/// `\"mkkMemberOid\":\"4028...\",\"kapMemberTitle\":\"...\",\"relatedMemberTitle\":\"\",\"stockCode\":\"GARAN, TGB\"`.
static MEMBER_OID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r#"\\"mkkMemberOid\\":\\"([^\\"]+)\\","#,
        r#"\\"kapMemberTitle\\":\\"[^\\"]+\\","#,
        r#"\\"relatedMemberTitle\\":\\"[^\\"]*\\","#,
        r#"\\"stockCode\\":\\"([^\\"]+)\\""#,
    ))
    .expect("static regex is valid")
});

/// Ticker to member id.
pub(crate) type MemberMap = Arc<HashMap<String, String>>;

/// KAP data provider.
///
/// Implements [`DataProvider`], [`ReferenceDataProvider`](borsa_core::ReferenceDataProvider),
/// and [`DisclosureProvider`](borsa_core::DisclosureProvider). Non-2xx responses are errors.
#[derive(Debug)]
pub struct KapProvider {
    transport: HttpTransport,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    /// Company list, member ids and company details.
    lookups: Arc<dyn DataCache>,
    base_url: String,
    api_url: String,
}

impl KapProvider {
    /// Create a provider from shared context.
    pub fn new(ctx: &ProviderContext) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(PROVIDER, &ctx.transport)?,
            clock: Arc::clone(&ctx.clock),
            retry: ctx.retry,
            lookups: Arc::new(MemoryCache::with_clock(Arc::clone(&ctx.clock))),
            base_url: KAP_URL.to_string(),
            api_url: KAP_API_URL.to_string(),
        })
    }

    /// Point the provider at a different host, for both the website and the APIs.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        self.api_url.clone_from(&base_url);
        self.base_url = base_url;
        self
    }

    /// Member id for a ticker, or `None` when KAP does not list it.
    ///
    /// The companies page is retried on transient failures; if it still cannot
    /// be read the lookup degrades to `None` and nothing is cached.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_member_id(&self, symbol: &Symbol) -> Option<String> {
        let members = self.member_map().await?;
        let member = members.get(symbol.as_str()).cloned();
        if member.is_none() {
            debug!("Symbol not listed on KAP");
        }
        member
    }

    async fn member_map(&self) -> Option<MemberMap> {
        const KEY: &str = "kap:lookup:members";
        if let Some(members) = self.lookups.get::<MemberMap>(KEY) {
            return Some(members);
        }

        let url = format!("{}{BIST_COMPANIES_PATH}", self.base_url);
        let page = self
            .retry
            .run("kap member ids", || async {
                self.transport
                    .get(&url)
                    .send(StatusMode::Strict)
                    .await
                    .map(|payload| payload.text())
            })
            .await;

        match page {
            Ok(html) => {
                let members: MemberMap = Arc::new(parse_member_map(&html));
                debug!(members = members.len(), "Fetched KAP member ids");
                self.lookups.set(KEY, Arc::clone(&members), DataKind::Lookup);
                Some(members)
            }
            Err(e) => {
                warn!(error = %e, "KAP member id lookup failed");
                None
            }
        }
    }
}

/// Builds the ticker map. A cell listing several tickers maps each of them.
pub(crate) fn parse_member_map(html: &str) -> HashMap<String, String> {
    let mut members = HashMap::new();
    for caps in MEMBER_OID.captures_iter(html) {
        for code in caps[2].split(',').map(str::trim).filter(|c| !c.is_empty()) {
            members.insert(code.to_string(), caps[1].to_string());
        }
    }
    members
}

impl DataProvider for KapProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn description(&self) -> &str {
        "KAP company registry, disclosures and expected-disclosure calendar"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use borsa_core::ManualClock;
    use chrono::{DateTime, TimeZone, Utc};
    use mockito::{Mock, ServerGuard};
    use std::time::Duration;

    pub(crate) fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 10, 9, 0, 0).unwrap()
    }

    pub(crate) fn provider(server: &ServerGuard) -> (Arc<ManualClock>, KapProvider) {
        let clock = Arc::new(ManualClock::new(now()));
        let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(1),
        };
        let ctx = ProviderContext::new(cache)
            .with_clock(clock.clone())
            .with_retry(retry);
        let provider = KapProvider::new(&ctx).unwrap().with_base_url(server.url());
        (clock, provider)
    }

    /// Escaped payload as it appears in the page source.
    pub(crate) const COMPANIES_PAGE: &str = concat!(
        r#"<script>self.__next_f.push([1,"[{\"mkkMemberOid\":\"4028e4a140f2ed720140f37a5a5e0018\","#,
        r#"\"kapMemberTitle\":\"TÜRK HAVA YOLLARI A.O.\",\"relatedMemberTitle\":\"\",\"stockCode\":\"THYAO\",\"cityName\":\"İSTANBUL\"},"#,
        r#"{\"mkkMemberOid\":\"4028e4a140f2ed720140f37a5a5e0021\","#,
        r#"\"kapMemberTitle\":\"TÜRKİYE GARANTİ BANKASI A.Ş.\",\"relatedMemberTitle\":\"\",\"stockCode\":\"GARAN, TGB\"}]"])</script>"#,
    );

    pub(crate) async fn mock_companies_page(server: &mut ServerGuard) -> Mock {
        server
            .mock("GET", BIST_COMPANIES_PATH)
            .with_body(COMPANIES_PAGE)
            .expect(1)
            .create_async()
            .await
    }
}
