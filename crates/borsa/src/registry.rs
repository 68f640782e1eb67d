//! Provider registry with lazily built providers and price fallback.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use borsa_cache::MemoryCache;
use borsa_core::{
    DataError, HistoryRequest, PriceDataProvider, PriceHistory, ProviderContext, Quote,
    QuoteProvider, Result, Symbol,
};
use tracing::{debug, instrument, warn};

#[cfg(feature = "hedeffiyat")]
use borsa_hedeffiyat::HedefFiyatProvider;
#[cfg(feature = "isyatirim")]
use borsa_isyatirim::IsYatirimProvider;
#[cfg(feature = "kap")]
use borsa_kap::KapProvider;
#[cfg(feature = "paratic")]
use borsa_paratic::ParaticProvider;
#[cfg(feature = "viop")]
use borsa_viop::ViopProvider;

static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();

/// One lazily built provider.
#[derive(Debug)]
struct Slot<P>(RwLock<Option<Arc<P>>>);

impl<P> Default for Slot<P> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<P> Slot<P> {
    /// Returns the provider, building it on first access.
    ///
    /// `build` runs outside the lock. When two callers race, the first insert
    /// wins and both get that instance.
    fn get_or_try_init(&self, build: impl FnOnce() -> Result<P>) -> Result<Arc<P>> {
        if let Some(provider) = self.0.read().unwrap_or_else(PoisonError::into_inner).as_ref() {
            return Ok(Arc::clone(provider));
        }

        let built = Arc::new(build()?);
        let mut slot = self.0.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(slot.get_or_insert(built)))
    }

    fn set(&self, provider: P) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(provider));
    }

    fn clear(&self) {
        self.0.write().unwrap_or_else(PoisonError::into_inner).take();
    }
}

/// Registry holding one instance of each provider.
///
/// Providers are built from the shared [`ProviderContext`] the first time they
/// are requested and then kept for the registry's lifetime, so they share one
/// cache and keep their discovery caches warm.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use borsa::{MemoryCache, ProviderContext, ProviderRegistry, Symbol};
///
/// # async fn example() -> borsa::Result<()> {
/// let registry = ProviderRegistry::new(ProviderContext::new(Arc::new(MemoryCache::new())));
/// let quote = registry.fetch_quote(&Symbol::new("GARAN")).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ProviderRegistry {
    context: ProviderContext,
    #[cfg(feature = "paratic")]
    paratic: Slot<ParaticProvider>,
    #[cfg(feature = "isyatirim")]
    isyatirim: Slot<IsYatirimProvider>,
    #[cfg(feature = "kap")]
    kap: Slot<KapProvider>,
    #[cfg(feature = "hedeffiyat")]
    hedeffiyat: Slot<HedefFiyatProvider>,
    #[cfg(feature = "viop")]
    viop: Slot<ViopProvider>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(ProviderContext::new(Arc::new(MemoryCache::new())))
    }
}

impl ProviderRegistry {
    /// Create an empty registry. Nothing is built until first use.
    #[must_use]
    pub fn new(context: ProviderContext) -> Self {
        Self {
            context,
            #[cfg(feature = "paratic")]
            paratic: Slot::default(),
            #[cfg(feature = "isyatirim")]
            isyatirim: Slot::default(),
            #[cfg(feature = "kap")]
            kap: Slot::default(),
            #[cfg(feature = "hedeffiyat")]
            hedeffiyat: Slot::default(),
            #[cfg(feature = "viop")]
            viop: Slot::default(),
        }
    }

    /// Process-wide registry backed by a [`MemoryCache`] and the system clock.
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::default)
    }

    /// Shared context providers are built from.
    #[must_use]
    pub const fn context(&self) -> &ProviderContext {
        &self.context
    }

    /// Drops every provider and clears the shared cache.
    ///
    /// Intended for test isolation. The next access builds fresh providers.
    pub fn reset(&self) {
        #[cfg(feature = "paratic")]
        self.paratic.clear();
        #[cfg(feature = "isyatirim")]
        self.isyatirim.clear();
        #[cfg(feature = "kap")]
        self.kap.clear();
        #[cfg(feature = "hedeffiyat")]
        self.hedeffiyat.clear();
        #[cfg(feature = "viop")]
        self.viop.clear();
        self.context.cache.clear();
        debug!("Registry reset");
    }

    /// Paratic provider.
    #[cfg(feature = "paratic")]
    pub fn paratic(&self) -> Result<Arc<ParaticProvider>> {
        self.paratic
            .get_or_try_init(|| ParaticProvider::new(&self.context))
    }

    /// Install a preconfigured Paratic provider.
    #[cfg(feature = "paratic")]
    #[must_use]
    pub fn with_paratic(self, provider: ParaticProvider) -> Self {
        self.paratic.set(provider);
        self
    }

    /// İş Yatırım provider.
    #[cfg(feature = "isyatirim")]
    pub fn isyatirim(&self) -> Result<Arc<IsYatirimProvider>> {
        self.isyatirim
            .get_or_try_init(|| IsYatirimProvider::new(&self.context))
    }

    /// Install a preconfigured İş Yatırım provider.
    #[cfg(feature = "isyatirim")]
    #[must_use]
    pub fn with_isyatirim(self, provider: IsYatirimProvider) -> Self {
        self.isyatirim.set(provider);
        self
    }

    /// KAP provider.
    #[cfg(feature = "kap")]
    pub fn kap(&self) -> Result<Arc<KapProvider>> {
        self.kap.get_or_try_init(|| KapProvider::new(&self.context))
    }

    /// Install a preconfigured KAP provider.
    #[cfg(feature = "kap")]
    #[must_use]
    pub fn with_kap(self, provider: KapProvider) -> Self {
        self.kap.set(provider);
        self
    }

    /// HedefFiyat provider.
    #[cfg(feature = "hedeffiyat")]
    pub fn hedeffiyat(&self) -> Result<Arc<HedefFiyatProvider>> {
        self.hedeffiyat
            .get_or_try_init(|| HedefFiyatProvider::new(&self.context))
    }

    /// Install a preconfigured HedefFiyat provider.
    #[cfg(feature = "hedeffiyat")]
    #[must_use]
    pub fn with_hedeffiyat(self, provider: HedefFiyatProvider) -> Self {
        self.hedeffiyat.set(provider);
        self
    }

    /// VİOP provider.
    #[cfg(feature = "viop")]
    pub fn viop(&self) -> Result<Arc<ViopProvider>> {
        self.viop.get_or_try_init(|| ViopProvider::new(&self.context))
    }

    /// Install a preconfigured VİOP provider.
    #[cfg(feature = "viop")]
    #[must_use]
    pub fn with_viop(self, provider: ViopProvider) -> Self {
        self.viop.set(provider);
        self
    }

    /// Quote providers in fallback order.
    #[allow(unused_mut)]
    fn quote_providers(&self) -> Vec<Result<Arc<dyn QuoteProvider>>> {
        let mut providers: Vec<Result<Arc<dyn QuoteProvider>>> = Vec::new();
        #[cfg(feature = "isyatirim")]
        providers.push(self.isyatirim().map(|p| p as Arc<dyn QuoteProvider>));
        #[cfg(feature = "paratic")]
        providers.push(self.paratic().map(|p| p as Arc<dyn QuoteProvider>));
        providers
    }

    /// Price history providers in fallback order.
    #[allow(unused_mut)]
    fn price_providers(&self) -> Vec<Result<Arc<dyn PriceDataProvider>>> {
        let mut providers: Vec<Result<Arc<dyn PriceDataProvider>>> = Vec::new();
        #[cfg(feature = "paratic")]
        providers.push(self.paratic().map(|p| p as Arc<dyn PriceDataProvider>));
        #[cfg(feature = "isyatirim")]
        providers.push(self.isyatirim().map(|p| p as Arc<dyn PriceDataProvider>));
        providers
    }

    /// Fetch a quote, trying İş Yatırım then Paratic.
    ///
    /// Returns the last provider's error when every provider fails.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote> {
        let mut last_error = None;
        for provider in self.quote_providers() {
            let provider = match provider {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(error = %e, "Could not build quote provider");
                    last_error = Some(e);
                    continue;
                }
            };
            debug!(provider = provider.name(), "Fetching quote");

            match provider.fetch_quote(symbol).await {
                Ok(quote) => return Ok(quote),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DataError::ProviderNotConfigured("No quote providers enabled".to_string())
        }))
    }

    /// Fetch price history, trying Paratic then İş Yatırım.
    ///
    /// Returns the last provider's error when every provider fails.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_history(
        &self,
        symbol: &Symbol,
        request: &HistoryRequest,
    ) -> Result<PriceHistory> {
        let mut last_error = None;
        for provider in self.price_providers() {
            let provider = match provider {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(error = %e, "Could not build price provider");
                    last_error = Some(e);
                    continue;
                }
            };
            debug!(provider = provider.name(), "Fetching history");

            match provider.fetch_history(symbol, request).await {
                Ok(history) => return Ok(history),
                Err(e) => {
                    warn!(
                        provider = provider.name(),
                        error = %e,
                        "Provider failed, trying next"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DataError::ProviderNotConfigured("No price providers enabled".to_string())
        }))
    }
}
