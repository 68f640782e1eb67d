//! Shared resources handed to every provider.

use std::sync::Arc;

use crate::cache::DataCache;
use crate::clock::{Clock, SystemClock};
use crate::transport::{RetryPolicy, TransportConfig};

/// Cache, clock and transport settings a provider is built from.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    /// Cache shared by all providers.
    pub cache: Arc<dyn DataCache>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// HTTP client settings.
    pub transport: TransportConfig,
    /// Retry policy for discovery and metrics calls.
    pub retry: RetryPolicy,
}

impl ProviderContext {
    /// Creates a context around `cache` with the system clock and default settings.
    #[must_use]
    pub fn new(cache: Arc<dyn DataCache>) -> Self {
        Self {
            cache,
            clock: Arc::new(SystemClock),
            transport: TransportConfig::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the transport settings.
    #[must_use]
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
