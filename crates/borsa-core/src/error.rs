//! Error types for data operations.
//!
//! This module defines [`DataError`] which covers all error cases that can occur
//! when fetching, parsing, or caching Turkish market data.

use thiserror::Error;

/// Errors that can occur during data operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    /// Transport-level failure: timeout, connection error or an unexpected status code.
    #[error("Upstream error from {provider}: {message}")]
    Upstream {
        /// The provider whose upstream failed.
        provider: String,
        /// What went wrong, including the request context.
        message: String,
        /// HTTP status code when the upstream answered at all.
        status: Option<u16>,
    },

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The upstream confirmed that the requested symbol does not exist.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The symbol exists but the requested data is empty or unparseable for this window.
    #[error("Data not available for {symbol}: {detail}")]
    DataNotAvailable {
        /// The symbol that was requested.
        symbol: String,
        /// Which data was missing.
        detail: String,
    },

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The requested provider is not configured.
    #[error("Provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Authentication failed for a provider.
    #[error("Authentication failed for provider {0}")]
    AuthenticationFailed(String),

    /// The requested feature is not supported.
    #[error("Feature not supported: {0}")]
    NotSupported(String),

    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl DataError {
    /// Builds an [`DataError::Upstream`] without a status code.
    pub fn upstream(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider: provider.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Builds a [`DataError::DataNotAvailable`].
    pub fn unavailable(symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DataNotAvailable {
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }

    /// Returns true for failures worth retrying: transport errors, server errors
    /// and rate limits. A 4xx answer other than 408 is definitive.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Upstream {
                status: Some(400..=407 | 409..=499),
                ..
            } => false,
            Self::Upstream { .. } | Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Prefixes the message of an upstream error with call-site context such as the symbol.
    ///
    /// Other variants already carry their own context and are returned unchanged.
    #[must_use]
    pub fn context(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::Upstream {
                provider,
                message,
                status,
            } => Self::Upstream {
                provider,
                message: format!("{context}: {message}"),
                status,
            },
            other => other,
        }
    }
}

/// Result type alias using [`DataError`].
pub type Result<T> = std::result::Result<T, DataError>;
