//! Shared HTTP transport policy.
//!
//! Every provider talks to its upstream through an [`HttpTransport`]: one
//! `reqwest` client per provider with browser-like default headers, a cookie
//! store and a fixed timeout. Status handling is chosen per call with
//! [`StatusMode`], and transient failures can be retried with [`RetryPolicy`].

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue, RETRY_AFTER};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{DataError, Result};

/// Desktop browser user agent. Several upstreams reject unknown clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Default `Accept` header.
pub const DEFAULT_ACCEPT: &str = "application/json, text/plain, */*";

/// Default `Accept-Language` header.
pub const DEFAULT_ACCEPT_LANGUAGE: &str = "tr-TR,tr;q=0.9,en-US;q=0.8,en;q=0.7";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for session warm-up requests.
const SESSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Client settings shared by all providers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportConfig {
    /// `User-Agent` header.
    pub user_agent: String,
    /// `Accept` header.
    pub accept: String,
    /// `Accept-Language` header.
    pub accept_language: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            accept: DEFAULT_ACCEPT.to_string(),
            accept_language: DEFAULT_ACCEPT_LANGUAGE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Overrides the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Overrides the `Accept` header.
    #[must_use]
    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = accept.into();
        self
    }

    /// Overrides the `Accept-Language` header.
    #[must_use]
    pub fn with_accept_language(mut self, accept_language: impl Into<String>) -> Self {
        self.accept_language = accept_language.into();
        self
    }

    /// Overrides the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// How a response status is judged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StatusMode {
    /// Non-2xx responses are errors.
    #[default]
    Strict,
    /// Any non-empty body is usable, whatever the status.
    Lenient,
}

/// HTTP client bound to one provider.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    provider: &'static str,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a client from `config` with the cookie store enabled.
    pub fn new(provider: &'static str, config: &TransportConfig) -> Result<Self> {
        let header = |name: &str, value: &str| {
            HeaderValue::from_str(value)
                .map_err(|e| DataError::InvalidParameter(format!("{name} header: {e}")))
        };

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, header("Accept", &config.accept)?);
        headers.insert(
            ACCEPT_LANGUAGE,
            header("Accept-Language", &config.accept_language)?,
        );

        let client = reqwest::Client::builder()
            .user_agent(header("User-Agent", &config.user_agent)?)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                DataError::upstream(provider, format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { provider, client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(provider: &'static str, client: reqwest::Client) -> Self {
        Self { provider, client }
    }

    /// Name of the provider this transport belongs to.
    #[must_use]
    pub const fn provider(&self) -> &'static str {
        self.provider
    }

    /// Starts a GET request.
    pub fn get(&self, url: &str) -> Request {
        self.request(self.client.get(url), url)
    }

    /// Starts a POST request.
    pub fn post(&self, url: &str) -> Request {
        self.request(self.client.post(url), url)
    }

    fn request(&self, builder: reqwest::RequestBuilder, url: &str) -> Request {
        Request {
            provider: self.provider,
            url: url.to_string(),
            builder,
        }
    }

    /// Visits a page so the cookie store picks up session cookies.
    ///
    /// Failures are logged and ignored; the real request reports its own error.
    pub async fn establish_session(&self, url: &str) {
        match self.client.get(url).timeout(SESSION_TIMEOUT).send().await {
            Ok(response) => debug!(
                provider = self.provider,
                url,
                status = response.status().as_u16(),
                "Session established"
            ),
            Err(e) => warn!(provider = self.provider, url, error = %e, "Session warm-up failed"),
        }
    }
}

/// A request being assembled. Consumed by [`Request::send`].
#[derive(Debug)]
pub struct Request {
    provider: &'static str,
    url: String,
    builder: reqwest::RequestBuilder,
}

impl Request {
    /// Appends query parameters.
    #[must_use]
    pub fn query<T: Serialize + ?Sized>(mut self, query: &T) -> Self {
        self.builder = self.builder.query(query);
        self
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Overrides the client timeout for this request.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.builder = self.builder.timeout(timeout);
        self
    }

    /// Sends `body` as JSON.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.builder = self.builder.json(body);
        self
    }

    /// Sends a raw body.
    #[must_use]
    pub fn body(mut self, body: impl Into<reqwest::Body>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sends the request and applies the status policy.
    pub async fn send(self, mode: StatusMode) -> Result<Payload> {
        let Self {
            provider,
            url,
            builder,
        } = self;
        debug!(provider, url = %url, ?mode, "Sending request");

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(provider, &url, &e))?;
        let status = response.status();

        if mode == StatusMode::Strict && !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => DataError::RateLimited {
                    provider: provider.to_string(),
                    retry_after: response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .map(Duration::from_secs),
                },
                StatusCode::UNAUTHORIZED => DataError::AuthenticationFailed(provider.to_string()),
                _ => DataError::Upstream {
                    provider: provider.to_string(),
                    message: format!("HTTP {status} for {url}"),
                    status: Some(status.as_u16()),
                },
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(provider, &url, &e))?
            .to_vec();

        if mode == StatusMode::Lenient && body.is_empty() {
            return Err(DataError::Upstream {
                provider: provider.to_string(),
                message: format!("empty response (HTTP {status}) for {url}"),
                status: Some(status.as_u16()),
            });
        }

        Ok(Payload {
            status: status.as_u16(),
            url,
            body,
        })
    }
}

fn transport_error(provider: &str, url: &str, e: &reqwest::Error) -> DataError {
    let message = if e.is_timeout() {
        format!("request to {url} timed out")
    } else {
        format!("request to {url} failed: {e}")
    };
    DataError::Upstream {
        provider: provider.to_string(),
        message,
        status: e.status().map(|s| s.as_u16()),
    }
}

/// A received response body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payload {
    /// HTTP status code.
    pub status: u16,
    url: String,
    body: Vec<u8>,
}

impl Payload {
    /// Body decoded as UTF-8, with invalid sequences replaced.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| DataError::Parse(format!("invalid JSON from {}: {e}", self.url)))
    }

    /// Raw body bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// URL the payload was fetched from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the status was 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Bounded retry with linear backoff for transient failures.
///
/// Attempt `k` that fails transiently is followed by a wait of `k * backoff_step`.
/// Errors that are not [transient](DataError::is_transient) surface immediately.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit.
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_step: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff_step: Duration::ZERO,
        }
    }

    /// Wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient failure, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
