//! Public client surface + builder.
//! Internals are split into `transport` (the network seam) and `constants` (UA + defaults).

mod constants;
mod transport;

pub use transport::{HttpTransport, RawResponse, Transport};

use crate::core::PollError;
use crate::core::dedup::RequestDeduplicator;
use crate::core::net::Fetched;
use constants::{DEFAULT_BASE_URL, DEFAULT_DEDUP_LINGER, DEFAULT_VOLATILE_PARAMS, USER_AGENT};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Default per-fetch timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves endpoint paths against a base URL and fetches them through a
/// shared [`RequestDeduplicator`].
///
/// Cloning is cheap; clones share the same dedup cache, so callers outside a
/// scheduler collapse onto the scheduler's own requests.
#[derive(Debug, Clone)]
pub struct PollClient {
    base_url: Url,
    dedup: Arc<RequestDeduplicator>,
}

impl Default for PollClient {
    fn default() -> Self {
        Self::builder().build().expect("default client")
    }
}

impl PollClient {
    /// Create a new builder.
    pub fn builder() -> PollClientBuilder {
        PollClientBuilder::default()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn dedup(&self) -> &RequestDeduplicator {
        &self.dedup
    }

    /// Resolve `path` against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, PollError> {
        Ok(self.base_url.join(path)?)
    }

    /// Fetch `path` as JSON through the shared dedup cache.
    ///
    /// # Errors
    ///
    /// Returns `Url` if the path does not resolve, `Http`/`Status`/`Timeout` on
    /// transport failure and `Decode` if the body is not JSON.
    #[tracing::instrument(skip(self), err)]
    pub async fn fetch_json(&self, path: &str) -> Result<Fetched, PollError> {
        let url = self.resolve(path)?;
        self.dedup.fetch_json(&url).await
    }
}

/* ----------------------- Builder ----------------------- */

#[derive(Default)]
pub struct PollClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
    timeout: Option<Option<Duration>>,
    connect_timeout: Option<Duration>,
    dedup_linger: Option<Duration>,
    volatile_params: Option<Vec<String>>,
    transport: Option<Arc<dyn Transport>>,
}

impl PollClientBuilder {
    /// Base URL every endpoint path is resolved against (e.g. `https://api.example.com/api/`).
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Override the User-Agent of the default HTTP transport.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Per-fetch timeout, enforced for any transport. Default: 30s.
    pub fn timeout(mut self, dur: Duration) -> Self {
        self.timeout = Some(Some(dur));
        self
    }

    /// Disable the per-fetch timeout; a stuck request then stalls its pass.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = Some(None);
        self
    }

    /// Set a connect timeout on the default HTTP transport. Default: none.
    pub fn connect_timeout(mut self, dur: Duration) -> Self {
        self.connect_timeout = Some(dur);
        self
    }

    /// How long a settled request keeps absorbing duplicate calls. Default: 1s.
    pub fn dedup_linger(mut self, dur: Duration) -> Self {
        self.dedup_linger = Some(dur);
        self
    }

    /// Query parameters ignored when deduplicating (replaces). Default: `_cb`, `_`.
    pub fn volatile_params<I, S>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volatile_params = Some(params.into_iter().map(Into::into).collect());
        self
    }

    /// Replace the HTTP transport (handy for tests and embedding).
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<PollClient, PollError> {
        let base_url = self.base_url.unwrap_or(Url::parse(DEFAULT_BASE_URL)?);

        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => {
                let mut httpb = reqwest::Client::builder()
                    .user_agent(self.user_agent.as_deref().unwrap_or(USER_AGENT));
                if let Some(ct) = self.connect_timeout {
                    httpb = httpb.connect_timeout(ct);
                }
                Arc::new(HttpTransport::new(httpb.build()?))
            }
        };

        let volatile = self.volatile_params.unwrap_or_else(|| {
            DEFAULT_VOLATILE_PARAMS
                .iter()
                .map(|s| (*s).to_string())
                .collect()
        });

        let dedup = RequestDeduplicator::new(
            transport,
            volatile,
            self.dedup_linger.unwrap_or(DEFAULT_DEDUP_LINGER),
            self.timeout.unwrap_or(Some(DEFAULT_TIMEOUT)),
        );

        Ok(PollClient {
            base_url,
            dedup: Arc::new(dedup),
        })
    }
}
