use crate::infrastructure::BackoffPolicy;
use crate::types::{
    DEFAULT_API_URL, DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_BASE,
    LinkError, Result,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Tunables for [`ApiClient`](super::ApiClient). Durations are in milliseconds; `None`
/// means default.
#[derive(Debug, Clone, Default)]
pub struct ApiClientOptions {
    /// Base address every relative path is appended to. Default: `http://localhost:8000`
    pub base_url: Option<String>,
    /// Per-call timeout. Default: 30000
    pub timeout: Option<u64>,
    /// Transient-failure retries per call, not counting the first try. Default: 3
    pub max_retries: Option<u32>,
    /// Retry `n` (1-based) waits `retry_base * 2^n`. Default: 1000
    pub retry_base: Option<u64>,
    /// Ceiling on a single retry delay. Default: uncapped
    pub retry_max_delay: Option<u64>,
}

impl ApiClientOptions {
    pub(crate) fn base_url(&self) -> Result<Url> {
        let raw = self.base_url.as_deref().unwrap_or(DEFAULT_API_URL);
        if raw.trim().is_empty() {
            return Err(LinkError::config("api base url is required"));
        }

        let url = Url::parse(raw)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LinkError::config(format!(
                "api base url must use http:// or https://, got {}://",
                url.scheme()
            )));
        }
        Ok(url)
    }

    pub(crate) fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
    }

    pub(crate) fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub(crate) fn retry_policy(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.retry_base.unwrap_or(DEFAULT_RETRY_BASE)),
            self.retry_max_delay.map(Duration::from_millis),
            self.max_retries(),
        )
    }

    pub(crate) fn validate(&self) -> Result<()> {
        self.base_url()?;
        for (name, value) in [
            ("timeout", self.timeout),
            ("retry_base", self.retry_base),
            ("retry_max_delay", self.retry_max_delay),
        ] {
            if value == Some(0) {
                return Err(LinkError::config(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }
}

/// Per-call extras. Every retry of the call reuses them unchanged.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Override the client-wide timeout for this call only
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Abandon the call, including any pending renewal or retry, once `token` fires
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}
