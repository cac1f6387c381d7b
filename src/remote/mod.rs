// Shared plumbing for calls to hosted APIs
// Classifies ureq failures into crate errors and retries rate-limited requests

#[cfg(test)]
mod tests;

use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::{RagError, Result};

/// Which hosted dependency a request was addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteService {
    Embedding,
    Generation,
}

impl RemoteService {
    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::Embedding => "embedding",
            Self::Generation => "generation",
        }
    }

    /// Error for a failed call that was not throttling
    #[inline]
    pub fn failure(self, message: impl Into<String>) -> RagError {
        let message = message.into();
        match self {
            Self::Embedding => RagError::Service(format!("embedding service: {}", message)),
            Self::Generation => RagError::Generation(message),
        }
    }

    #[inline]
    pub fn rate_limited(self) -> RagError {
        RagError::RateLimit {
            service: self.name().to_string(),
        }
    }

    /// Map a transport or status failure onto the crate error taxonomy
    #[inline]
    pub fn classify(self, error: &ureq::Error) -> RagError {
        match error {
            ureq::Error::StatusCode(429) => self.rate_limited(),
            ureq::Error::StatusCode(status @ (401 | 403)) => {
                self.failure(format!("authentication rejected (HTTP {})", status))
            }
            ureq::Error::StatusCode(status) => self.failure(format!("HTTP {}", status)),
            ureq::Error::ConnectionFailed
            | ureq::Error::HostNotFound
            | ureq::Error::Timeout(_)
            | ureq::Error::Io(_) => self.failure(format!("transport error: {}", error)),
            _ => self.failure(error.to_string()),
        }
    }
}

/// Secret credential that never shows up in debug output
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[inline]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[inline]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Parse a service base URL so relative endpoint paths join under it
///
/// `https://gateway.example/voyage` and `https://gateway.example/voyage/`
/// both keep the `/voyage/` prefix when `v1/embeddings` is joined.
#[inline]
pub fn base_url(raw: &str) -> std::result::Result<Url, url::ParseError> {
    let mut url = Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Bounded retry applied to throttled requests only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    #[inline]
    pub fn new(max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// A policy that gives up on the first rate limit
    #[inline]
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Delay before retry number `retry` (1-based), doubling each time
    #[inline]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.backoff_base.saturating_mul(factor)
    }
}

/// Run a blocking request, retrying only while the service answers HTTP 429
pub fn call_with_retry<F>(service: RemoteService, policy: RetryPolicy, mut request_fn: F) -> Result<String>
where
    F: FnMut() -> std::result::Result<String, ureq::Error>,
{
    let mut retry = 0;

    loop {
        debug!(
            "{} request attempt {}/{}",
            service.name(),
            retry + 1,
            policy.max_retries + 1
        );

        let error = match request_fn() {
            Ok(body) => return Ok(body),
            Err(error) => service.classify(&error),
        };

        if matches!(error, RagError::RateLimit { .. }) && retry < policy.max_retries {
            retry += 1;
            let delay = policy.delay_for(retry);
            warn!(
                "{} service rate limited, retry {}/{} in {:?}",
                service.name(),
                retry,
                policy.max_retries,
                delay
            );
            std::thread::sleep(delay);
            continue;
        }

        error!("{} request failed: {}", service.name(), error);
        return Err(error);
    }
}
