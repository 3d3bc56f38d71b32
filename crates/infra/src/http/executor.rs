//! Resilient request executor.
//!
//! Wraps a single HTTP call with a per-attempt timeout and exponential backoff
//! with jitter. Only transport failures, timeouts and a fixed set of transient
//! statuses are retried; any other response is handed back untouched so the
//! caller can branch on it.

use std::time::Duration;

use rand::Rng;
use reqwest::{Method, Response};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Statuses worth another attempt: request timeout, too early, rate limited,
/// and the transient 5xx family.
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[408, 425, 429, 500, 502, 503, 504];

/// Retry/timeout configuration for [`ResilientExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Hard bound on a single attempt (connect + response headers).
    pub timeout: Duration,
    /// Retries after the first attempt (0 = single attempt).
    pub max_retries: u32,
    /// Base delay; attempt `n` waits `base_delay * 2^n` before retrying.
    pub base_delay: Duration,
    /// Upper bound of the uniform random jitter added to each delay.
    pub max_jitter: Duration,
    pub retryable_statuses: Vec<u16>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            max_jitter: Duration::from_millis(250),
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_jitter(mut self, max_jitter: Duration) -> Self {
        self.max_jitter = max_jitter;
        self
    }

    /// Delay before retrying after the 0-based `attempt` failed, without jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Check if more retries are allowed after the 0-based `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

/// Description of a request, reusable across attempts.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
    pub bearer_token: Option<String>,
}

impl RequestSpec {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: Vec::new(),
            body: None,
            bearer_token: None,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post_json(body: Value) -> Self {
        Self {
            body: Some(body),
            ..Self::new(Method::POST)
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("request timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

enum AttemptFailure {
    Status(u16),
    Network(String),
    Timeout,
}

/// Timeout + retry wrapper around a shared `reqwest::Client`.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ResilientExecutor {
    client: reqwest::Client,
    config: ExecutorConfig,
}

impl ResilientExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: ExecutorConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute `spec` against `url`.
    ///
    /// Returns the response as soon as it is not retry-eligible, or the final
    /// response once the retry budget is spent on retryable statuses. Transport
    /// failures and timeouts that exhaust the budget become errors.
    pub async fn execute(&self, url: &str, spec: &RequestSpec) -> Result<Response, ExecutorError> {
        let mut attempt: u32 = 0;

        loop {
            let sent = tokio::time::timeout(self.config.timeout, self.send(url, spec)).await;
            let failure = match sent {
                Ok(Ok(response)) => {
                    let status = response.status().as_u16();
                    if !self.config.is_retryable(status) || !self.config.should_retry(attempt) {
                        debug!(url, status, attempt, "request settled");
                        return Ok(response);
                    }
                    AttemptFailure::Status(status)
                }
                Ok(Err(err)) if err.is_builder() => {
                    return Err(ExecutorError::InvalidRequest(err.to_string()));
                }
                Ok(Err(err)) => {
                    if !self.config.should_retry(attempt) {
                        return Err(ExecutorError::Network {
                            attempts: attempt + 1,
                            message: err.to_string(),
                        });
                    }
                    AttemptFailure::Network(err.to_string())
                }
                Err(_elapsed) => {
                    if !self.config.should_retry(attempt) {
                        return Err(ExecutorError::Timeout {
                            attempts: attempt + 1,
                        });
                    }
                    AttemptFailure::Timeout
                }
            };

            let delay = self.config.backoff_delay(attempt) + self.config.jitter();
            let delay_ms = delay.as_millis() as u64;
            match &failure {
                AttemptFailure::Status(status) => {
                    warn!(url, attempt, status, delay_ms, "retryable status; backing off")
                }
                AttemptFailure::Network(message) => {
                    warn!(url, attempt, error = %message, delay_ms, "network failure; backing off")
                }
                AttemptFailure::Timeout => {
                    warn!(url, attempt, delay_ms, "attempt timed out; backing off")
                }
            }

            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn send(&self, url: &str, spec: &RequestSpec) -> reqwest::Result<Response> {
        let mut request = self.client.request(spec.method.clone(), url);
        for (name, value) in &spec.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(token) = &spec.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(body) = &spec.body {
            request = request.json(body);
        }
        request.send().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let config = ExecutorConfig::default().with_base_delay(Duration::from_millis(100));

        assert_eq!(config.backoff_delay(0), Duration::from_millis(100));
        assert_eq!(config.backoff_delay(1), Duration::from_millis(200));
        assert_eq!(config.backoff_delay(2), Duration::from_millis(400));
        assert_eq!(config.backoff_delay(3), Duration::from_millis(800));
    }

    #[test]
    fn pre_jitter_delay_strictly_increases() {
        let config = ExecutorConfig::default();
        let delays: Vec<_> = (0..8).map(|a| config.backoff_delay(a)).collect();
        assert!(delays.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn huge_attempts_saturate_instead_of_overflowing() {
        let config = ExecutorConfig::default();
        assert!(config.backoff_delay(64) >= config.backoff_delay(31));
    }

    #[test]
    fn jitter_stays_within_bound() {
        let config = ExecutorConfig::default();
        for _ in 0..200 {
            assert!(config.jitter() <= Duration::from_millis(250));
        }
        let no_jitter = config.with_max_jitter(Duration::ZERO);
        assert_eq!(no_jitter.jitter(), Duration::ZERO);
    }

    #[test]
    fn retryable_set_matches_transient_statuses() {
        let config = ExecutorConfig::default();
        for status in [408, 425, 429, 500, 502, 503, 504] {
            assert!(config.is_retryable(status), "{status} should retry");
        }
        for status in [200, 400, 401, 403, 404, 422, 501] {
            assert!(!config.is_retryable(status), "{status} should not retry");
        }
    }

    #[test]
    fn should_retry_respects_max_retries() {
        let config = ExecutorConfig::default();
        assert_eq!(config.max_retries, 2);
        assert!(config.should_retry(0));
        assert!(config.should_retry(1));
        assert!(!config.should_retry(2));
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig { cases: 256, ..Default::default() })]

        #[test]
        fn backoff_is_strictly_monotonic(base_ms in 1u64..5_000, attempt in 0u32..20) {
            let config = ExecutorConfig::default().with_base_delay(Duration::from_millis(base_ms));
            proptest::prop_assert!(
                config.backoff_delay(attempt) < config.backoff_delay(attempt + 1)
            );
            proptest::prop_assert_eq!(
                config.backoff_delay(attempt),
                Duration::from_millis(base_ms) * 2u32.pow(attempt)
            );
        }
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_without_retry() {
        let executor = ResilientExecutor::new(ExecutorConfig::default());
        let err = executor
            .execute("not a url", &RequestSpec::get())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidRequest(_)));
    }
}
