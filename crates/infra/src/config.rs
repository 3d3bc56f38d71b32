//! Runtime configuration.
//!
//! Defaults are usable as-is; `from_env` overlays deployment settings.

use std::time::Duration;

use crate::generation::ProviderConfig;
use crate::http::ExecutorConfig;
use crate::jobs::TrackerConfig;

pub const ENV_WEBHOOK_URL: &str = "GENFLOW_WEBHOOK_URL";
pub const ENV_PROVIDER_URL: &str = "GENFLOW_PROVIDER_URL";
pub const ENV_PROVIDER_API_KEY: &str = "GENFLOW_PROVIDER_API_KEY";
pub const ENV_PROVIDER_MODEL: &str = "GENFLOW_PROVIDER_MODEL";
pub const ENV_TRACKER_DEADLINE_SECS: &str = "GENFLOW_TRACKER_DEADLINE_SECS";

#[derive(Debug, Clone)]
pub struct GenflowConfig {
    /// General outbound calls (secondary provider).
    pub executor: ExecutorConfig,
    /// Workflow trigger calls; shorter timeout.
    pub trigger_executor: ExecutorConfig,
    pub tracker: TrackerConfig,
    pub webhook_url: Option<String>,
    pub provider: ProviderConfig,
}

impl Default for GenflowConfig {
    fn default() -> Self {
        Self {
            executor: ExecutorConfig::default(),
            trigger_executor: ExecutorConfig::default().with_timeout(Duration::from_secs(15)),
            tracker: TrackerConfig::default(),
            webhook_url: None,
            provider: ProviderConfig {
                model: ProviderConfig::DEFAULT_MODEL.to_string(),
                ..ProviderConfig::default()
            },
        }
    }
}

impl GenflowConfig {
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_trigger_executor(mut self, executor: ExecutorConfig) -> Self {
        self.trigger_executor = executor;
        self
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_webhook_url(mut self, url: impl Into<String>) -> Self {
        self.webhook_url = Some(url.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    /// Defaults overlaid with `GENFLOW_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(url) = get(ENV_WEBHOOK_URL) {
            self.webhook_url = Some(url);
        }
        if let Some(url) = get(ENV_PROVIDER_URL) {
            self.provider.url = Some(url);
        }
        if let Some(key) = get(ENV_PROVIDER_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = get(ENV_PROVIDER_MODEL) {
            self.provider.model = model;
        }
        if let Some(raw) = get(ENV_TRACKER_DEADLINE_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => self.tracker.deadline = Duration::from_secs(secs),
                _ => tracing::warn!(
                    key = ENV_TRACKER_DEADLINE_SECS,
                    value = %raw,
                    "ignoring invalid tracker deadline"
                ),
            }
        }
        self
    }
}
