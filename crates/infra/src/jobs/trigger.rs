//! External workflow trigger.

use thiserror::Error;

use crate::http::{ExecutorError, RequestSpec, ResilientExecutor};

use super::types::Job;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("workflow trigger rejected with HTTP {0}")]
    Status(u16),

    #[error("workflow trigger transport failure: {0}")]
    Transport(#[from] ExecutorError),

    #[error("no workflow trigger configured")]
    NotConfigured,

    #[error("trigger task ended without reporting")]
    Abandoned,
}

/// Starts the external workflow for a freshly created job.
///
/// Implementations only signal whether the workflow accepted the job; results
/// travel back through the job row.
#[async_trait::async_trait]
pub trait JobTrigger: Send + Sync {
    async fn fire(&self, job: &Job) -> Result<(), TriggerError>;
}

/// POSTs `{jobId, kind, ...parameters}` to a webhook through the executor.
#[derive(Debug, Clone)]
pub struct WebhookTrigger {
    executor: ResilientExecutor,
    url: Option<String>,
    bearer_token: Option<String>,
}

impl WebhookTrigger {
    pub fn new(executor: ResilientExecutor, url: impl Into<String>) -> Self {
        Self {
            executor,
            url: Some(url.into()),
            bearer_token: None,
        }
    }

    /// A trigger that always reports [`TriggerError::NotConfigured`].
    pub fn unconfigured(executor: ResilientExecutor) -> Self {
        Self {
            executor,
            url: None,
            bearer_token: None,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }
}

#[async_trait::async_trait]
impl JobTrigger for WebhookTrigger {
    async fn fire(&self, job: &Job) -> Result<(), TriggerError> {
        let url = self.url.as_deref().ok_or(TriggerError::NotConfigured)?;

        let mut spec = RequestSpec::post_json(job.trigger_payload());
        if let Some(token) = &self.bearer_token {
            spec = spec.with_bearer(token.clone());
        }

        // Only the status matters; the body is dropped unread.
        let response = self.executor.execute(url, &spec).await?;
        let status = response.status();
        drop(response);

        if status.is_success() {
            tracing::debug!(job_id = %job.id, status = status.as_u16(), "workflow accepted job");
            Ok(())
        } else {
            Err(TriggerError::Status(status.as_u16()))
        }
    }
}
