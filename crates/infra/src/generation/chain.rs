//! Fallback generation chain.
//!
//! ```text
//! tier 1  Workflow        job row + trigger, resolved by the tracker
//! tier 2  DirectProvider  synchronous call with the same parameters
//! tier 3  Template        parameters only, cannot fail
//! ```
//!
//! First success wins. Everything except a failed row creation (or the owner
//! cancelling) ends in an artifact.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use genflow_ai::{template_artifact, try_normalize, NormalizedArtifact};
use genflow_core::{GenerationParams, JobId, OwnerId};

use crate::config::GenflowConfig;
use crate::http::ResilientExecutor;
use crate::jobs::{
    CreationError, JobEvents, JobKind, JobStatus, JobStore, JobTracker, Resolution,
    SubmissionClient, TrackedSubmission, TrackerHandle, TriggerOutcome, WebhookTrigger,
};

use super::provider::{ChatCompletionsProvider, GenerationProvider};
use super::sink::{ServedRecord, ServedTier, ServedTierSink};

/// What the caller of the chain can see go wrong.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Creation(#[from] CreationError),

    #[error("generation cancelled")]
    Cancelled,
}

impl GenerationError {
    /// One sentence fit for the UI.
    pub fn user_message(&self) -> &'static str {
        match self {
            GenerationError::Creation(CreationError::InvalidParams(_)) => {
                "Add a topic and a platform, then try again."
            }
            GenerationError::Creation(CreationError::Store(_)) => {
                "We couldn't start your generation. Check your connection and try again."
            }
            GenerationError::Cancelled => "Generation was cancelled.",
        }
    }
}

/// A delivered artifact and the tier that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub artifact: NormalizedArtifact,
    pub tier: ServedTier,
    /// Tier-1 job row, present whenever the row was created.
    pub job_id: Option<JobId>,
}

enum WorkflowOutcome {
    Served(NormalizedArtifact),
    Unusable(String),
    Cancelled,
}

/// Ordered tiers behind one `generate` call.
#[derive(Clone)]
pub struct FallbackChain {
    submission: SubmissionClient,
    tracker: JobTracker,
    provider: Arc<dyn GenerationProvider>,
    sink: Arc<dyn ServedTierSink>,
}

impl std::fmt::Debug for FallbackChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackChain")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

impl FallbackChain {
    pub fn new(
        submission: SubmissionClient,
        tracker: JobTracker,
        provider: Arc<dyn GenerationProvider>,
        sink: Arc<dyn ServedTierSink>,
    ) -> Self {
        Self {
            submission,
            tracker,
            provider,
            sink,
        }
    }

    /// Wire the webhook trigger and chat-completions provider from config.
    ///
    /// A missing webhook URL makes tier 1 fail fast into tier 2; a missing
    /// provider URL makes tier 2 fail fast into the template.
    pub fn from_config(
        config: &GenflowConfig,
        store: Arc<dyn JobStore>,
        events: Arc<dyn JobEvents>,
        sink: Arc<dyn ServedTierSink>,
    ) -> Self {
        let trigger_executor = ResilientExecutor::new(config.trigger_executor.clone());
        let trigger = match &config.webhook_url {
            Some(url) => WebhookTrigger::new(trigger_executor, url.clone()),
            None => WebhookTrigger::unconfigured(trigger_executor),
        };
        let provider = ChatCompletionsProvider::new(
            ResilientExecutor::new(config.executor.clone()),
            config.provider.clone(),
        );

        Self::new(
            SubmissionClient::new(Arc::clone(&store), Arc::new(trigger)),
            JobTracker::new(store, events, config.tracker.clone()),
            Arc::new(provider),
            sink,
        )
    }

    /// Produce an artifact for `params`, trying each tier in order.
    pub async fn generate(
        &self,
        owner: OwnerId,
        kind: JobKind,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<Generation, GenerationError> {
        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }

        let TrackedSubmission {
            job,
            mut tracker,
            trigger,
        } = self
            .submission
            .submit_tracked(owner, kind, params.clone(), &self.tracker)
            .await?;
        let job_id = job.id;

        match await_workflow(&mut tracker, trigger, cancel).await {
            WorkflowOutcome::Served(artifact) => {
                return Ok(self.deliver(owner, Some(job_id), artifact, ServedTier::Workflow));
            }
            WorkflowOutcome::Cancelled => {
                tracker.cancel();
                return Err(GenerationError::Cancelled);
            }
            WorkflowOutcome::Unusable(reason) => {
                tracker.cancel();
                info!(%job_id, %owner, %reason, "workflow tier unusable; trying direct provider");
            }
        }

        let direct = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GenerationError::Cancelled),
            direct = self.provider.generate(params) => direct,
        };
        match direct {
            Ok(raw) => match try_normalize(&raw) {
                Ok(artifact) => {
                    let tier = ServedTier::DirectProvider;
                    return Ok(self.deliver(owner, Some(job_id), artifact, tier));
                }
                Err(err) => warn!(%job_id, error = %err, "direct provider reply unusable"),
            },
            Err(err) => warn!(%job_id, error = %err, "direct provider failed"),
        }

        if cancel.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        Ok(self.deliver(owner, Some(job_id), template_artifact(params), ServedTier::Template))
    }

    fn deliver(
        &self,
        owner: OwnerId,
        job_id: Option<JobId>,
        artifact: NormalizedArtifact,
        tier: ServedTier,
    ) -> Generation {
        info!(
            %owner,
            job_id = ?job_id,
            %tier,
            steps = artifact.steps.len(),
            score = artifact.score,
            "artifact served"
        );
        self.sink.record(ServedRecord {
            owner,
            tier,
            job_id,
            served_at: Utc::now(),
        });
        Generation {
            artifact,
            tier,
            job_id,
        }
    }
}

/// Tier 1: race the trigger signal, the tracker and cancellation.
///
/// A failed trigger ends the tier immediately instead of waiting out the
/// tracker deadline.
async fn await_workflow(
    tracker: &mut TrackerHandle,
    mut trigger: TriggerOutcome,
    cancel: &CancellationToken,
) -> WorkflowOutcome {
    let mut trigger_settled = false;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return WorkflowOutcome::Cancelled,
            fired = &mut trigger, if !trigger_settled => {
                trigger_settled = true;
                if let Err(err) = fired {
                    return WorkflowOutcome::Unusable(format!("trigger failed: {err}"));
                }
            }
            resolution = tracker.resolved() => return judge(resolution),
        }
    }
}

fn judge(resolution: &Resolution) -> WorkflowOutcome {
    match resolution {
        Resolution::Push(job) | Resolution::Poll(job) => match job.status {
            JobStatus::Completed => match job.result.as_ref().map(try_normalize) {
                Some(Ok(artifact)) => WorkflowOutcome::Served(artifact),
                Some(Err(err)) => WorkflowOutcome::Unusable(format!("result unusable: {err}")),
                None => WorkflowOutcome::Unusable("completed without a result".to_string()),
            },
            status => WorkflowOutcome::Unusable(format!(
                "job {status}: {}",
                job.error.as_deref().unwrap_or("no error message")
            )),
        },
        Resolution::TimedOut(err) => WorkflowOutcome::Unusable(err.to_string()),
        Resolution::Cancelled => WorkflowOutcome::Unusable("tracker cancelled".to_string()),
    }
}
