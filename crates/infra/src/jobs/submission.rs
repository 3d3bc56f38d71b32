//! Job submission: create the row, then fire the workflow trigger.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, warn};

use genflow_core::{DomainError, GenerationParams, OwnerId};

use super::store::{JobStore, JobStoreError};
use super::tracker::{JobTracker, TrackerHandle};
use super::trigger::{JobTrigger, TriggerError};
use super::types::{Job, JobKind};

/// The job row could not be created; nothing was triggered.
#[derive(Debug, Error)]
pub enum CreationError {
    #[error("invalid generation parameters: {0}")]
    InvalidParams(#[from] DomainError),

    #[error("job row could not be created: {0}")]
    Store(#[from] JobStoreError),
}

/// Success/failure signal of a detached trigger task.
///
/// Awaiting it never blocks the trigger itself; dropping it leaves the
/// trigger running to completion.
#[derive(Debug)]
pub struct TriggerOutcome {
    receiver: oneshot::Receiver<Result<(), TriggerError>>,
}

impl TriggerOutcome {
    /// Outcome that is already settled, e.g. for a trigger that was never sent.
    pub fn settled(result: Result<(), TriggerError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { receiver: rx }
    }
}

impl Future for TriggerOutcome {
    type Output = Result<(), TriggerError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TriggerError::Abandoned)))
    }
}

/// Created job plus its in-flight trigger.
#[derive(Debug)]
pub struct SubmittedJob {
    pub job: Job,
    pub trigger: TriggerOutcome,
}

/// Created job with a tracker armed before the trigger fired.
#[derive(Debug)]
pub struct TrackedSubmission {
    pub job: Job,
    pub tracker: TrackerHandle,
    pub trigger: TriggerOutcome,
}

/// Creates job rows and fires the external workflow for them.
#[derive(Clone)]
pub struct SubmissionClient {
    store: Arc<dyn JobStore>,
    trigger: Arc<dyn JobTrigger>,
}

impl std::fmt::Debug for SubmissionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionClient").finish_non_exhaustive()
    }
}

impl SubmissionClient {
    pub fn new(store: Arc<dyn JobStore>, trigger: Arc<dyn JobTrigger>) -> Self {
        Self { store, trigger }
    }

    /// Insert a pending job row.
    pub async fn create_job(
        &self,
        owner: OwnerId,
        kind: JobKind,
        params: GenerationParams,
    ) -> Result<Job, CreationError> {
        params.validate()?;
        let job = self.store.create(Job::new(owner, kind, params)).await?;
        info!(job_id = %job.id, %owner, kind = %job.kind, "job created");
        Ok(job)
    }

    /// Fire the trigger for `job` on a detached task.
    pub fn fire(&self, job: &Job) -> TriggerOutcome {
        let (tx, rx) = oneshot::channel();
        let trigger = Arc::clone(&self.trigger);
        let job = job.clone();

        tokio::spawn(async move {
            let result = trigger.fire(&job).await;
            if let Err(err) = &result {
                warn!(job_id = %job.id, error = %err, "workflow trigger failed");
            }
            // Nobody listening is fine.
            let _ = tx.send(result);
        });

        TriggerOutcome { receiver: rx }
    }

    /// Create the row, then fire the trigger.
    pub async fn submit(
        &self,
        owner: OwnerId,
        kind: JobKind,
        params: GenerationParams,
    ) -> Result<SubmittedJob, CreationError> {
        let job = self.create_job(owner, kind, params).await?;
        let trigger = self.fire(&job);
        Ok(SubmittedJob { job, trigger })
    }

    /// Create the row, arm `tracker` on it, then fire the trigger.
    ///
    /// Arming first means a workflow that finishes immediately is still
    /// observed on the push channel.
    pub async fn submit_tracked(
        &self,
        owner: OwnerId,
        kind: JobKind,
        params: GenerationParams,
        tracker: &JobTracker,
    ) -> Result<TrackedSubmission, CreationError> {
        let job = self.create_job(owner, kind, params).await?;
        let handle = tracker.track(job.id);
        let trigger = self.fire(&job);
        Ok(TrackedSubmission {
            job,
            tracker: handle,
            trigger,
        })
    }
}
