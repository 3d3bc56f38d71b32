//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use genflow_core::JobId;
use genflow_events::{InMemoryPushChannel, PushChannel, Subscription};

use super::types::{Job, JobStatus, StatusRegression};

/// Row-per-job storage.
///
/// The submission client creates rows; the external workflow is the only
/// writer after that. `update` must reject backward status moves.
#[async_trait::async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job row.
    async fn create(&self, job: Job) -> Result<Job, JobStoreError>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Replace a job row, enforcing forward-only status.
    async fn update(&self, job: Job) -> Result<Job, JobStoreError>;
}

#[async_trait::async_trait]
impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    async fn create(&self, job: Job) -> Result<Job, JobStoreError> {
        (**self).create(job).await
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id).await
    }

    async fn update(&self, job: Job) -> Result<Job, JobStoreError> {
        (**self).update(job).await
    }
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {job_id}: status cannot move from {from} to {to}")]
    StatusRegression {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobStoreError {
    fn regression(job_id: JobId, err: StatusRegression) -> Self {
        Self::StatusRegression {
            job_id,
            from: err.from,
            to: err.to,
        }
    }
}

/// Per-job change notifications, as seen by a tracker.
pub trait JobEvents: Send + Sync {
    /// Subscribe to updates of one job row only.
    fn subscribe(&self, job_id: JobId) -> Subscription<Job>;
}

impl<C> JobEvents for C
where
    C: PushChannel<JobId, Job>,
{
    fn subscribe(&self, job_id: JobId) -> Subscription<Job> {
        PushChannel::subscribe(self, job_id)
    }
}

/// In-memory job store for tests/dev.
///
/// Every accepted update is published on the attached push channel, keyed by
/// job id.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    channel: Arc<InMemoryPushChannel<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_channel(Arc::new(InMemoryPushChannel::new()))
    }

    pub fn with_channel(channel: Arc<InMemoryPushChannel<JobId, Job>>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            channel,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Channel carrying row updates; hand this to a tracker.
    pub fn channel(&self) -> Arc<InMemoryPushChannel<JobId, Job>> {
        Arc::clone(&self.channel)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a workflow-side mutation to a stored row, then publish it.
    ///
    /// This is how the external process is simulated in tests and dev.
    pub fn apply<F>(&self, job_id: JobId, mutate: F) -> Result<Job, JobStoreError>
    where
        F: FnOnce(&mut Job) -> Result<(), StatusRegression>,
    {
        let updated = {
            let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
            let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
            let mut next = job.clone();
            mutate(&mut next).map_err(|err| JobStoreError::regression(job_id, err))?;
            *job = next.clone();
            next
        };
        self.notify(&updated);
        Ok(updated)
    }

    fn notify(&self, job: &Job) {
        match self.channel.publish(&job.id, job.clone()) {
            Ok(delivered) => tracing::debug!(
                job_id = %job.id,
                status = %job.status,
                delivered,
                "job update published"
            ),
            Err(err) => tracing::warn!(job_id = %job.id, error = ?err, "job update not published"),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.get(&job_id).cloned())
    }

    async fn update(&self, job: Job) -> Result<Job, JobStoreError> {
        {
            let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
            let current = jobs.get(&job.id).ok_or(JobStoreError::NotFound(job.id))?;
            if !current.status.can_advance_to(job.status) {
                return Err(JobStoreError::StatusRegression {
                    job_id: job.id,
                    from: current.status,
                    to: job.status,
                });
            }
            jobs.insert(job.id, job.clone());
        }
        self.notify(&job);
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobKind;
    use genflow_core::{GenerationParams, OwnerId};
    use serde_json::json;

    fn new_job() -> Job {
        Job::new(
            OwnerId::new(),
            JobKind::ContentScript,
            GenerationParams::new("Budget travel", "Instagram"),
        )
    }

    #[tokio::test]
    async fn create_and_get() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job()).await.unwrap();

        let fetched = store.get(job.id).await.unwrap().unwrap();
        assert_eq!(fetched, job);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert!(store.get(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_create_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        assert_eq!(
            store.create(job.clone()).await,
            Err(JobStoreError::AlreadyExists(job.id))
        );
    }

    #[tokio::test]
    async fn backward_update_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        store
            .apply(job.id, |j| j.mark_completed(json!({"hooks": ["x"]})))
            .unwrap();

        let mut stale = job.clone();
        stale.status = JobStatus::Running;
        let err = store.update(stale).await.unwrap_err();
        assert!(matches!(
            err,
            JobStoreError::StatusRegression {
                from: JobStatus::Completed,
                to: JobStatus::Running,
                ..
            }
        ));
        assert_eq!(
            store.get(job.id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );
    }

    #[tokio::test]
    async fn accepted_updates_are_pushed_to_subscribers_of_that_job() {
        let store = InMemoryJobStore::new();
        let job = store.create(new_job()).await.unwrap();
        let other = store.create(new_job()).await.unwrap();

        let channel = store.channel();
        let mut sub = JobEvents::subscribe(&channel, job.id);
        let mut other_sub = JobEvents::subscribe(&channel, other.id);

        store.apply(job.id, |j| j.mark_running()).unwrap();

        let pushed = sub.recv().await.unwrap();
        assert_eq!(pushed.id, job.id);
        assert_eq!(pushed.status, JobStatus::Running);
        assert!(other_sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let job = new_job();
        assert_eq!(store.update(job.clone()).await, Err(JobStoreError::NotFound(job.id)));
    }
}
