//! Dual-channel job status tracking.
//!
//! A tracker waits for a job to reach a terminal status through two channels:
//!
//! - **Push**: a subscription scoped to the job id, fed by the job store
//! - **Poll**: exactly one direct read of the row when the deadline fires
//!
//! Both race inside a single `tokio::select!`, so whichever settles first is
//! the outcome and the other branch is dropped with it. The push channel is
//! best-effort; the deadline read is the safety net, not a polling loop.
//!
//! ```text
//! WaitingForEvent ──push──▶ ResolvedViaPush
//!        │
//!        └─deadline─▶ TimedOut ──read: terminal──▶ ResolvedViaPoll
//!                         └──read: not terminal──▶ (stays TimedOut)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use genflow_core::JobId;
use genflow_events::{Subscription, UnsubscribeGuard};

use super::store::{JobEvents, JobStore};
use super::types::Job;

/// Tracker timing configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// When the safety-net read happens.
    pub deadline: Duration,
    /// Time the cosmetic progress ramp takes to approach its ceiling.
    pub progress_window: Duration,
    /// Highest progress reported before resolution, in percent.
    pub progress_ceiling: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(60),
            progress_window: Duration::from_secs(60),
            progress_ceiling: 95.0,
        }
    }
}

impl TrackerConfig {
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_progress_window(mut self, window: Duration) -> Self {
        self.progress_window = window;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerPhase {
    WaitingForEvent,
    ResolvedViaPush,
    /// Deadline passed; the safety-net read is in flight or found nothing terminal.
    TimedOut,
    ResolvedViaPoll,
    Cancelled,
}

impl TrackerPhase {
    /// A terminal row was observed (either channel).
    pub fn is_resolved(&self) -> bool {
        matches!(self, TrackerPhase::ResolvedViaPush | TrackerPhase::ResolvedViaPoll)
    }
}

/// No terminal status by the safety-net read.
#[derive(Debug, Clone, thiserror::Error)]
#[error("job {job_id} still not terminal after {waited:?}")]
pub struct TimeoutError {
    pub job_id: JobId,
    pub waited: Duration,
    /// Row as read at the deadline, if the read succeeded.
    pub last_seen: Option<Job>,
}

/// How a tracker settled.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Terminal row delivered by the push channel.
    Push(Job),
    /// Terminal row found by the deadline read.
    Poll(Job),
    TimedOut(TimeoutError),
    Cancelled,
}

impl Resolution {
    /// The terminal row, when one was observed.
    pub fn job(&self) -> Option<&Job> {
        match self {
            Resolution::Push(job) | Resolution::Poll(job) => Some(job),
            Resolution::TimedOut(_) | Resolution::Cancelled => None,
        }
    }

    pub fn into_job(self) -> Result<Job, Option<TimeoutError>> {
        match self {
            Resolution::Push(job) | Resolution::Poll(job) => Ok(job),
            Resolution::TimedOut(err) => Err(Some(err)),
            Resolution::Cancelled => Err(None),
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        match self {
            Resolution::Push(_) => TrackerPhase::ResolvedViaPush,
            Resolution::Poll(_) => TrackerPhase::ResolvedViaPoll,
            Resolution::TimedOut(_) => TrackerPhase::TimedOut,
            Resolution::Cancelled => TrackerPhase::Cancelled,
        }
    }
}

/// Arms per-job trackers against a store and its push channel.
#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    events: Arc<dyn JobEvents>,
    config: TrackerConfig,
}

impl std::fmt::Debug for JobTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobTracker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JobTracker {
    pub fn new(
        store: Arc<dyn JobStore>,
        events: Arc<dyn JobEvents>,
        config: TrackerConfig,
    ) -> Self {
        Self {
            store,
            events,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Start tracking `job_id`.
    ///
    /// The subscription is registered before this returns, so anything
    /// published afterwards is observed. Must be called inside a tokio runtime.
    pub fn track(&self, job_id: JobId) -> TrackerHandle {
        let subscription = self.events.subscribe(job_id);
        let unsubscribe = subscription.guard();
        let cancel = CancellationToken::new();
        let started = Instant::now();
        let (phase_tx, phase_rx) = watch::channel(TrackerPhase::WaitingForEvent);

        debug!(%job_id, deadline_ms = self.config.deadline.as_millis() as u64, "tracker armed");

        let task = tokio::spawn(run_tracker(
            job_id,
            subscription,
            Arc::clone(&self.store),
            started + self.config.deadline,
            self.config.deadline,
            cancel.clone(),
            phase_tx,
        ));

        TrackerHandle {
            job_id,
            task: Some(task),
            outcome: None,
            cancel,
            unsubscribe: Some(unsubscribe),
            phase: phase_rx,
            started,
            progress_window: self.config.progress_window,
            progress_ceiling: self.config.progress_ceiling,
        }
    }
}

enum Race {
    Cancelled,
    Pushed(Job),
    Deadline,
}

async fn run_tracker(
    job_id: JobId,
    mut subscription: Subscription<Job>,
    store: Arc<dyn JobStore>,
    deadline_at: Instant,
    deadline: Duration,
    cancel: CancellationToken,
    phase: watch::Sender<TrackerPhase>,
) -> Resolution {
    let race = tokio::select! {
        biased;
        _ = cancel.cancelled() => Race::Cancelled,
        job = wait_for_terminal(&mut subscription) => Race::Pushed(job),
        _ = tokio::time::sleep_until(deadline_at) => Race::Deadline,
    };
    drop(subscription);

    let resolution = match race {
        Race::Cancelled => Resolution::Cancelled,
        Race::Pushed(job) => {
            info!(%job_id, status = %job.status, "job resolved via push");
            Resolution::Push(job)
        }
        Race::Deadline => {
            phase.send_replace(TrackerPhase::TimedOut);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Resolution::Cancelled,
                read = store.get(job_id) => match read {
                    Ok(Some(job)) if job.is_terminal() => {
                        info!(%job_id, status = %job.status, "job resolved via deadline read");
                        Resolution::Poll(job)
                    }
                    Ok(last_seen) => {
                        let status = last_seen.as_ref().map(|j| j.status);
                        warn!(%job_id, ?status, "job not terminal at deadline");
                        Resolution::TimedOut(TimeoutError {
                            job_id,
                            waited: deadline,
                            last_seen,
                        })
                    }
                    Err(err) => {
                        warn!(%job_id, error = %err, "deadline read failed");
                        Resolution::TimedOut(TimeoutError {
                            job_id,
                            waited: deadline,
                            last_seen: None,
                        })
                    }
                },
            }
        }
    };

    phase.send_replace(resolution.phase());
    resolution
}

/// Resolves on the first terminal row pushed for this job.
///
/// Non-terminal updates are skipped. A closed channel never resolves, leaving
/// the deadline read to settle the race.
async fn wait_for_terminal(subscription: &mut Subscription<Job>) -> Job {
    loop {
        match subscription.recv().await {
            Some(job) if job.is_terminal() => return job,
            Some(job) => debug!(job_id = %job.id, status = %job.status, "non-terminal job update"),
            None => {
                debug!("push channel closed; waiting for deadline read");
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Owner-side handle of one running tracker.
///
/// Dropping the handle (or calling [`cancel`](Self::cancel)) unsubscribes from
/// the push channel synchronously and clears the deadline timer.
#[derive(Debug)]
pub struct TrackerHandle {
    job_id: JobId,
    task: Option<JoinHandle<Resolution>>,
    outcome: Option<Resolution>,
    cancel: CancellationToken,
    unsubscribe: Option<UnsubscribeGuard>,
    phase: watch::Receiver<TrackerPhase>,
    started: Instant,
    progress_window: Duration,
    progress_ceiling: f32,
}

impl TrackerHandle {
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Wait for the tracker to settle.
    ///
    /// Cancel-safe: dropping the returned future early leaves the tracker
    /// running, and a later call picks up where it left off.
    pub async fn resolved(&mut self) -> &Resolution {
        if self.outcome.is_none() {
            let resolution = match self.task.as_mut() {
                Some(task) => match task.await {
                    Ok(resolution) => resolution,
                    Err(err) if err.is_cancelled() => Resolution::Cancelled,
                    Err(err) => {
                        warn!(job_id = %self.job_id, error = %err, "tracker task failed");
                        Resolution::Cancelled
                    }
                },
                None => Resolution::Cancelled,
            };
            self.task = None;
            self.unsubscribe = None;
            self.outcome = Some(resolution);
        }
        self.outcome.get_or_insert(Resolution::Cancelled)
    }

    /// Outcome if already observed through [`resolved`](Self::resolved).
    pub fn outcome(&self) -> Option<&Resolution> {
        self.outcome.as_ref()
    }

    pub fn phase(&self) -> TrackerPhase {
        match &self.outcome {
            Some(resolution) => resolution.phase(),
            None => *self.phase.borrow(),
        }
    }

    /// Receiver for phase changes, e.g. to drive a status line.
    pub fn watch_phase(&self) -> watch::Receiver<TrackerPhase> {
        self.phase.clone()
    }

    /// Cosmetic progress in percent.
    ///
    /// Eases out from 0 toward the ceiling over the progress window and is
    /// exactly 100 only once a terminal row has been observed.
    pub fn progress(&self) -> f32 {
        if self.phase().is_resolved() {
            return 100.0;
        }
        let window = self.progress_window.as_secs_f32();
        if window <= 0.0 {
            return self.progress_ceiling;
        }
        let t = (self.started.elapsed().as_secs_f32() / window).clamp(0.0, 1.0);
        self.progress_ceiling * (1.0 - (1.0 - t) * (1.0 - t))
    }

    /// Stop tracking now: unsubscribe, clear the timer, settle as cancelled.
    pub fn cancel(&mut self) {
        self.teardown();
        if self.outcome.is_none() {
            self.outcome = Some(Resolution::Cancelled);
        }
        debug!(job_id = %self.job_id, "tracker cancelled");
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some() || self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    fn teardown(&mut self) {
        self.cancel.cancel();
        self.unsubscribe = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for TrackerHandle {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::jobs::store::{InMemoryJobStore, JobStoreError};
    use crate::jobs::types::{JobKind, JobStatus};
    use genflow_core::{GenerationParams, OwnerId};
    use genflow_events::InMemoryPushChannel;

    /// Counts direct reads so tests can assert the push path never polls.
    struct CountingStore {
        inner: Arc<InMemoryJobStore>,
        reads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl JobStore for CountingStore {
        async fn create(&self, job: Job) -> Result<Job, JobStoreError> {
            self.inner.create(job).await
        }

        async fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get(job_id).await
        }

        async fn update(&self, job: Job) -> Result<Job, JobStoreError> {
            self.inner.update(job).await
        }
    }

    struct Fixture {
        inner: Arc<InMemoryJobStore>,
        counting: Arc<CountingStore>,
        channel: Arc<InMemoryPushChannel<JobId, Job>>,
        tracker: JobTracker,
    }

    fn fixture() -> Fixture {
        let inner = InMemoryJobStore::arc();
        let channel = inner.channel();
        let counting = Arc::new(CountingStore {
            inner: Arc::clone(&inner),
            reads: AtomicUsize::new(0),
        });
        let tracker = JobTracker::new(
            counting.clone(),
            channel.clone(),
            TrackerConfig::default(),
        );
        Fixture {
            inner,
            counting,
            channel,
            tracker,
        }
    }

    async fn pending_job(store: &InMemoryJobStore) -> Job {
        store
            .create(Job::new(
                OwnerId::new(),
                JobKind::ContentScript,
                GenerationParams::new("Sourdough", "YouTube"),
            ))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_push_before_deadline_needs_no_read() {
        let fx = fixture();
        let job = pending_job(&fx.inner).await;
        let mut handle = fx.tracker.track(job.id);

        tokio::time::sleep(Duration::from_secs(5)).await;
        fx.inner.apply(job.id, |j| j.mark_running()).unwrap();
        fx.inner
            .apply(job.id, |j| j.mark_completed(json!({"hooks": ["hi"]})))
            .unwrap();

        let resolution = handle.resolved().await.clone();
        assert!(matches!(resolution, Resolution::Push(ref j) if j.status == JobStatus::Completed));
        assert_eq!(handle.phase(), TrackerPhase::ResolvedViaPush);
        assert_eq!(handle.progress(), 100.0);
        assert_eq!(fx.counting.reads.load(Ordering::SeqCst), 0);
        assert_eq!(fx.channel.subscriber_count(&job.id), 0);

        // Well past the deadline: still no read.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.counting.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_read_resolves_terminal_row() {
        let inner = InMemoryJobStore::arc();
        // Separate channel: the store's own notifications never reach the tracker.
        let silent: Arc<InMemoryPushChannel<JobId, Job>> = Arc::new(InMemoryPushChannel::new());
        let counting = Arc::new(CountingStore {
            inner: Arc::clone(&inner),
            reads: AtomicUsize::new(0),
        });
        let tracker = JobTracker::new(counting.clone(), silent.clone(), TrackerConfig::default());

        let job = pending_job(&inner).await;
        let mut handle = tracker.track(job.id);
        inner
            .apply(job.id, |j| j.mark_completed(json!({"hooks": ["polled"]})))
            .unwrap();

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(counting.reads.load(Ordering::SeqCst), 0);
        assert_eq!(handle.phase(), TrackerPhase::WaitingForEvent);
        assert!(handle.progress() < 95.0);

        let resolution = handle.resolved().await.clone();
        assert!(matches!(resolution, Resolution::Poll(ref j) if j.status == JobStatus::Completed));
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.phase(), TrackerPhase::ResolvedViaPoll);
        assert_eq!(silent.subscriber_count(&job.id), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_read_of_pending_row_times_out_with_last_seen() {
        let inner = InMemoryJobStore::arc();
        let silent: Arc<InMemoryPushChannel<JobId, Job>> = Arc::new(InMemoryPushChannel::new());
        let counting = Arc::new(CountingStore {
            inner: Arc::clone(&inner),
            reads: AtomicUsize::new(0),
        });
        let tracker = JobTracker::new(counting.clone(), silent, TrackerConfig::default());

        let job = pending_job(&inner).await;
        let mut handle = tracker.track(job.id);

        match handle.resolved().await {
            Resolution::TimedOut(err) => {
                assert_eq!(err.job_id, job.id);
                assert_eq!(err.waited, Duration::from_secs(60));
                assert_eq!(err.last_seen.as_ref().map(|j| j.status), Some(JobStatus::Pending));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);
        assert_eq!(handle.phase(), TrackerPhase::TimedOut);
        assert!(handle.progress() < 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn non_terminal_pushes_keep_waiting() {
        let fx = fixture();
        let job = pending_job(&fx.inner).await;
        let mut handle = fx.tracker.track(job.id);

        fx.inner.apply(job.id, |j| j.mark_running()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.phase(), TrackerPhase::WaitingForEvent);

        fx.inner.apply(job.id, |j| j.mark_failed("model overloaded")).unwrap();
        let resolution = handle.resolved().await;
        assert!(matches!(resolution, Resolution::Push(j) if j.status == JobStatus::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unsubscribes_synchronously_and_skips_the_read() {
        let fx = fixture();
        let job = pending_job(&fx.inner).await;
        let mut handle = fx.tracker.track(job.id);
        assert_eq!(fx.channel.subscriber_count(&job.id), 1);

        handle.cancel();
        assert_eq!(fx.channel.subscriber_count(&job.id), 0);
        assert!(matches!(handle.resolved().await, Resolution::Cancelled));

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.counting.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_tears_down() {
        let fx = fixture();
        let job = pending_job(&fx.inner).await;
        let handle = fx.tracker.track(job.id);
        drop(handle);
        assert_eq!(fx.channel.subscriber_count(&job.id), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fx.counting.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn progress_ramps_monotonically_below_ceiling() {
        let fx = fixture();
        let job = pending_job(&fx.inner).await;
        let handle = fx.tracker.track(job.id);

        let mut last = handle.progress();
        assert_eq!(last, 0.0);
        for _ in 0..12 {
            tokio::time::advance(Duration::from_secs(4)).await;
            let now = handle.progress();
            assert!(now >= last);
            assert!(now <= 95.0);
            last = now;
        }
        assert!(last > 50.0);
    }
}
