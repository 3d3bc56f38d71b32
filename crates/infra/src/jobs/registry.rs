//! Live trackers keyed by job id.

use std::collections::HashMap;

use genflow_core::{JobId, OwnerId};

use super::tracker::TrackerHandle;

/// Holds the live trackers of one process.
///
/// Each tracker owns its own subscription and timer; nothing is shared across
/// job ids. An owner scope (a screen, a user) has at most one live tracker:
/// inserting a new one for the same owner cancels the previous one.
#[derive(Debug, Default)]
pub struct TrackerRegistry {
    trackers: HashMap<JobId, TrackerHandle>,
    scopes: HashMap<OwnerId, JobId>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `owner`, superseding that owner's previous tracker.
    ///
    /// Returns the job id of the superseded tracker, if any.
    pub fn insert(&mut self, owner: OwnerId, handle: TrackerHandle) -> Option<JobId> {
        let job_id = handle.job_id();
        // A job belongs to one owner scope at a time.
        self.scopes.retain(|_, tracked| *tracked != job_id);
        let superseded = self
            .scopes
            .insert(owner, job_id)
            .filter(|previous| *previous != job_id);

        if let Some(previous) = superseded {
            if let Some(mut old) = self.trackers.remove(&previous) {
                old.cancel();
                tracing::debug!(
                    %owner,
                    superseded = %previous,
                    job_id = %job_id,
                    "tracker superseded"
                );
            }
        }

        if let Some(mut replaced) = self.trackers.insert(job_id, handle) {
            replaced.cancel();
        }
        superseded
    }

    pub fn get_mut(&mut self, job_id: &JobId) -> Option<&mut TrackerHandle> {
        self.trackers.get_mut(job_id)
    }

    /// Current tracker of `owner`, if any.
    pub fn for_owner(&mut self, owner: &OwnerId) -> Option<&mut TrackerHandle> {
        let job_id = self.scopes.get(owner)?;
        self.trackers.get_mut(job_id)
    }

    /// Take a tracker out without cancelling it.
    pub fn remove(&mut self, job_id: &JobId) -> Option<TrackerHandle> {
        self.scopes.retain(|_, tracked| tracked != job_id);
        self.trackers.remove(job_id)
    }

    /// Cancel and forget one tracker. Returns whether it existed.
    pub fn cancel(&mut self, job_id: &JobId) -> bool {
        match self.remove(job_id) {
            Some(mut handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel everything, e.g. on sign-out.
    pub fn cancel_all(&mut self) {
        for (_, mut handle) in self.trackers.drain() {
            handle.cancel();
        }
        self.scopes.clear();
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        self.trackers.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::jobs::store::{InMemoryJobStore, JobStore};
    use crate::jobs::tracker::{JobTracker, TrackerConfig, TrackerPhase};
    use crate::jobs::types::{Job, JobKind};
    use genflow_core::GenerationParams;

    async fn setup() -> (Arc<InMemoryJobStore>, JobTracker) {
        let store = InMemoryJobStore::arc();
        let tracker = JobTracker::new(store.clone(), store.channel(), TrackerConfig::default());
        (store, tracker)
    }

    async fn new_job(store: &InMemoryJobStore, owner: OwnerId) -> Job {
        store
            .create(Job::new(owner, JobKind::DailyIdeas, GenerationParams::new("Ideas", "TikTok")))
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn new_tracker_for_same_owner_supersedes_previous() {
        let (store, tracker) = setup().await;
        let channel = store.channel();
        let owner = OwnerId::new();
        let mut registry = TrackerRegistry::new();

        let first = new_job(&store, owner).await;
        let second = new_job(&store, owner).await;

        assert_eq!(registry.insert(owner, tracker.track(first.id)), None);
        assert_eq!(registry.insert(owner, tracker.track(second.id)), Some(first.id));

        assert!(!registry.contains(&first.id));
        assert_eq!(channel.subscriber_count(&first.id), 0);
        assert_eq!(channel.subscriber_count(&second.id), 1);
        assert_eq!(
            registry.for_owner(&owner).map(|h| h.job_id()),
            Some(second.id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn different_owners_track_independently() {
        let (store, tracker) = setup().await;
        let channel = store.channel();
        let mut registry = TrackerRegistry::new();

        let a = new_job(&store, OwnerId::new()).await;
        let b = new_job(&store, OwnerId::new()).await;
        registry.insert(a.owner, tracker.track(a.id));
        registry.insert(b.owner, tracker.track(b.id));
        assert_eq!(registry.len(), 2);

        assert!(registry.cancel(&a.id));
        assert_eq!(channel.subscriber_count(&a.id), 0);
        assert_eq!(channel.subscriber_count(&b.id), 1);
        assert_eq!(
            registry.get_mut(&b.id).map(|h| h.phase()),
            Some(TrackerPhase::WaitingForEvent)
        );

        registry.cancel_all();
        assert!(registry.is_empty());
        assert_eq!(channel.active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reregistering_a_job_moves_it_to_the_new_owner() {
        let (store, tracker) = setup().await;
        let mut registry = TrackerRegistry::new();
        let first_owner = OwnerId::new();
        let second_owner = OwnerId::new();
        let job = new_job(&store, first_owner).await;

        registry.insert(first_owner, tracker.track(job.id));
        assert_eq!(registry.insert(second_owner, tracker.track(job.id)), None);

        assert!(registry.for_owner(&first_owner).is_none());
        assert_eq!(
            registry.for_owner(&second_owner).map(|h| h.job_id()),
            Some(job.id)
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(store.channel().subscriber_count(&job.id), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_tracker_keeps_running() {
        let (store, tracker) = setup().await;
        let mut registry = TrackerRegistry::new();
        let job = new_job(&store, OwnerId::new()).await;
        registry.insert(job.owner, tracker.track(job.id));

        let mut handle = registry.remove(&job.id).unwrap();
        assert!(registry.for_owner(&job.owner).is_none());

        store
            .apply(job.id, |j| j.mark_completed(serde_json::json!({"hooks": ["ok"]})))
            .unwrap();
        assert!(handle.resolved().await.job().is_some());
    }
}
