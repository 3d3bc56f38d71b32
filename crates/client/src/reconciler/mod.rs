//! Optimistic local state.
//!
//! Every mutation lands in the local collection before its network call
//! starts. When the call fails the collection is put back: a failed create
//! drops its temporary entry, a failed update re-fetches from the remote, and
//! a failed delete re-inserts the row where it was. A re-fetch never
//! overwrites an id with an update in flight, or one whose write the remote
//! confirmed after the listing started.
//!
//! The collection sits behind a `std::sync::Mutex` that is only ever locked
//! between awaits, never across one.

mod error;
mod record;

pub use error::ReconcileError;
pub use record::{Record, RecordRemote, RemoteError};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// Prefix of ids assigned to records the remote has not confirmed yet.
pub const TEMP_ID_PREFIX: &str = "temp-";

pub fn is_temp_id(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

struct State<T> {
    entries: Vec<T>,
    pending_creates: HashSet<String>,
    pending_deletes: HashSet<String>,
    /// In-flight update count per id.
    pending_updates: HashMap<String, usize>,
    /// Bumped on every write the remote confirms.
    epoch: u64,
    /// Epoch of the last confirmed write per id, kept while a fetch is running.
    confirmed_at: HashMap<String, u64>,
    fetches: usize,
}

impl<T: Record> State<T> {
    fn new(entries: Vec<T>) -> Self {
        Self {
            entries,
            pending_creates: HashSet::new(),
            pending_deletes: HashSet::new(),
            pending_updates: HashMap::new(),
            epoch: 0,
            confirmed_at: HashMap::new(),
            fetches: 0,
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id() == id)
    }

    fn start_update(&mut self, id: &str) {
        *self.pending_updates.entry(id.to_string()).or_default() += 1;
    }

    fn finish_update(&mut self, id: &str) {
        if let Some(count) = self.pending_updates.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                self.pending_updates.remove(id);
            }
        }
    }

    fn record_confirmed(&mut self, id: &str) {
        self.epoch += 1;
        if self.fetches > 0 {
            self.confirmed_at.insert(id.to_string(), self.epoch);
        }
    }

    /// Returns the epoch a listing started at.
    fn start_fetch(&mut self) -> u64 {
        self.fetches += 1;
        self.epoch
    }

    fn finish_fetch(&mut self) {
        self.fetches = self.fetches.saturating_sub(1);
        if self.fetches == 0 {
            self.confirmed_at.clear();
        }
    }

    /// The local copy of `id` is newer than a listing started at `issued_at`.
    fn local_is_newer(&self, id: &str, issued_at: u64) -> bool {
        self.pending_updates.contains_key(id)
            || self.confirmed_at.get(id).is_some_and(|at| *at > issued_at)
    }

    /// Swap confirmed entries for `rows`, a listing started at `issued_at`.
    ///
    /// Temporary entries of in-flight creates survive, rows with a delete in
    /// flight stay hidden, and ids written locally since the listing started
    /// keep their local state, present or absent.
    fn merge_confirmed(&mut self, rows: Vec<T>, issued_at: u64) {
        let mut local: Vec<T> = std::mem::take(&mut self.entries);
        let mut merged = Vec::with_capacity(rows.len() + self.pending_creates.len());

        for row in rows {
            if self.pending_deletes.contains(row.id()) {
                continue;
            }
            if !self.local_is_newer(row.id(), issued_at) {
                merged.push(row);
                continue;
            }
            if let Some(index) = local.iter().position(|entry| entry.id() == row.id()) {
                merged.push(local.remove(index));
            }
        }
        // Confirmed after the listing started, so absent from it.
        local.retain(|entry| {
            self.pending_creates.contains(entry.id())
                || (self.local_is_newer(entry.id(), issued_at)
                    && !merged.iter().any(|row: &T| row.id() == entry.id()))
        });
        merged.extend(local);
        self.entries = merged;
    }

    /// Put the authoritative row where the temporary one was.
    fn confirm_create(&mut self, temp_id: &str, saved: T) {
        match (self.position(saved.id()), self.position(temp_id)) {
            // A re-fetch already brought the row in.
            (Some(existing), Some(temp)) => {
                self.entries[existing] = saved;
                self.entries.remove(temp);
            }
            (Some(existing), None) => self.entries[existing] = saved,
            (None, Some(temp)) => self.entries[temp] = saved,
            (None, None) => self.entries.push(saved),
        }
    }
}

struct Inner<T, R> {
    state: Mutex<State<T>>,
    remote: R,
}

impl<T: Record, R: RecordRemote<T>> Inner<T, R> {
    fn state(&self) -> MutexGuard<'_, State<T>> {
        // Critical sections cannot panic halfway, so a poisoned lock still
        // guards a consistent collection.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// List the remote and merge the rows. Returns the resulting length.
    async fn fetch(&self) -> Result<usize, RemoteError> {
        let issued_at = self.state().start_fetch();
        let listed = self.remote.list().await;

        let mut state = self.state();
        let merged = listed.map(|rows| {
            state.merge_confirmed(rows, issued_at);
            state.entries.len()
        });
        state.finish_fetch();
        merged
    }

    async fn refetch(&self) {
        if let Err(err) = self.fetch().await {
            warn!(error = %err, "re-fetch after failed update also failed");
        }
    }
}

/// A mutation whose network call is still running.
#[derive(Debug)]
pub struct PendingMutation<O> {
    /// The record the mutation targets; for creates, the temporary id.
    pub id: String,
    pub handle: JoinHandle<Result<O, ReconcileError>>,
}

impl<O> PendingMutation<O> {
    /// Wait for the remote to answer. The local collection is already
    /// reconciled when this returns.
    pub async fn settled(self) -> Result<O, ReconcileError> {
        self.handle
            .await
            .unwrap_or_else(|_| Err(ReconcileError::Abandoned))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Local collection of `T` kept in step with a remote `R`.
///
/// Cheap to clone; clones share the collection.
pub struct Reconciler<T, R> {
    inner: Arc<Inner<T, R>>,
}

impl<T, R> Clone for Reconciler<T, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Record, R: RecordRemote<T>> std::fmt::Debug for Reconciler<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T, R> Reconciler<T, R>
where
    T: Record,
    R: RecordRemote<T>,
{
    pub fn new(remote: R) -> Self {
        Self::with_entries(remote, Vec::new())
    }

    pub fn with_entries(remote: R, entries: Vec<T>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(entries)),
                remote,
            }),
        }
    }

    /// Seed the collection from the remote. Returns the resulting length.
    pub async fn load(&self) -> Result<usize, ReconcileError> {
        self.inner.fetch().await.map_err(ReconcileError::Load)
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.inner.state().entries.clone()
    }

    pub fn get(&self, id: &str) -> Option<T> {
        let state = self.inner.state();
        state.position(id).map(|index| state.entries[index].clone())
    }

    pub fn len(&self) -> usize {
        self.inner.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `item` under a temporary id and save it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create(&self, mut item: T) -> PendingMutation<T> {
        let temp_id = format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4());
        item.set_id(temp_id.clone());
        {
            let mut state = self.inner.state();
            state.entries.push(item.clone());
            state.pending_creates.insert(temp_id.clone());
        }
        debug!(temp_id = %temp_id, "optimistic create");

        let inner = Arc::clone(&self.inner);
        let id = temp_id.clone();
        let handle = tokio::spawn(async move {
            let result = inner.remote.create(item).await;

            let mut state = inner.state();
            state.pending_creates.remove(&id);
            match result {
                Ok(saved) => {
                    debug!(temp_id = %id, id = saved.id(), "create confirmed");
                    state.record_confirmed(saved.id());
                    state.confirm_create(&id, saved.clone());
                    Ok(saved)
                }
                Err(source) => {
                    state.entries.retain(|entry| entry.id() != id);
                    warn!(temp_id = %id, error = %source, "create rejected; entry removed");
                    Err(ReconcileError::CreateFailed { temp_id: id, source })
                }
            }
        });

        PendingMutation {
            id: temp_id,
            handle,
        }
    }

    /// Apply `patch` locally now and remotely in the background.
    pub fn update(&self, id: &str, patch: T::Patch) -> Result<PendingMutation<T>, ReconcileError> {
        {
            let mut state = self.inner.state();
            let index = Self::confirmed_position(&state, id)?;
            state.entries[index].apply(&patch);
            state.start_update(id);
        }
        debug!(id, "optimistic update");

        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        let target = id.clone();
        let handle = tokio::spawn(async move {
            let result = inner.remote.update(&id, patch).await;
            let result = {
                let mut state = inner.state();
                state.finish_update(&id);
                if let Ok(saved) = &result {
                    state.record_confirmed(&id);
                    if let Some(index) = state.position(&id) {
                        state.entries[index] = saved.clone();
                    }
                }
                result
            };
            match result {
                Ok(saved) => Ok(saved),
                Err(source) => {
                    // With no update left in flight, the re-fetch restores
                    // this id from the remote.
                    warn!(id = %id, error = %source, "update rejected; re-fetching");
                    inner.refetch().await;
                    Err(ReconcileError::UpdateFailed { id, source })
                }
            }
        });

        Ok(PendingMutation { id: target, handle })
    }

    /// Remove the record locally now and remotely in the background.
    pub fn delete(&self, id: &str) -> Result<PendingMutation<()>, ReconcileError> {
        let (index, removed) = {
            let mut state = self.inner.state();
            let index = Self::confirmed_position(&state, id)?;
            let removed = state.entries.remove(index);
            state.pending_deletes.insert(id.to_string());
            (index, removed)
        };
        debug!(id, index, "optimistic delete");

        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        let target = id.clone();
        let handle = tokio::spawn(async move {
            let result = inner.remote.delete(&id).await;

            let mut state = inner.state();
            state.pending_deletes.remove(&id);
            match result {
                Ok(()) => {
                    state.record_confirmed(&id);
                    Ok(())
                }
                Err(source) => {
                    if state.position(&id).is_none() {
                        let at = index.min(state.entries.len());
                        state.entries.insert(at, removed);
                    }
                    warn!(id = %id, error = %source, "delete rejected; entry restored");
                    Err(ReconcileError::DeleteFailed { id, source })
                }
            }
        });

        Ok(PendingMutation { id: target, handle })
    }

    fn confirmed_position(state: &State<T>, id: &str) -> Result<usize, ReconcileError> {
        if state.pending_creates.contains(id) {
            return Err(ReconcileError::Unconfirmed(id.to_string()));
        }
        state
            .position(id)
            .ok_or_else(|| ReconcileError::NotFound(id.to_string()))
    }
}
