//! Once-per-day generation gate.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use genflow_ai::NormalizedArtifact;

use crate::generation::GenerationError;

use super::clock::{CacheOwner, Clock};
use super::store::{CacheError, CacheRecord, DailyCacheStore};

/// Why a forced regeneration failed.
#[derive(Debug, Error)]
pub enum RegenerateError<E = GenerationError> {
    #[error("could not clear today's cached result: {0}")]
    Invalidate(#[source] CacheError),

    #[error("could not generate a fresh result: {0}")]
    Generate(#[source] E),
}

/// Serves an owner's artifact at most once per local calendar day.
///
/// The cache is an optimisation: read and write failures are logged and the
/// gate carries on as if there were no cache.
#[derive(Clone)]
pub struct DailyCacheGate {
    store: Arc<dyn DailyCacheStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for DailyCacheGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyCacheGate").finish_non_exhaustive()
    }
}

impl DailyCacheGate {
    pub fn new(store: Arc<dyn DailyCacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Today's artifact for `owner`, generating and storing it on a miss.
    ///
    /// Concurrent misses both generate; the later write wins.
    pub async fn get_or_generate<F, Fut, E>(
        &self,
        owner: &CacheOwner,
        generate: F,
    ) -> Result<NormalizedArtifact, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NormalizedArtifact, E>>,
    {
        let now = self.clock.now();
        let day = owner.local_day(now);

        match self.store.get(owner.id, day).await {
            Ok(Some(record)) => {
                debug!(owner = %owner.id, %day, "daily cache hit");
                return Ok(record.payload);
            }
            Ok(None) => debug!(owner = %owner.id, %day, "daily cache miss"),
            Err(err) => {
                warn!(owner = %owner.id, %day, error = %err, "daily cache read failed; generating")
            }
        }

        let artifact = generate().await?;

        let record = CacheRecord {
            owner: owner.id,
            generated_date: day,
            payload: artifact.clone(),
            created_at: now,
        };
        if let Err(err) = self.store.upsert(record).await {
            warn!(owner = %owner.id, %day, error = %err, "daily cache write failed");
        }

        Ok(artifact)
    }

    /// Drop today's record for `owner`. Returns whether one existed.
    pub async fn invalidate(&self, owner: &CacheOwner) -> Result<bool, CacheError> {
        let day = owner.local_day(self.clock.now());
        let removed = self.store.delete(owner.id, day).await?;
        info!(owner = %owner.id, %day, removed, "daily cache invalidated");
        Ok(removed)
    }

    /// Invalidate, then generate afresh.
    pub async fn regenerate<F, Fut, E>(
        &self,
        owner: &CacheOwner,
        generate: F,
    ) -> Result<NormalizedArtifact, RegenerateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<NormalizedArtifact, E>>,
    {
        self.invalidate(owner)
            .await
            .map_err(RegenerateError::Invalidate)?;
        self.get_or_generate(owner, generate)
            .await
            .map_err(RegenerateError::Generate)
    }
}
