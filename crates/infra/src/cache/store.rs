//! Day-keyed artifact storage.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use genflow_ai::NormalizedArtifact;
use genflow_core::OwnerId;

/// One owner's artifact for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub owner: OwnerId,
    pub generated_date: NaiveDate,
    pub payload: NormalizedArtifact,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("daily cache read failed: {0}")]
    Read(String),

    #[error("daily cache write failed: {0}")]
    Write(String),

    #[error("daily cache invalidation failed: {0}")]
    Invalidate(String),
}

/// At most one record per `(owner, generated_date)`.
#[async_trait::async_trait]
pub trait DailyCacheStore: Send + Sync {
    async fn get(&self, owner: OwnerId, day: NaiveDate) -> Result<Option<CacheRecord>, CacheError>;

    /// Insert or replace the record for its `(owner, generated_date)`.
    async fn upsert(&self, record: CacheRecord) -> Result<(), CacheError>;

    /// Returns whether a record was removed.
    async fn delete(&self, owner: OwnerId, day: NaiveDate) -> Result<bool, CacheError>;
}

#[async_trait::async_trait]
impl<S> DailyCacheStore for Arc<S>
where
    S: DailyCacheStore + ?Sized,
{
    async fn get(&self, owner: OwnerId, day: NaiveDate) -> Result<Option<CacheRecord>, CacheError> {
        (**self).get(owner, day).await
    }

    async fn upsert(&self, record: CacheRecord) -> Result<(), CacheError> {
        (**self).upsert(record).await
    }

    async fn delete(&self, owner: OwnerId, day: NaiveDate) -> Result<bool, CacheError> {
        (**self).delete(owner, day).await
    }
}

/// In-memory daily cache for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDailyCacheStore {
    records: RwLock<HashMap<(OwnerId, NaiveDate), CacheRecord>>,
}

impl InMemoryDailyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl DailyCacheStore for InMemoryDailyCacheStore {
    async fn get(&self, owner: OwnerId, day: NaiveDate) -> Result<Option<CacheRecord>, CacheError> {
        let records = self
            .records
            .read()
            .map_err(|_| CacheError::Read("lock poisoned".to_string()))?;
        Ok(records.get(&(owner, day)).cloned())
    }

    async fn upsert(&self, record: CacheRecord) -> Result<(), CacheError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| CacheError::Write("lock poisoned".to_string()))?;
        records.insert((record.owner, record.generated_date), record);
        Ok(())
    }

    async fn delete(&self, owner: OwnerId, day: NaiveDate) -> Result<bool, CacheError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| CacheError::Invalidate("lock poisoned".to_string()))?;
        Ok(records.remove(&(owner, day)).is_some())
    }
}
