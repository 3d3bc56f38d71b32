//! Served-tier recording.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use genflow_core::{JobId, OwnerId};

/// Which fallback tier produced a delivered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServedTier {
    Workflow,
    DirectProvider,
    Template,
}

impl ServedTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedTier::Workflow => "workflow",
            ServedTier::DirectProvider => "direct_provider",
            ServedTier::Template => "template",
        }
    }
}

impl std::fmt::Display for ServedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServedRecord {
    pub owner: OwnerId,
    pub tier: ServedTier,
    /// Job row created for tier 1, even when a later tier served.
    pub job_id: Option<JobId>,
    pub served_at: DateTime<Utc>,
}

/// Receives one record per delivered artifact.
///
/// Must not block: delivery does not wait on it.
pub trait ServedTierSink: Send + Sync {
    fn record(&self, record: ServedRecord);
}

/// Keeps records in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct InMemoryServedTierSink {
    records: Mutex<Vec<ServedRecord>>,
}

impl InMemoryServedTierSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ServedRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn tiers(&self) -> Vec<ServedTier> {
        self.records().into_iter().map(|r| r.tier).collect()
    }
}

impl ServedTierSink for InMemoryServedTierSink {
    fn record(&self, record: ServedRecord) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}
