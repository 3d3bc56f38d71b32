//! Generation entry points used by the application.

use tokio_util::sync::CancellationToken;

use genflow_ai::NormalizedArtifact;
use genflow_core::GenerationParams;

use crate::cache::{CacheOwner, DailyCacheGate, RegenerateError};
use crate::jobs::JobKind;

use super::chain::{FallbackChain, Generation, GenerationError};

/// Fallback chain plus the daily cache in front of daily ideas.
#[derive(Debug, Clone)]
pub struct GenerationService {
    chain: FallbackChain,
    daily: DailyCacheGate,
}

impl GenerationService {
    pub fn new(chain: FallbackChain, daily: DailyCacheGate) -> Self {
        Self { chain, daily }
    }

    pub fn chain(&self) -> &FallbackChain {
        &self.chain
    }

    /// One content script, never cached.
    pub async fn generate(
        &self,
        owner: &CacheOwner,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<Generation, GenerationError> {
        self.chain
            .generate(owner.id, JobKind::ContentScript, params, cancel)
            .await
    }

    /// Today's ideas for `owner`, generated at most once per local day.
    pub async fn daily_ideas(
        &self,
        owner: &CacheOwner,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<NormalizedArtifact, GenerationError> {
        let chain = &self.chain;
        self.daily
            .get_or_generate(owner, move || async move {
                chain
                    .generate(owner.id, JobKind::DailyIdeas, params, cancel)
                    .await
                    .map(|generation| generation.artifact)
            })
            .await
    }

    /// Throw away today's ideas and generate new ones.
    pub async fn refresh_daily_ideas(
        &self,
        owner: &CacheOwner,
        params: &GenerationParams,
        cancel: &CancellationToken,
    ) -> Result<NormalizedArtifact, RegenerateError> {
        let chain = &self.chain;
        self.daily
            .regenerate(owner, move || async move {
                chain
                    .generate(owner.id, JobKind::DailyIdeas, params, cancel)
                    .await
                    .map(|generation| generation.artifact)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::cache::{InMemoryDailyCacheStore, ManualClock};
    use crate::config::GenflowConfig;
    use crate::generation::sink::{InMemoryServedTierSink, ServedTier};
    use crate::jobs::InMemoryJobStore;
    use genflow_core::OwnerId;

    /// Nothing configured: every generation ends in the template tier.
    fn service() -> (GenerationService, Arc<InMemoryServedTierSink>, Arc<InMemoryJobStore>) {
        let store = InMemoryJobStore::arc();
        let sink = Arc::new(InMemoryServedTierSink::new());
        let chain = FallbackChain::from_config(
            &GenflowConfig::default(),
            store.clone(),
            store.channel(),
            sink.clone(),
        );
        let gate = DailyCacheGate::new(
            Arc::new(InMemoryDailyCacheStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        (GenerationService::new(chain, gate), sink, store)
    }

    #[tokio::test]
    async fn unconfigured_service_still_delivers_templates() {
        let (service, sink, store) = service();
        let owner = CacheOwner::utc(OwnerId::new());
        let params = GenerationParams::new("Houseplants", "Instagram");

        let generation = service
            .generate(&owner, &params, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(generation.tier, ServedTier::Template);
        assert_eq!(sink.tiers(), vec![ServedTier::Template]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn daily_ideas_run_the_chain_once_per_day() {
        let (service, sink, store) = service();
        let owner = CacheOwner::utc(OwnerId::new());
        let params = GenerationParams::new("Houseplants", "TikTok");
        let cancel = CancellationToken::new();

        let first = service.daily_ideas(&owner, &params, &cancel).await.unwrap();
        let second = service.daily_ideas(&owner, &params, &cancel).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(sink.records().len(), 1);
        assert_eq!(store.len(), 1);

        service
            .refresh_daily_ideas(&owner, &params, &cancel)
            .await
            .unwrap();
        assert_eq!(sink.records().len(), 2);
        assert_eq!(store.len(), 2);
    }
}
