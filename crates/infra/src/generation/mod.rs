//! Artifact generation across the three fallback tiers.

pub mod chain;
pub mod provider;
pub mod service;
pub mod sink;

pub use chain::{FallbackChain, Generation, GenerationError};
pub use provider::{ChatCompletionsProvider, GenerationProvider, ProviderConfig, ProviderError};
pub use service::GenerationService;
pub use sink::{InMemoryServedTierSink, ServedRecord, ServedTier, ServedTierSink};
