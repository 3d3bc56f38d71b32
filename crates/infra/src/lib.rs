//! Infrastructure layer: HTTP resilience, job orchestration, fallback
//! generation and the daily cache.
//!
//! ## Flow
//!
//! ```text
//! FallbackChain::generate
//!   ├─ tier 1: SubmissionClient (job row + detached trigger)
//!   │            → JobTracker (push | deadline read)
//!   ├─ tier 2: GenerationProvider (direct call)
//!   └─ tier 3: template (parameters only)
//!          every tier → genflow_ai::normalize → NormalizedArtifact
//! ```

pub mod cache;
pub mod config;
pub mod generation;
pub mod http;
pub mod jobs;

pub use cache::{
    CacheError, CacheOwner, CacheRecord, Clock, DailyCacheGate, DailyCacheStore,
    InMemoryDailyCacheStore, ManualClock, RegenerateError, SqliteDailyCacheStore, SystemClock,
};
pub use config::GenflowConfig;
pub use generation::{
    ChatCompletionsProvider, FallbackChain, Generation, GenerationError, GenerationProvider,
    GenerationService, InMemoryServedTierSink, ProviderConfig, ProviderError, ServedRecord,
    ServedTier, ServedTierSink,
};
pub use http::{ExecutorConfig, ExecutorError, RequestSpec, ResilientExecutor};
pub use jobs::{
    CreationError, InMemoryJobStore, Job, JobEvents, JobKind, JobStatus, JobStore, JobStoreError,
    JobTracker, JobTrigger, Resolution, StatusRegression, SubmissionClient, SubmittedJob,
    TimeoutError, TrackedSubmission, TrackerConfig, TrackerHandle, TrackerPhase, TrackerRegistry,
    TriggerError, TriggerOutcome, WebhookTrigger,
};
