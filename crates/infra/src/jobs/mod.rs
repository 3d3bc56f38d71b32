//! Generation jobs handed to an external workflow.
//!
//! ## Design
//!
//! - A job is a row; the external workflow is the only writer after creation
//! - Status moves forward only; stores reject regressions
//! - Completion is observed through a per-job push channel, with a single
//!   deadline read as the safety net
//!
//! ## Components
//!
//! - `Job`: row model and status policy
//! - `JobStore`: persistence (in-memory store publishes every update)
//! - `SubmissionClient`: create row, then fire-and-forget the trigger
//! - `JobTracker` / `TrackerHandle`: push/deadline race per job
//! - `TrackerRegistry`: live trackers keyed by job id

pub mod registry;
pub mod store;
pub mod submission;
pub mod tracker;
pub mod trigger;
pub mod types;

pub use registry::TrackerRegistry;
pub use store::{InMemoryJobStore, JobEvents, JobStore, JobStoreError};
pub use submission::{
    CreationError, SubmissionClient, SubmittedJob, TrackedSubmission, TriggerOutcome,
};
pub use tracker::{
    JobTracker, Resolution, TimeoutError, TrackerConfig, TrackerHandle, TrackerPhase,
};
pub use trigger::{JobTrigger, TriggerError, WebhookTrigger};
pub use types::{Job, JobKind, JobStatus, StatusRegression};
