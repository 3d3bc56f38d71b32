//! `genflow-core`: shared building blocks.
//!
//! This crate contains plain data primitives (no IO, no async) used by every
//! other crate in the workspace.

pub mod error;
pub mod id;
pub mod params;

pub use error::{DomainError, DomainResult};
pub use id::{JobId, OwnerId};
pub use params::{GenerationParams, Platform};
