//! `genflow-ai`
//!
//! **Responsibility:** the generation output boundary.
//!
//! This crate is pure (no IO, no async):
//! - It owns the canonical `NormalizedArtifact` every generation tier delivers.
//! - It maps the heterogeneous raw shapes returned by external workflows and
//!   providers into that artifact.
//! - It builds the deterministic last-resort artifact from parameters alone.

pub mod artifact;
pub mod normalize;
pub mod template;

pub use artifact::{NormalizedArtifact, Step, DEFAULT_SCORE};
pub use normalize::{detect_shape, normalize, try_normalize, NormalizationError, ShapeKind};
pub use template::{template_artifact, template_response};
