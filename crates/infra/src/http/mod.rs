//! Outbound HTTP with timeout + retry.

pub mod executor;

pub use executor::{
    ExecutorConfig, ExecutorError, RequestSpec, ResilientExecutor, DEFAULT_RETRYABLE_STATUSES,
};
