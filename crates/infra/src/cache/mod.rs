//! Daily cache: one generated artifact per owner per local calendar day.
//!
//! The store and the clock are injected; nothing here is global.

pub mod clock;
pub mod gate;
pub mod sqlite;
pub mod store;

pub use clock::{CacheOwner, Clock, ManualClock, SystemClock};
pub use gate::{DailyCacheGate, RegenerateError};
pub use sqlite::SqliteDailyCacheStore;
pub use store::{CacheError, CacheRecord, DailyCacheStore, InMemoryDailyCacheStore};
