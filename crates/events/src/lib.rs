//! `genflow-events`
//!
//! **Responsibility:** keyed push-notification mechanics.
//!
//! A push channel delivers change notifications for one record (keyed by its
//! id) to whoever subscribed to that key. Nothing here is persisted; the record
//! store stays the source of truth.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{PushChannel, Subscription, UnsubscribeGuard};
pub use in_memory_bus::{InMemoryPushChannel, PushChannelError};
