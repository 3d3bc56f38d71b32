//! Client-side state for generated content.
//!
//! The UI edits a local collection immediately and reconciles it with the
//! backend in the background.

pub mod reconciler;

pub use reconciler::{
    is_temp_id, PendingMutation, Reconciler, ReconcileError, Record, RecordRemote, RemoteError,
    TEMP_ID_PREFIX,
};
