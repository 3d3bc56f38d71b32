use thiserror::Error;

use super::record::RemoteError;

/// Why a local mutation did not stick. The collection is already restored.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    #[error("no record with id {0}")]
    NotFound(String),

    #[error("record {0} is still being created")]
    Unconfirmed(String),

    #[error("could not save the new record: {source}")]
    CreateFailed {
        temp_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("could not save changes to {id}: {source}")]
    UpdateFailed {
        id: String,
        #[source]
        source: RemoteError,
    },

    #[error("could not delete {id}: {source}")]
    DeleteFailed {
        id: String,
        #[source]
        source: RemoteError,
    },

    #[error("could not load records: {0}")]
    Load(#[source] RemoteError),

    #[error("background sync task ended unexpectedly")]
    Abandoned,
}
