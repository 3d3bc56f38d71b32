use async_trait::async_trait;
use thiserror::Error;

/// A row the reconciler can hold locally and mirror remotely.
pub trait Record: Clone + Send + Sync + 'static {
    /// Partial update applied both locally and remotely.
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> &str;

    fn set_id(&mut self, id: String);

    fn apply(&mut self, patch: &Self::Patch);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote rejected the request: {message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Backend holding the authoritative collection.
#[async_trait]
pub trait RecordRemote<T: Record>: Send + Sync + 'static {
    /// Persist `item` and return the stored row with its real id.
    async fn create(&self, item: T) -> Result<T, RemoteError>;

    async fn update(&self, id: &str, patch: T::Patch) -> Result<T, RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;

    async fn list(&self) -> Result<Vec<T>, RemoteError>;
}

#[async_trait]
impl<T, R> RecordRemote<T> for std::sync::Arc<R>
where
    T: Record,
    R: RecordRemote<T> + ?Sized,
{
    async fn create(&self, item: T) -> Result<T, RemoteError> {
        (**self).create(item).await
    }

    async fn update(&self, id: &str, patch: T::Patch) -> Result<T, RemoteError> {
        (**self).update(id, patch).await
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        (**self).delete(id).await
    }

    async fn list(&self) -> Result<Vec<T>, RemoteError> {
        (**self).list().await
    }
}
