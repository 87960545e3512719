//! Error types for cache operations.

use thiserror::Error;

/// Result type for [`SyncedStore`](crate::store::SyncedStore) operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the synchronization cache.
///
/// Gateway failures carry only a human-readable message; the variant records
/// which operation rejected the write.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote unreachable or the response was malformed.
    #[error("network error: {0}")]
    Network(String),

    /// The backend refused to create an entity.
    #[error("creation failed: {0}")]
    Creation(String),

    /// The backend did not accept an appended message.
    #[error("failed to persist message: {0}")]
    Persistence(String),

    /// The backend rejected a partial update.
    #[error("update failed: {0}")]
    Update(String),

    /// The requested entity does not exist remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local snapshot storage failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Wraps a gateway failure as a network error.
    pub fn network(err: impl std::fmt::Display) -> Self {
        Self::Network(err.to_string())
    }

    /// Returns true if the failure came from the remote side rather than
    /// local storage.
    pub fn is_remote(&self) -> bool {
        !matches!(self, SyncError::Storage(_))
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}
