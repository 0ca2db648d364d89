use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by session store backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// The targeted document does not exist and the update did not request an upsert.
    #[error("document `{collection}/{id}` not found")]
    NotFound { collection: String, id: String },
    /// A guard attached to an update did not hold; nothing was written.
    #[error("precondition failed on `{collection}/{id}`")]
    PreconditionFailed { collection: String, id: String },
    /// The update addressed a field the document shape cannot hold.
    #[error("invalid update path `{path}`: {reason}")]
    InvalidPath { path: String, reason: String },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    pub(crate) fn not_found(collection: &str, id: &str) -> Self {
        StorageError::NotFound {
            collection: collection.to_owned(),
            id: id.to_owned(),
        }
    }

    pub(crate) fn precondition_failed(collection: &str, id: &str) -> Self {
        StorageError::PreconditionFailed {
            collection: collection.to_owned(),
            id: id.to_owned(),
        }
    }

    /// Whether the failure comes from an unmet update guard.
    pub fn is_precondition_failure(&self) -> bool {
        matches!(self, StorageError::PreconditionFailed { .. })
    }
}
