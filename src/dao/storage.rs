use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Backend could not serve the request; the caller may retry later.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A transaction was rolled back; no partial state was written.
    #[error("storage transaction aborted: {message}")]
    Aborted {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct an aborted-transaction error from any backend failure.
    pub fn aborted(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Aborted {
            message,
            source: Box::new(source),
        }
    }
}
