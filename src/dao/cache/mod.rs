//! Key-value cache seam used for disposable projections of the rank table.

pub mod memory;

use std::{error::Error, time::Duration};

use futures::future::BoxFuture;
use thiserror::Error;

pub use memory::MemoryCache;

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Failures raised by the cache layer. None of them is fatal to a request.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Value could not be serialized before being stored.
    #[error("failed to encode cached value for `{key}`")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// Stored bytes could not be decoded into the expected shape.
    #[error("failed to decode cached value for `{key}`")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// Backend could not be reached or rejected the command.
    #[error("cache backend unavailable: {message}")]
    Backend {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl CacheError {
    /// Construct a backend error from any transport failure.
    pub fn backend(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        CacheError::Backend {
            message,
            source: Box::new(source),
        }
    }
}

/// Byte-oriented key-value store with per-key expiry.
///
/// A missing key is reported as `Ok(None)`, never as an error.
pub trait CacheBackend: Send + Sync {
    /// Read the raw value stored under `key`.
    fn get(&self, key: &str) -> BoxFuture<'static, CacheResult<Option<Vec<u8>>>>;

    /// Store `value` under `key`, replacing any previous value, for `ttl`.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> BoxFuture<'static, CacheResult<()>>;

    /// Remove every listed key and return how many were present.
    fn delete(&self, keys: Vec<String>) -> BoxFuture<'static, CacheResult<u64>>;
}
