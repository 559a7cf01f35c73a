mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoLeaderboardStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        if err.is_transactional() {
            StorageError::aborted(err.to_string(), err)
        } else {
            StorageError::unavailable(err.to_string(), err)
        }
    }
}
