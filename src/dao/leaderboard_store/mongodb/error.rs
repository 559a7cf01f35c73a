use mongodb::error::Error as MongoError;
use thiserror::Error;

use crate::dao::models::UserId;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB did not answer ping after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to append score event for user `{user_id}`")]
    AppendEvent {
        user_id: UserId,
        #[source]
        source: MongoError,
    },
    #[error("failed to load top {limit} rank entries")]
    LoadTopRanks {
        limit: usize,
        #[source]
        source: MongoError,
    },
    #[error("failed to load rank entry for user `{user_id}`")]
    LoadRank {
        user_id: UserId,
        #[source]
        source: MongoError,
    },
    #[error("failed to start rank recalculation transaction")]
    StartTransaction {
        #[source]
        source: MongoError,
    },
    #[error("failed to aggregate score totals")]
    AggregateTotals {
        #[source]
        source: MongoError,
    },
    #[error("failed to write rank entry for user `{user_id}`")]
    WriteRank {
        user_id: UserId,
        #[source]
        source: MongoError,
    },
    #[error("failed to commit rank recalculation transaction")]
    CommitTransaction {
        #[source]
        source: MongoError,
    },
}

impl MongoDaoError {
    /// Whether the error happened inside the recalculation transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(
            self,
            MongoDaoError::AggregateTotals { .. }
                | MongoDaoError::WriteRank { .. }
                | MongoDaoError::CommitTransaction { .. }
        )
    }
}
