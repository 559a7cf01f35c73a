/// Key-value cache backends.
pub mod cache;
/// Authoritative score event and rank storage.
pub mod leaderboard_store;
/// Database model definitions.
pub mod models;
/// Total aggregation and dense rank assignment.
pub mod ranking;
/// Storage abstraction layer for database operations.
pub mod storage;
