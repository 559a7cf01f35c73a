pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{RankEntryEntity, RecalculationSummary, ScoreEventEntity, UserId};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

pub use memory::MemoryLeaderboardStore;

/// Authoritative persistence for score events and the rank table.
///
/// Score events and rank rows have different access patterns, so each gets its
/// own typed operations: events are only appended, ranks are only rewritten as
/// a whole by [`LeaderboardStore::recalculate_ranks`].
pub trait LeaderboardStore: Send + Sync {
    /// Durably append a score event.
    fn append_score_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<()>>;

    /// Recompute every total and rank from the full event log and replace the
    /// rank table in a single transaction.
    ///
    /// On error nothing is written and the previous rank table stays valid.
    fn recalculate_ranks(&self) -> BoxFuture<'static, StorageResult<RecalculationSummary>>;

    /// Read the first `limit` rank rows ordered by rank ascending.
    fn top_ranks(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<RankEntryEntity>>>;

    /// Read the rank row of a single player.
    fn find_rank(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<RankEntryEntity>>>;

    /// Cheap round-trip used by health reporting.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;

    /// Replace the underlying connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
