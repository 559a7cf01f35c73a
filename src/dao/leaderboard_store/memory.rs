//! Process-local leaderboard store used by tests and local runs without MongoDB.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use tokio::sync::RwLock;

use crate::dao::{
    leaderboard_store::LeaderboardStore,
    models::{RankEntryEntity, RecalculationSummary, ScoreEventEntity, UserId},
    ranking::{aggregate_totals, assign_dense_ranks, summarize},
    storage::StorageResult,
};

/// In-memory [`LeaderboardStore`] keeping the event log and rank table behind a lock.
#[derive(Clone, Default)]
pub struct MemoryLeaderboardStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    events: Vec<ScoreEventEntity>,
    ranks: Vec<RankEntryEntity>,
    rank_index: HashMap<UserId, usize>,
}

impl MemoryLeaderboardStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events appended so far.
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.events.len()
    }

    async fn recalculate(&self) -> RecalculationSummary {
        // Totals are computed from a snapshot; events appended meanwhile are
        // picked up by the next run.
        let totals = {
            let guard = self.inner.read().await;
            aggregate_totals(&guard.events)
        };
        let summary = summarize(&totals);
        let ranks = assign_dense_ranks(totals);
        let rank_index = ranks
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.user_id, position))
            .collect();

        let mut guard = self.inner.write().await;
        guard.ranks = ranks;
        guard.rank_index = rank_index;
        summary
    }
}

impl LeaderboardStore for MemoryLeaderboardStore {
    fn append_score_event(&self, event: ScoreEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.events.push(event);
            Ok(())
        })
    }

    fn recalculate_ranks(&self) -> BoxFuture<'static, StorageResult<RecalculationSummary>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.recalculate().await) })
    }

    fn top_ranks(&self, limit: usize) -> BoxFuture<'static, StorageResult<Vec<RankEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.read().await;
            Ok(guard.ranks.iter().take(limit).cloned().collect())
        })
    }

    fn find_rank(
        &self,
        user_id: UserId,
    ) -> BoxFuture<'static, StorageResult<Option<RankEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.read().await;
            Ok(guard
                .rank_index
                .get(&user_id)
                .and_then(|&position| guard.ranks.get(position))
                .cloned())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
