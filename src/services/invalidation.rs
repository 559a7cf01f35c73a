//! Rules deciding which cached projections go stale after a write or a recalculation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    dao::models::UserId, services::leaderboard_cache::LeaderboardCache,
    state::recalculation::RecalculationStatus,
};

/// Removes stale cache keys after mutations of the authoritative store.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: LeaderboardCache,
    top_limit: usize,
    status: Arc<RecalculationStatus>,
}

impl InvalidationCoordinator {
    /// Build a coordinator owning the default top-N size.
    pub fn new(cache: LeaderboardCache, top_limit: usize, status: Arc<RecalculationStatus>) -> Self {
        Self {
            cache,
            top_limit,
            status,
        }
    }

    /// Called once a score event of `user_id` is durably committed.
    ///
    /// Only the submitter's cached rank is dropped; the shared top-N entries
    /// are refreshed by the next recalculation.
    pub async fn on_score_committed(&self, user_id: UserId) {
        self.status.mark_dirty();
        match self.cache.invalidate_user(user_id).await {
            Ok(()) => debug!(user_id, "invalidated cached user rank"),
            Err(err) => warn!(user_id, error = %err, "user rank cache invalidation failed"),
        }
    }

    /// Called after a recalculation committed a new rank table.
    ///
    /// Drops every cached top-N slice. Cached per-user ranks are left to
    /// expire or to be invalidated by their owner's next submission.
    pub async fn on_recalculated(&self) {
        let generation = self.cache.advance_top_generation();
        debug!(generation, "top leaderboard generation advanced");
        for limit in self.stale_top_sizes() {
            match self.cache.invalidate_top(limit).await {
                Ok(()) => debug!(limit, "invalidated cached top leaderboard"),
                Err(err) => warn!(limit, error = %err, "top leaderboard cache invalidation failed"),
            }
        }
    }

    fn stale_top_sizes(&self) -> Vec<usize> {
        let mut sizes = self.cache.populated_top_sizes();
        if !sizes.contains(&self.top_limit) {
            sizes.push(self.top_limit);
        }
        sizes
    }
}
