//! Full rank recalculation over the score event log.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info};

use crate::dao::{
    leaderboard_store::LeaderboardStore, models::RecalculationSummary, storage::StorageResult,
};

/// Turns the whole score event log into a fresh rank table.
///
/// Cost grows with the number of events, which is why runs are batched on a
/// timer instead of happening per submission.
#[derive(Clone)]
pub struct RecalculationEngine {
    store: Arc<dyn LeaderboardStore>,
}

impl RecalculationEngine {
    /// Build an engine writing to `store`.
    pub fn new(store: Arc<dyn LeaderboardStore>) -> Self {
        Self { store }
    }

    /// Recompute every total and rank in a single transaction.
    ///
    /// A failure leaves the previous rank table in place and is not retried
    /// here; the next scheduled run starts over from the full log.
    pub async fn recalculate(&self) -> StorageResult<RecalculationSummary> {
        info!("processing leaderboard recalculation");
        let started = Instant::now();

        match self.store.recalculate_ranks().await {
            Ok(summary) => {
                info!(
                    ranked_users = summary.ranked_users,
                    scored_events = summary.scored_events,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "leaderboard recalculation completed"
                );
                Ok(summary)
            }
            Err(err) => {
                error!(
                    error = %err,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "leaderboard recalculation failed; previous ranks kept"
                );
                Err(err)
            }
        }
    }
}
