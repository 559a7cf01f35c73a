//! Aggregation and dense ranking shared by every leaderboard store backend.

use std::collections::BTreeMap;

use crate::dao::models::{RankEntryEntity, RecalculationSummary, ScoreEventEntity, UserId};

/// Per-user aggregate of score events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTotal {
    /// Player the aggregate belongs to.
    pub user_id: UserId,
    /// Sum of the player's scores.
    pub total_score: i64,
    /// Number of events folded into `total_score`.
    pub events: u64,
}

/// Group score events by player and sum their scores.
///
/// Totals saturate instead of overflowing.
pub fn aggregate_totals<'a, I>(events: I) -> Vec<UserTotal>
where
    I: IntoIterator<Item = &'a ScoreEventEntity>,
{
    let mut totals: BTreeMap<UserId, UserTotal> = BTreeMap::new();
    for event in events {
        let total = totals.entry(event.user_id).or_insert(UserTotal {
            user_id: event.user_id,
            total_score: 0,
            events: 0,
        });
        total.total_score = total.total_score.saturating_add(event.score);
        total.events += 1;
    }
    totals.into_values().collect()
}

/// Order totals by score descending and assign ranks `1..=k`.
///
/// Equal totals are ordered by user id ascending, so every row receives a
/// distinct rank and the output is deterministic regardless of input order.
pub fn assign_dense_ranks(mut totals: Vec<UserTotal>) -> Vec<RankEntryEntity> {
    totals.sort_by(|a, b| {
        b.total_score
            .cmp(&a.total_score)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });

    totals
        .into_iter()
        .zip(1u64..)
        .map(|(total, rank)| RankEntryEntity {
            user_id: total.user_id,
            total_score: total.total_score,
            rank,
        })
        .collect()
}

/// Summarise a set of totals for logging and run status.
pub fn summarize(totals: &[UserTotal]) -> RecalculationSummary {
    RecalculationSummary {
        ranked_users: totals.len(),
        scored_events: totals.iter().map(|total| total.events).sum(),
    }
}
