use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::SystemTime};
use thiserror::Error;
use utoipa::ToSchema;

/// Identifier of a player on the leaderboard.
pub type UserId = i64;

/// Game mode a score was obtained in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Single player session.
    Solo,
    /// Team session.
    Team,
}

impl GameMode {
    /// Wire name of the mode, as accepted by the submit endpoint.
    pub const fn as_str(self) -> &'static str {
        match self {
            GameMode::Solo => "solo",
            GameMode::Team => "team",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown game mode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown game mode `{0}`")]
pub struct UnknownGameMode(pub String);

impl FromStr for GameMode {
    type Err = UnknownGameMode;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "solo" => Ok(GameMode::Solo),
            "team" => Ok(GameMode::Team),
            other => Err(UnknownGameMode(other.to_owned())),
        }
    }
}

/// Immutable record of a score obtained during a game session.
///
/// Events are only ever appended; totals and ranks are derived from them by the
/// recalculation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEventEntity {
    /// Player who obtained the score.
    pub user_id: UserId,
    /// Points obtained, always strictly positive.
    pub score: i64,
    /// Mode the session was played in.
    pub game_mode: GameMode,
    /// Time the event was accepted by the service.
    pub occurred_at: SystemTime,
}

impl ScoreEventEntity {
    /// Build an event stamped with the current time.
    pub fn now(user_id: UserId, score: i64, game_mode: GameMode) -> Self {
        Self {
            user_id,
            score,
            game_mode,
            occurred_at: SystemTime::now(),
        }
    }
}

/// Authoritative rank row of a player, as written by the last recalculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankEntryEntity {
    /// Player owning the row.
    pub user_id: UserId,
    /// Sum of every score event of the player.
    pub total_score: i64,
    /// Dense, 1-based position on the leaderboard.
    pub rank: u64,
}

/// Outcome of a successful recalculation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecalculationSummary {
    /// Number of rank rows written.
    pub ranked_users: usize,
    /// Number of score events folded into the totals.
    pub scored_events: u64,
}
