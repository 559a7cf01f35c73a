//! DTO definitions used by the leaderboard REST API and documentation layer.

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{GameMode, RankEntryEntity, ScoreEventEntity, UserId},
    dto::{format_system_time, validation::validate_game_mode},
    state::recalculation::{RunOutcome, RunPhase, RunReport, StatusSnapshot},
};

/// Score obtained by a player at the end of a game session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct SubmitScoreRequest {
    #[validate(range(min = 1, message = "user_id must be a positive integer"))]
    pub user_id: UserId,
    /// Between 1 and 1 000 000 000.
    #[validate(range(
        min = 1,
        max = 1_000_000_000,
        message = "score must be between 1 and 1000000000"
    ))]
    pub score: i64,
    /// Either `solo` or `team`.
    #[validate(custom(function = "validate_game_mode"))]
    #[schema(value_type = GameMode)]
    pub game_mode: String,
}

impl SubmitScoreRequest {
    /// Convert a validated request into the event appended to the store.
    ///
    /// Returns `None` when the game mode was not validated beforehand.
    pub fn into_event(self) -> Option<ScoreEventEntity> {
        let game_mode = self.game_mode.parse::<GameMode>().ok()?;
        Some(ScoreEventEntity::now(self.user_id, self.score, game_mode))
    }
}

/// Query string of the top leaderboard route.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TopQuery {
    /// Number of entries to return; the configured default when omitted.
    pub limit: Option<usize>,
}

/// Public projection of a rank row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RankEntryResponse {
    pub user_id: UserId,
    pub total_score: i64,
    pub rank: u64,
}

impl From<RankEntryEntity> for RankEntryResponse {
    fn from(value: RankEntryEntity) -> Self {
        Self {
            user_id: value.user_id,
            total_score: value.total_score,
            rank: value.rank,
        }
    }
}

/// First entries of the leaderboard ordered by rank.
#[derive(Debug, Serialize, ToSchema)]
pub struct TopLeaderboardResponse {
    pub entries: Vec<RankEntryResponse>,
    /// Whether the entries were served from the cache.
    pub cached: bool,
}

/// Rank row of a single player.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserRankResponse {
    pub entry: RankEntryResponse,
    /// Whether the entry was served from the cache.
    pub cached: bool,
}

/// Phase of the background recalculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RecalculationPhase {
    Idle,
    Running,
}

impl From<RunPhase> for RecalculationPhase {
    fn from(value: RunPhase) -> Self {
        match value {
            RunPhase::Idle => RecalculationPhase::Idle,
            RunPhase::Running => RecalculationPhase::Running,
        }
    }
}

/// Outcome and timing of the last finished recalculation.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecalculationRunResponse {
    /// `succeeded` or `failed`.
    pub outcome: String,
    /// RFC 3339 start time.
    pub started_at: String,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranked_users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scored_events: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<RunReport> for RecalculationRunResponse {
    fn from(value: RunReport) -> Self {
        let started_at = format_system_time(value.started_at);
        let duration_ms = u64::try_from(value.duration.as_millis()).unwrap_or(u64::MAX);
        match value.outcome {
            RunOutcome::Succeeded {
                ranked_users,
                scored_events,
            } => Self {
                outcome: "succeeded".into(),
                started_at,
                duration_ms,
                ranked_users: Some(ranked_users),
                scored_events: Some(scored_events),
                error: None,
            },
            RunOutcome::Failed { error } => Self {
                outcome: "failed".into(),
                started_at,
                duration_ms,
                ranked_users: None,
                scored_events: None,
                error: Some(error),
            },
        }
    }
}

/// Read-only view of the recalculation scheduler.
#[derive(Debug, Serialize, ToSchema)]
pub struct RecalculationStatusResponse {
    pub phase: RecalculationPhase,
    pub last_run: Option<RecalculationRunResponse>,
    pub last_success_at: Option<String>,
    pub succeeded_runs: u64,
    pub failed_runs: u64,
    pub skipped_runs: u64,
    pub absorbed_triggers: u64,
    /// Whether scores were submitted since the last run started.
    pub pending_scores: bool,
    pub interval_secs: u64,
}

impl RecalculationStatusResponse {
    /// Build the response from a status snapshot and the configured interval.
    pub fn from_snapshot(snapshot: StatusSnapshot, interval_secs: u64) -> Self {
        Self {
            phase: snapshot.phase.into(),
            last_run: snapshot.last_run.map(Into::into),
            last_success_at: snapshot.last_success_at.map(format_system_time),
            succeeded_runs: snapshot.succeeded,
            failed_runs: snapshot.failed,
            skipped_runs: snapshot.skipped,
            absorbed_triggers: snapshot.absorbed,
            pending_scores: snapshot.dirty,
            interval_secs,
        }
    }
}
