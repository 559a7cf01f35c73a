use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::{Valid, ValidRejection};

use crate::{
    dto::leaderboard::{
        RankEntryResponse, RecalculationStatusResponse, SubmitScoreRequest,
        TopLeaderboardResponse, TopQuery, UserRankResponse,
    },
    error::AppError,
    services::{leaderboard_service, score_service},
    state::SharedState,
};

/// Score submission and rank query endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/v1/leaderboard/submit", post(submit_score))
        .route("/api/v1/leaderboard/top", get(top_leaderboard))
        .route("/api/v1/leaderboard/rank/{user_id}", get(user_rank))
        .route(
            "/api/v1/leaderboard/recalculation",
            get(recalculation_status),
        )
}

/// Record the score of a finished game session.
///
/// Totals and ranks are refreshed by the next scheduled recalculation.
#[utoipa::path(
    post,
    path = "/api/v1/leaderboard/submit",
    tag = "leaderboard",
    request_body = SubmitScoreRequest,
    responses(
        (status = 202, description = "Score recorded"),
        (status = 400, description = "Invalid submission"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn submit_score(
    State(state): State<SharedState>,
    payload: Result<Valid<Json<SubmitScoreRequest>>, ValidRejection<JsonRejection>>,
) -> Result<StatusCode, AppError> {
    let Valid(Json(payload)) = payload.map_err(|err| AppError::BadRequest(err.to_string()))?;
    let event = payload
        .into_event()
        .ok_or_else(|| AppError::BadRequest("unknown game mode".into()))?;
    score_service::submit_score(&state, event).await?;
    Ok(StatusCode::ACCEPTED)
}

/// Retrieve the first entries of the leaderboard.
#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/top",
    tag = "leaderboard",
    params(TopQuery),
    responses(
        (status = 200, description = "Top leaderboard", body = TopLeaderboardResponse),
        (status = 400, description = "Limit out of bounds"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn top_leaderboard(
    State(state): State<SharedState>,
    query: Result<Query<TopQuery>, QueryRejection>,
) -> Result<Json<TopLeaderboardResponse>, AppError> {
    let Query(query) = query.map_err(|err| AppError::BadRequest(err.body_text()))?;
    let top = leaderboard_service::get_top(&state, query.limit).await?;
    Ok(Json(TopLeaderboardResponse {
        entries: top.value.into_iter().map(Into::into).collect(),
        cached: top.hit,
    }))
}

/// Retrieve the rank of a single player.
#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/rank/{user_id}",
    tag = "leaderboard",
    params(("user_id" = i64, Path, description = "Identifier of the player")),
    responses(
        (status = 200, description = "Player rank", body = UserRankResponse),
        (status = 400, description = "Invalid user identifier"),
        (status = 404, description = "Player has no rank yet"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn user_rank(
    State(state): State<SharedState>,
    user_id: Result<Path<i64>, PathRejection>,
) -> Result<Json<UserRankResponse>, AppError> {
    let Path(user_id) = user_id.map_err(|err| AppError::BadRequest(err.body_text()))?;
    let rank = leaderboard_service::get_user_rank(&state, user_id).await?;
    Ok(Json(UserRankResponse {
        entry: RankEntryResponse::from(rank.value),
        cached: rank.hit,
    }))
}

/// Report the state of the background recalculation.
#[utoipa::path(
    get,
    path = "/api/v1/leaderboard/recalculation",
    tag = "leaderboard",
    responses((status = 200, description = "Recalculation status", body = RecalculationStatusResponse))
)]
pub async fn recalculation_status(
    State(state): State<SharedState>,
) -> Json<RecalculationStatusResponse> {
    let snapshot = state.recalculation().snapshot().await;
    Json(RecalculationStatusResponse::from_snapshot(
        snapshot,
        state.config().recalculation_interval.as_secs(),
    ))
}
