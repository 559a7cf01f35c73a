use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Leaderboard Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::leaderboard::submit_score,
        crate::routes::leaderboard::top_leaderboard,
        crate::routes::leaderboard::user_rank,
        crate::routes::leaderboard::recalculation_status,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::leaderboard::SubmitScoreRequest,
            crate::dto::leaderboard::RankEntryResponse,
            crate::dto::leaderboard::TopLeaderboardResponse,
            crate::dto::leaderboard::UserRankResponse,
            crate::dto::leaderboard::RecalculationStatusResponse,
            crate::dao::models::GameMode,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "leaderboard", description = "Score submission and rank queries"),
    )
)]
pub struct ApiDoc;
