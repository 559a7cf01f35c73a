/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Cache invalidation rules applied after writes and recalculations.
pub mod invalidation;
/// Typed cache-aside layer for leaderboard projections.
pub mod leaderboard_cache;
/// Cache-aside leaderboard reads.
pub mod leaderboard_service;
/// Full rank recalculation.
pub mod recalculation;
/// Periodic single-flight recalculation driver.
pub mod scheduler;
/// Score submission.
pub mod score_service;
/// Storage health polling and reconnection.
pub mod storage_supervisor;
