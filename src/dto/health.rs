use serde::Serialize;
use utoipa::ToSchema;

/// Coarse health of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// The store answered its last ping.
    Ok,
    /// The store is unreachable; reads and submissions return 503.
    Degraded,
}

/// Health payload returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
}

impl HealthResponse {
    /// Store reachable.
    pub fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
        }
    }

    /// Store unreachable or flagged by the storage supervisor.
    pub fn degraded() -> Self {
        Self {
            status: HealthStatus::Degraded,
        }
    }
}
