use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Ping the store and report `degraded` when it fails or the supervisor flagged it.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let reachable = match state.store().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "storage health check failed");
            false
        }
    };

    if reachable && !state.is_degraded() {
        HealthResponse::ok()
    } else {
        HealthResponse::degraded()
    }
}
