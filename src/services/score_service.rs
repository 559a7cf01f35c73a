//! Submission path: append the event, then drop the submitter's cached rank.

use tracing::info;

use crate::{dao::models::ScoreEventEntity, error::ServiceError, state::SharedState};

/// Durably record a score event and invalidate the submitter's cached rank.
///
/// Totals and ranks only change at the next recalculation.
pub async fn submit_score(state: &SharedState, event: ScoreEventEntity) -> Result<(), ServiceError> {
    let user_id = event.user_id;
    let score = event.score;
    let game_mode = event.game_mode;

    state.store().append_score_event(event).await?;
    state.coordinator().on_score_committed(user_id).await;

    info!(user_id, score, game_mode = %game_mode, "score event recorded");
    Ok(())
}
