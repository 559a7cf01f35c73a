//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::dao::models::GameMode;

/// Validates that a game mode is one of the known wire names.
///
/// # Examples
///
/// ```ignore
/// validate_game_mode("solo")  // Ok
/// validate_game_mode("Team")  // Err - names are lowercase
/// validate_game_mode("duo")   // Err - unknown mode
/// ```
pub fn validate_game_mode(mode: &str) -> Result<(), ValidationError> {
    if mode.parse::<GameMode>().is_err() {
        let mut err = ValidationError::new("game_mode");
        err.message = Some(format!("game_mode must be `solo` or `team` (got `{mode}`)").into());
        return Err(err);
    }

    Ok(())
}
