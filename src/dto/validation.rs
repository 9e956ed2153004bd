//! Validation helpers for DTOs.

use validator::{ValidationError, ValidationErrors};

use crate::{config::Limits, dto::ws::CreateRoomMessage};

/// Check a `create` message against the configured maximums.
pub fn validate_create_limits(
    message: &CreateRoomMessage,
    limits: &Limits,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    if message.num_of_rounds > limits.max_rounds {
        let mut err = ValidationError::new("num_of_rounds_max");
        err.message = Some(
            format!(
                "Number of rounds must be at most {} (got {})",
                limits.max_rounds, message.num_of_rounds
            )
            .into(),
        );
        errors.add("numOfRounds", err);
    }

    if message.round_duration > limits.max_round_duration_secs {
        let mut err = ValidationError::new("round_duration_max");
        err.message = Some(
            format!(
                "Round duration must be at most {}s (got {}s)",
                limits.max_round_duration_secs, message.round_duration
            )
            .into(),
        );
        errors.add("roundDuration", err);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
