//! Validation helpers for DTOs.

use validator::ValidationError;

/// Number of options every question carries.
pub const OPTION_COUNT: usize = 4;

/// Validates that a room code is exactly six ASCII digits.
///
/// # Examples
///
/// ```ignore
/// validate_room_code("123456") // Ok
/// validate_room_code("12345")  // Err - too short
/// validate_room_code("12a456") // Err - not numeric
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if code.len() != 6 {
        let mut err = ValidationError::new("room_code_length");
        err.message = Some(format!("Game code must be 6 digits (got {})", code.len()).into());
        return Err(err);
    }

    if !code.chars().all(|c| c.is_ascii_digit()) {
        let mut err = ValidationError::new("room_code_format");
        err.message = Some("Game code must contain only digits".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a question carries four non-blank options.
pub fn validate_options(options: &[String]) -> Result<(), ValidationError> {
    if options.len() != OPTION_COUNT {
        let mut err = ValidationError::new("options_count");
        err.message = Some(
            format!(
                "Questions need exactly {OPTION_COUNT} options (got {})",
                options.len()
            )
            .into(),
        );
        return Err(err);
    }

    if options.iter().any(|option| option.trim().is_empty()) {
        let mut err = ValidationError::new("options_blank");
        err.message = Some("Options cannot be blank".into());
        return Err(err);
    }

    Ok(())
}
