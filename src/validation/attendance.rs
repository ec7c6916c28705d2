use crate::error::{AppError, Result};

/// Longest check-in window an organizer may request, in minutes.
pub const MAX_VALIDITY_MINUTES: i64 = 24 * 60;

pub fn validate_event_title(title: &str) -> Result<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Event title cannot be empty".to_string()));
    }
    if trimmed.chars().count() > 200 {
        return Err(AppError::Validation(
            "Event title must be at most 200 characters".to_string(),
        ));
    }
    Ok(())
}

/// Validates the lifetime requested for a check-in QR code.
pub fn validate_validity_minutes(minutes: i64) -> Result<()> {
    if !(1..=MAX_VALIDITY_MINUTES).contains(&minutes) {
        return Err(AppError::Validation(format!(
            "Validity must be between 1 and {} minutes",
            MAX_VALIDITY_MINUTES
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validity_bounds() {
        assert!(validate_validity_minutes(60).is_ok());
        assert!(validate_validity_minutes(0).is_err());
        assert!(validate_validity_minutes(-1).is_err());
        assert!(validate_validity_minutes(MAX_VALIDITY_MINUTES + 1).is_err());
    }

    #[test]
    fn titles() {
        assert!(validate_event_title("Rapat KKG Gugus 3").is_ok());
        assert!(validate_event_title("").is_err());
    }
}
