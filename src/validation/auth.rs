use crate::error::{AppError, Result};

/// Validates a username.
///
/// Usernames are 3 to 64 characters of ASCII letters, digits, `_`, `-`
/// or `.`.
pub fn validate_username(username: &str) -> Result<()> {
    if username.len() < 3 {
        return Err(AppError::Validation(
            "Username must be at least 3 characters long".to_string(),
        ));
    }

    if username.len() > 64 {
        return Err(AppError::Validation(
            "Username must be at most 64 characters".to_string(),
        ));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AppError::Validation(
            "Username can only contain letters, numbers, dots, underscores, and hyphens".to_string(),
        ));
    }

    Ok(())
}

/// Validates a new password.
pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(AppError::Validation(
            "Password must be at most 128 characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates a member's display name.
pub fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Name cannot be empty".to_string()));
    }
    if trimmed.chars().count() > 120 {
        return Err(AppError::Validation(
            "Name must be at most 120 characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert!(validate_username("guru.sd-01").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn passwords() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"x".repeat(129)).is_err());
    }

    #[test]
    fn names() {
        assert!(validate_name("Pak Budi").is_ok());
        assert!(validate_name("   ").is_err());
    }
}
