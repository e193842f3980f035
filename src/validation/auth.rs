use crate::error::{AppError, Result};

/// Validates a house number for provisioning.
///
/// # Arguments
///
/// * `house_number` - The house number to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the house number is valid.
pub fn validate_house_number(house_number: &str) -> Result<()> {
    if house_number.trim().is_empty() {
        return Err(AppError::Validation(
            "House number cannot be empty".to_string(),
        ));
    }

    if house_number.len() > 32 {
        return Err(AppError::Validation(
            "House number must be at most 32 characters".to_string(),
        ));
    }

    if !house_number
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
    {
        return Err(AppError::Validation(
            "House number can only contain letters, numbers, hyphens, and slashes".to_string(),
        ));
    }

    Ok(())
}

/// Validates a new password.
///
/// Only applied when a password is set, never at login.
///
/// # Arguments
///
/// * `password` - The password to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the password is valid.
pub fn validate_password(password: &str) -> Result<()> {
    if password.len() < 8 {
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
