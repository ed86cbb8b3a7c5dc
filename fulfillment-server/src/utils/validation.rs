//! Input validation helpers
//!
//! Centralized text length constants and validation functions for the
//! order commands. Limits are UX-reasonable bounds; the store itself does
//! not enforce text lengths.

use crate::utils::AppError;

// ── Text length limits ──────────────────────────────────────────────

/// Recipient names, city names, street lines
pub const MAX_NAME_LEN: usize = 200;

/// Opaque external ids (draft id, references)
pub const MAX_ID_LEN: usize = 128;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Postal codes
pub const MAX_POSTAL_CODE_LEN: usize = 16;

// ── Validation helpers (command handlers) ───────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(AppError::validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate a customer email address.
///
/// Shape check only (`local@domain.tld`); deliverability is the mail
/// provider's problem.
pub fn validate_email(value: &str, field: &str) -> Result<(), AppError> {
    validate_required_text(value, field, MAX_EMAIL_LEN)?;
    let Some((local, domain)) = value.split_once('@') else {
        return Err(AppError::validation(format!("{field} is not a valid email")));
    };
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || value.contains(' ') {
        return Err(AppError::validation(format!("{field} is not a valid email")));
    }
    Ok(())
}

/// Validate an ISO 3166-1 alpha-2 country code (shape only).
pub fn validate_country_code(value: &str, field: &str) -> Result<(), AppError> {
    if value.len() != 2 || !value.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(AppError::validation(format!(
            "{field} must be a two-letter uppercase country code"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_rejects_empty_and_overlong() {
        assert!(validate_required_text("", "name", MAX_NAME_LEN).is_err());
        assert!(validate_required_text("   ", "name", MAX_NAME_LEN).is_err());
        assert!(validate_required_text(&"x".repeat(MAX_NAME_LEN + 1), "name", MAX_NAME_LEN).is_err());
        assert!(validate_required_text("ok", "name", MAX_NAME_LEN).is_ok());
    }

    #[test]
    fn email_shape_check() {
        assert!(validate_email("a@b.com", "email").is_ok());
        assert!(validate_email("no-at-sign", "email").is_err());
        assert!(validate_email("a@nodot", "email").is_err());
        assert!(validate_email("a b@c.com", "email").is_err());
        assert!(validate_email("@c.com", "email").is_err());
    }

    #[test]
    fn country_code_shape_check() {
        assert!(validate_country_code("PT", "country").is_ok());
        assert!(validate_country_code("pt", "country").is_err());
        assert!(validate_country_code("PRT", "country").is_err());
    }
}
