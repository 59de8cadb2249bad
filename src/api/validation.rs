//! Input validation for API requests.
//!
//! Validation is enforced at the boundary, before requests reach the service
//! layer. For collecting multiple validation errors and returning them as an
//! ApiError, use the `ValidationErrorBuilder` from the `error` module.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Regex for validating email addresses (pragmatic, not RFC-complete)
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9][-a-zA-Z0-9]*(\.[a-zA-Z0-9][-a-zA-Z0-9]*)+$"
    ).unwrap();

    /// Regex for validating role names (uppercase identifiers)
    static ref ROLE_NAME_REGEX: Regex = Regex::new(
        r"^[A-Z][A-Z0-9_]*$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Invalid email address".to_string());
    }

    Ok(())
}

/// Validate password strength
pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < 8 {
        return Err("Password must be at least 8 characters".to_string());
    }

    if password.len() > 128 {
        return Err("Password is too long (max 128 characters)".to_string());
    }

    let has_letter = password.chars().any(|c| c.is_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());

    if !has_letter {
        return Err("Password must contain at least one letter".to_string());
    }
    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    Ok(())
}

/// Validate a display name
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("Name is required".to_string());
    }

    if name.len() > 120 {
        return Err("Name is too long (max 120 characters)".to_string());
    }

    Ok(())
}

/// Validate an item quantity (must be a positive integer)
pub fn validate_cantidad(cantidad: i64) -> Result<(), String> {
    if cantidad < 1 {
        return Err("Quantity must be at least 1".to_string());
    }

    if cantidad > 10_000 {
        return Err("Quantity is too large (max 10000)".to_string());
    }

    Ok(())
}

/// Validate a unit price
pub fn validate_precio(precio: f64) -> Result<(), String> {
    if !precio.is_finite() {
        return Err("Price must be a number".to_string());
    }

    if precio < 0.0 {
        return Err("Price cannot be negative".to_string());
    }

    Ok(())
}

/// Validate a role name (e.g., "ADMIN", "CLIENTE")
pub fn validate_role_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Role name is required".to_string());
    }

    if name.len() > 64 {
        return Err("Role name is too long (max 64 characters)".to_string());
    }

    if !ROLE_NAME_REGEX.is_match(name) {
        return Err("Role name must be an uppercase identifier".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_email() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("user.name+tag@sub.example.cl").is_ok());

        assert!(validate_email("").is_err());
        assert!(validate_email("not-an-email").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("abcdef12").is_ok());
        assert!(validate_password("S3cure-enough").is_ok());

        assert!(validate_password("").is_err());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Ana").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("   ").is_err());
        assert!(validate_name(&"x".repeat(121)).is_err());
    }

    #[test]
    fn test_validate_cantidad() {
        assert!(validate_cantidad(1).is_ok());
        assert!(validate_cantidad(99).is_ok());

        assert!(validate_cantidad(0).is_err());
        assert!(validate_cantidad(-3).is_err());
        assert!(validate_cantidad(10_001).is_err());
    }

    #[test]
    fn test_validate_precio() {
        assert!(validate_precio(599990.0).is_ok());
        assert!(validate_precio(0.0).is_ok());

        assert!(validate_precio(-1.0).is_err());
        assert!(validate_precio(f64::NAN).is_err());
        assert!(validate_precio(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_role_name() {
        assert!(validate_role_name("ADMIN").is_ok());
        assert!(validate_role_name("CLIENTE").is_ok());
        assert!(validate_role_name("SUPPORT_L2").is_ok());

        assert!(validate_role_name("").is_err());
        assert!(validate_role_name("admin").is_err());
        assert!(validate_role_name("2FAST").is_err());
    }
}
