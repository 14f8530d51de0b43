/// Input validators for account fields
///
/// Length caps double as cheap DoS protection; the email regex is the
/// practical RFC 5322 subset.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ValidationError;

const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321
const MIN_EMAIL_LENGTH: usize = 5;
const MAX_NAME_LENGTH: usize = 256;
const MAX_LOCAL_PART_LENGTH: usize = 64;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
    ).unwrap();
}

/// Validates an email address, returning the trimmed form
pub fn is_valid_email(email: &str) -> Result<String, ValidationError> {
    let trimmed = email.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("email".to_string()));
    }
    if trimmed.len() < MIN_EMAIL_LENGTH {
        return Err(ValidationError::TooShort(
            "email".to_string(),
            MIN_EMAIL_LENGTH,
        ));
    }
    if trimmed.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong(
            "email".to_string(),
            MAX_EMAIL_LENGTH,
        ));
    }

    if trimmed.matches('@').count() != 1 {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    // Oversized local parts pass the regex but are rejected by real MTAs
    if let Some(at_pos) = trimmed.find('@') {
        if trimmed[..at_pos].len() > MAX_LOCAL_PART_LENGTH {
            return Err(ValidationError::InvalidFormat("email".to_string()));
        }
    }

    if !EMAIL_REGEX.is_match(trimmed) {
        return Err(ValidationError::InvalidFormat("email".to_string()));
    }

    Ok(trimmed.to_string())
}

/// Validates a person or center contact name, returning the trimmed form
pub fn is_valid_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField("name".to_string()));
    }
    if trimmed.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::TooLong(
            "name".to_string(),
            MAX_NAME_LENGTH,
        ));
    }

    if trimmed.chars().any(|c| c.is_control()) {
        return Err(ValidationError::InvalidFormat("name".to_string()));
    }

    Ok(trimmed.to_string())
}
