//! Inbound text validation shared by the admission gate.
//!
//! Bad format is reported to the caller and causes no state change; in
//! particular a malformed gate secret or code never consumes a rate slot.

use regex::Regex;
use thiserror::Error;

pub const MAX_MESSAGE_LENGTH: usize = 1000;
pub const MAX_QUERY_LENGTH: usize = 200;
pub const MAX_GROUP_NAME_LENGTH: usize = 100;

// Characters with meta meaning in query backends or markup renderers.
const SUSPICIOUS_CHARS: &[char] = &[
    '<', '>', '"', '\'', '&', ';', '(', ')', '{', '}', '[', ']', '|', '\\', '/', '*', '?', '`',
    '~', '$',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("input must not be empty")]
    Empty,
    #[error("input exceeds {max} characters")]
    TooLong { max: usize },
    #[error("input contains characters that are not allowed")]
    SuspiciousCharacters,
    #[error("access code must be 4-10 digits")]
    GateSecretFormat,
    #[error("verification code must be exactly 6 digits")]
    CodeFormat,
}

/// Bound the raw size of any inbound message before further routing.
///
/// # Errors
/// Returns `Empty` or `TooLong`.
pub fn validate_message(text: &str) -> Result<(), ValidationError> {
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    if text.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(())
}

/// Validate and trim a free-text credential search query.
///
/// # Errors
/// Returns `Empty`, `TooLong`, or `SuspiciousCharacters`.
pub fn validate_search_query(query: &str) -> Result<String, ValidationError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(ValidationError::Empty);
    }
    if query.chars().count() > MAX_QUERY_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_QUERY_LENGTH,
        });
    }
    if query.chars().any(|c| SUSPICIOUS_CHARS.contains(&c)) {
        return Err(ValidationError::SuspiciousCharacters);
    }
    Ok(query.to_string())
}

/// Validate and trim a group name used for group search.
///
/// # Errors
/// Returns `Empty` or `TooLong`.
pub fn validate_group_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::Empty);
    }
    if name.chars().count() > MAX_GROUP_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            max: MAX_GROUP_NAME_LENGTH,
        });
    }
    Ok(name.to_string())
}

/// Gate secrets are numeric, 4 to 10 digits.
///
/// # Errors
/// Returns `GateSecretFormat` on any other shape.
pub fn validate_gate_secret(secret: &str) -> Result<(), ValidationError> {
    let matched =
        Regex::new(r"^[0-9]{4,10}$").is_ok_and(|pattern| pattern.is_match(secret));
    if matched {
        Ok(())
    } else {
        Err(ValidationError::GateSecretFormat)
    }
}

/// Second-factor codes are exactly 6 digits.
///
/// # Errors
/// Returns `CodeFormat` on any other shape.
pub fn validate_code(code: &str) -> Result<(), ValidationError> {
    let matched = Regex::new(r"^[0-9]{6}$").is_ok_and(|pattern| pattern.is_match(code));
    if matched {
        Ok(())
    } else {
        Err(ValidationError::CodeFormat)
    }
}
