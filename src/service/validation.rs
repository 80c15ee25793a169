//! Contact-detail validators used by request DTOs and the OTP flow.

use regex::Regex;
use std::sync::LazyLock;
use validator::ValidationError;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$",
    )
    .expect("email pattern must compile")
});

const COUNTRY_CODE: &str = "91";

fn digits_only(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

fn is_mobile_number(digits: &str) -> bool {
    digits.len() == 10 && matches!(digits.as_bytes()[0], b'6'..=b'9')
}

pub fn validate_email(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}

/// Lowercased, trimmed e-mail. OTP records and verification tokens are keyed on this form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Accepts a 10-digit mobile number starting with 6-9, optionally prefixed with
/// country code 91. Separators such as spaces, dashes, `+` and parentheses are ignored.
pub fn validate_indian_phone(phone: &str) -> bool {
    format_indian_phone(phone).is_some()
}

/// Canonical 10-digit form of an Indian mobile number, or `None` when invalid.
pub fn format_indian_phone(phone: &str) -> Option<String> {
    let digits = digits_only(phone);
    let local = match digits.len() {
        10 => digits.as_str(),
        12 => digits.strip_prefix(COUNTRY_CODE)?,
        _ => return None,
    };

    is_mobile_number(local).then(|| local.to_string())
}

/// Six digits, first digit 1-9.
pub fn validate_indian_postal_code(code: &str) -> bool {
    code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) && code.as_bytes()[0] != b'0'
}

pub fn check_email(email: &str) -> Result<(), ValidationError> {
    if validate_email(email) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_email").with_message("Invalid email format".into()))
    }
}

pub fn check_indian_phone(phone: &str) -> Result<(), ValidationError> {
    if validate_indian_phone(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone").with_message("Invalid Indian phone number (10 digits starting with 6-9)".into()))
    }
}

pub fn check_indian_postal_code(code: &str) -> Result<(), ValidationError> {
    if validate_indian_postal_code(code) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_postal_code").with_message("Invalid PIN code (6 digits)".into()))
    }
}
