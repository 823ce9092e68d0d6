use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::errors::ValidationErrors;

pub const NAME_MAX: usize = 50;
pub const EMAIL_MAX: usize = 255;
pub const PASSWORD_MIN: usize = 5;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex =
            Regex::new(r"(?i)^[a-z0-9_+.\-]+@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_string()
}

pub fn validate_name(name: &str, errors: &mut ValidationErrors) {
    if name.trim().is_empty() {
        errors.add("name", "can't be blank");
    } else if name.chars().count() > NAME_MAX {
        errors.add("name", format!("is too long (maximum is {NAME_MAX} characters)"));
    }
}

/// Presence, length and format. Uniqueness needs the store and is checked by
/// the caller.
pub fn validate_email(email: &str, errors: &mut ValidationErrors) {
    if email.trim().is_empty() {
        errors.add("email", "can't be blank");
        return;
    }
    if email.chars().count() > EMAIL_MAX {
        errors.add("email", format!("is too long (maximum is {EMAIL_MAX} characters)"));
    }
    if !is_valid_email(email) {
        errors.add("email", "is invalid");
    }
}

/// Whitespace-only passwords count as blank.
pub fn validate_password(
    password: &str,
    confirmation: Option<&str>,
    errors: &mut ValidationErrors,
) {
    if password.trim().is_empty() {
        errors.add("password", "can't be blank");
    } else if password.chars().count() < PASSWORD_MIN {
        errors.add(
            "password",
            format!("is too short (minimum is {PASSWORD_MIN} characters)"),
        );
    }
    if let Some(confirmation) = confirmation {
        if confirmation != password {
            errors.add("password_confirmation", "doesn't match Password");
        }
    }
}
