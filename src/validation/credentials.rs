use crate::core::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex is valid"));

/// Login form input after local checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Trimmed and lower-cased
    pub email: String,
    pub password: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

impl Credentials {
    pub fn validate(email: &str, password: &str) -> Result<Self, ValidationError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::MissingEmail);
        }
        if !is_valid_email(email) {
            return Err(ValidationError::InvalidEmail);
        }
        if password.is_empty() {
            return Err(ValidationError::MissingPassword);
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }

        Ok(Self {
            email: email.to_lowercase(),
            password: password.to_string(),
        })
    }
}
