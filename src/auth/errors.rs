use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Field-level validation messages, keyed by field name.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was collected.
    pub fn into_result(self) -> Result<(), AccountError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AccountError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str(", ")?;
                }
                write!(f, "{} {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account not activated")]
    NotActivated,

    #[error("user not found")]
    NotFound,

    #[error("invalid or already used link")]
    InvalidLink,

    #[error("password reset has expired")]
    ExpiredToken,

    #[error("email delivery failed: {0}")]
    Delivery(#[source] anyhow::Error),

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("hashing error: {0}")]
    Hash(String),
}

/// Failures reported by a `UserStore`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,

    #[error("email already taken")]
    EmailTaken,

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::EmailTaken,
            other => StoreError::Backend(other.into()),
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AccountError::NotFound,
            StoreError::EmailTaken => {
                let mut errors = ValidationErrors::new();
                errors.add("email", "has already been taken");
                AccountError::Validation(errors)
            }
            StoreError::Backend(e) => AccountError::Store(e),
        }
    }
}
