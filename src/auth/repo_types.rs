use serde::Deserialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::token::Purpose;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String, // always lowercase
    pub password_digest: String,
    pub activated: bool,
    pub activated_at: Option<OffsetDateTime>,
    pub activation_digest: String,
    pub remember_digest: Option<String>,
    pub reset_digest: Option<String>,
    pub reset_sent_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Stored digest for the given token purpose.
    pub fn digest_for(&self, purpose: Purpose) -> Option<&str> {
        match purpose {
            Purpose::Remember => self.remember_digest.as_deref(),
            Purpose::Activation => Some(self.activation_digest.as_str()),
            Purpose::Reset => self.reset_digest.as_deref(),
        }
    }

    /// Mirror a committed write onto the in-memory record.
    pub fn apply(&mut self, change: &UserChange, now: OffsetDateTime) {
        match change {
            UserChange::Name(name) => self.name = name.clone(),
            UserChange::Email(email) => self.email = email.clone(),
            UserChange::PasswordDigest(digest) => self.password_digest = digest.clone(),
            UserChange::Activated { at } => {
                self.activated = true;
                self.activated_at = Some(*at);
            }
            UserChange::RememberDigest(digest) => self.remember_digest = digest.clone(),
            UserChange::ResetDigest { digest, sent_at } => {
                self.reset_digest = Some(digest.clone());
                self.reset_sent_at = Some(*sent_at);
            }
        }
        self.updated_at = now;
    }
}

/// A single column-level write. Fields that must change together share a
/// variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserChange {
    Name(String),
    Email(String),
    PasswordDigest(String),
    Activated { at: OffsetDateTime },
    RememberDigest(Option<String>),
    ResetDigest { digest: String, sent_at: OffsetDateTime },
}

/// Signup input.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: Option<String>,
}

/// Profile edit input. `None` leaves a field as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}
