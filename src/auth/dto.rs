use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::errors::ValidationErrors;
use crate::auth::repo_types::{NewUser, User};

/// Request body for signup.
#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub password_confirmation: Option<String>,
}

impl From<SignupRequest> for NewUser {
    fn from(r: SignupRequest) -> Self {
        Self {
            name: r.name,
            email: r.email,
            password: r.password,
            password_confirmation: r.password_confirmation,
        }
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub user_id: Uuid,
}

/// Restore a session from a remembered token.
#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub user_id: Uuid,
    pub remember_token: String,
}

/// `?email=` on activation and reset links.
#[derive(Debug, Deserialize)]
pub struct EmailQuery {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct PasswordUpdateRequest {
    pub email: String,
    pub password: String,
    pub password_confirmation: Option<String>,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub activated: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub activated_at: Option<OffsetDateTime>,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            name: u.name.clone(),
            email: u.email.clone(),
            activated: u.activated,
            activated_at: u.activated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub user: PublicUser,
    pub activation_email_sent: bool,
}

/// Response returned after login. The remember token is only present when
/// `remember_me` was requested.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: PublicUser,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remember_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<ValidationErrors>,
}
