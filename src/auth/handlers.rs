use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            EmailQuery, ErrorResponse, LoginRequest, LoginResponse, LogoutRequest,
            PasswordResetRequest, PasswordUpdateRequest, PublicUser, RecallRequest,
            SignupRequest, SignupResponse,
        },
        errors::AccountError,
    },
    state::AppState,
};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn reject(e: AccountError) -> ApiError {
    let status = match &e {
        AccountError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AccountError::InvalidCredentials | AccountError::InvalidLink => StatusCode::UNAUTHORIZED,
        AccountError::NotActivated => StatusCode::FORBIDDEN,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::ExpiredToken => StatusCode::GONE,
        AccountError::Delivery(_) | AccountError::Store(_) | AccountError::Hash(_) => {
            error!(error = %e, "account operation failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "internal error".into(),
                    fields: None,
                }),
            );
        }
    };
    let (error, fields) = match e {
        AccountError::Validation(fields) => ("validation failed".to_string(), Some(fields)),
        other => (other.to_string(), None),
    };
    (status, Json(ErrorResponse { error, fields }))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/account_activations/:token/edit", get(activate))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/sessions/recall", post(recall))
}

pub fn password_reset_routes() -> Router<AppState> {
    Router::new()
        .route("/password_resets", post(create_password_reset))
        .route("/password_resets/:token/edit", get(edit_password_reset))
        .route("/password_resets/:token", patch(update_password))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupResponse>), ApiError> {
    let issued = state.accounts.sign_up(payload.into()).await.map_err(reject)?;
    info!(user_id = %issued.user.id, "signup complete, activation pending");
    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            user: PublicUser::from(&issued.user),
            activation_email_sent: issued.delivered,
        }),
    ))
}

#[instrument(skip(state, token))]
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(q): Query<EmailQuery>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .accounts
        .activate(&q.email, &token)
        .await
        .map_err(reject)?;
    Ok(Json(PublicUser::from(&user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let session = state
        .accounts
        .log_in(&payload.email, &payload.password, payload.remember_me)
        .await
        .map_err(reject)?;
    Ok(Json(LoginResponse {
        user: PublicUser::from(&session.user),
        remember_token: session.remember_token.map(|t| t.into_string()),
    }))
}

#[instrument(skip(state))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .accounts
        .log_out(payload.user_id)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, payload))]
pub async fn recall(
    State(state): State<AppState>,
    Json(payload): Json<RecallRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    match state
        .accounts
        .recall(payload.user_id, &payload.remember_token)
        .await
        .map_err(reject)?
    {
        Some(user) => Ok(Json(PublicUser::from(&user))),
        None => Err(reject(AccountError::InvalidCredentials)),
    }
}

/// Always 202 so the response does not reveal which emails exist.
#[instrument(skip(state, payload))]
pub async fn create_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> Result<StatusCode, ApiError> {
    match state.accounts.request_password_reset(&payload.email).await {
        Ok(issued) => {
            info!(user_id = %issued.user.id, delivered = issued.delivered, "password reset issued");
            Ok(StatusCode::ACCEPTED)
        }
        Err(AccountError::NotFound) => {
            warn!("password reset for unknown email");
            Ok(StatusCode::ACCEPTED)
        }
        Err(e) => Err(reject(e)),
    }
}

#[instrument(skip(state, token))]
pub async fn edit_password_reset(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(q): Query<EmailQuery>,
) -> Result<StatusCode, ApiError> {
    state
        .accounts
        .check_reset_link(&q.email, &token)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, token, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<PasswordUpdateRequest>,
) -> Result<Json<PublicUser>, ApiError> {
    let user = state
        .accounts
        .reset_password(
            &payload.email,
            &token,
            &payload.password,
            payload.password_confirmation.as_deref(),
        )
        .await
        .map_err(reject)?;
    Ok(Json(PublicUser::from(&user)))
}
