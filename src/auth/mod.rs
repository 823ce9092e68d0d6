use crate::state::AppState;
use axum::Router;

pub mod dto;
pub mod errors;
pub mod handlers;
#[cfg(test)]
pub mod memory;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod token;
pub mod validation;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::account_routes())
        .merge(handlers::session_routes())
        .merge(handlers::password_reset_routes())
}
