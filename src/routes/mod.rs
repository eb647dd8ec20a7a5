/**
 * Routes Module
 * API route handlers for the development backend
 */

pub mod auth;
pub mod health;
pub mod portfolio;
pub mod upload;

use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::db::{Database, DbError};

/// Shared `{message}` error body.
pub use crate::api::types::ErrorBody as ErrorResponse;

pub type HandlerError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub db: Arc<Database>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            db: Arc::new(Database::new()),
        }
    }
}

pub fn error(status: StatusCode, message: impl Into<String>) -> HandlerError {
    (status, Json(ErrorResponse::new(message)))
}

pub fn db_error(err: DbError) -> HandlerError {
    let status = match &err {
        DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::DuplicateEmail
        | DbError::DuplicateUsername
        | DbError::PortfolioExists { .. }
        | DbError::SlugTaken => StatusCode::CONFLICT,
        DbError::InvalidSlug
        | DbError::InvalidCode
        | DbError::CodeExpired
        | DbError::AlreadyVerified => StatusCode::BAD_REQUEST,
    };
    let mut body = ErrorResponse::new(err.to_string());
    if let DbError::PortfolioExists { portfolio_id } = err {
        body.portfolio_id = Some(portfolio_id);
    }
    (status, Json(body))
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

/// Resolve the caller's user id from a valid access token.
pub fn require_user(state: &AppState, headers: &HeaderMap) -> Result<String, HandlerError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Authorization required"))?;
    auth::verify_access_token(&state.config.jwt_secret, &token)
        .map(|claims| claims.sub)
        .map_err(|_| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}
