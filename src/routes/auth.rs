/**
 * Authentication Routes
 * Registration with email verification, login, session check and refresh
 */
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::api::types::{
    AuthPayload, CheckResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, ResendCodeRequest, VerifyEmailRequest,
};
use crate::config::{SeedUser, ServerConfig};
use crate::db::models::{NewUser, RefreshTokenRow, UserRow};
use crate::routes::{db_error, error, extract_bearer_token, AppState, ErrorResponse, HandlerError};

/// Verification codes expire after this many minutes
const VERIFICATION_CODE_MINUTES: i64 = 15;

const MIN_PASSWORD_LEN: usize = 8;

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,   // User ID
    pub email: String, // User email
    pub exp: i64,      // Expiry timestamp
    pub iat: i64,      // Issued at timestamp
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Generate a random refresh token
fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

fn generate_verification_code() -> String {
    format!("{:06}", rand::rng().random_range(0..1_000_000))
}

/// Hash a refresh token for storage using SHA-256.
fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Create access token
pub fn create_access_token(
    config: &ServerConfig,
    user_id: &str,
    email: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(config.access_token_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// bcrypt is CPU-bound; keep it off the async workers.
pub async fn hash_password(password: String) -> Result<String, HandlerError> {
    match tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST)).await {
        Ok(Ok(h)) => Ok(h),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "failed to hash password");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password"))
        }
        Err(e) => {
            tracing::error!(error = %e, "spawn_blocking panic during hash");
            Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to process password"))
        }
    }
}

async fn password_matches(password: String, password_hash: String) -> bool {
    tokio::task::spawn_blocking(move || verify(password, &password_hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

/// Mint an access token plus a fresh refresh token for `user`.
async fn issue_tokens(state: &AppState, user: &UserRow) -> Result<AuthPayload, HandlerError> {
    let token = create_access_token(&state.config, &user.id, &user.email).map_err(|e| {
        tracing::error!(error = %e, "failed to create access token");
        error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to create token")
    })?;

    let refresh_token = generate_refresh_token();
    state
        .db
        .store_refresh_token(
            hash_refresh_token(&refresh_token),
            RefreshTokenRow {
                user_id: user.id.clone(),
                expires_at: Utc::now() + Duration::days(state.config.refresh_token_days),
                revoked: false,
            },
        )
        .await;

    Ok(AuthPayload {
        user: user.to_user(),
        token,
        refresh_token,
    })
}

/// Issue a code for `email`. Mail delivery is out of scope here, so the
/// code goes to the log.
async fn send_verification_code(state: &AppState, email: &str) -> Result<(), HandlerError> {
    let code = generate_verification_code();
    let expires_at = Utc::now() + Duration::minutes(VERIFICATION_CODE_MINUTES);
    state
        .db
        .set_verification_code(email, &code, expires_at)
        .await
        .map_err(db_error)?;
    tracing::info!(email = %email, code = %code, "verification code issued");
    Ok(())
}

/// Create the configured verified account unless it already exists.
pub async fn seed_user(state: &AppState, seed: &SeedUser) {
    if state.db.find_user_by_identifier(&seed.email).await.is_some() {
        return;
    }
    let Ok(password_hash) = hash_password(seed.password.clone()).await else {
        return;
    };
    match state
        .db
        .insert_user(NewUser {
            username: seed.username.clone(),
            email: seed.email.clone(),
            password_hash,
            is_verified: true,
        })
        .await
    {
        Ok(user) => tracing::info!(user_id = %user.id, email = %user.email, "seed user created"),
        Err(e) => tracing::warn!(error = %e, "failed to create seed user"),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    if username.is_empty() || email.is_empty() || payload.password.is_empty() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Username, email and password are required",
        ));
    }
    if !email.contains('@') {
        return Err(error(StatusCode::BAD_REQUEST, "Invalid email format"));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Password must be at least 8 characters long",
        ));
    }

    let password_hash = hash_password(payload.password).await?;
    let user = state
        .db
        .insert_user(NewUser {
            username,
            email: email.clone(),
            password_hash,
            is_verified: false,
        })
        .await
        .map_err(db_error)?;
    send_verification_code(&state, &user.email).await?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Registration successful. Check your email for a verification code.".to_string(),
            email,
        }),
    ))
}

/// POST /auth/verify-email
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<AuthPayload>, HandlerError> {
    if payload.email.trim().is_empty() || payload.code.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Email and code are required"));
    }
    let user = state
        .db
        .verify_email(&payload.email, &payload.code, Utc::now())
        .await
        .map_err(db_error)?;

    tracing::info!(user_id = %user.id, "email verified");
    Ok(Json(issue_tokens(&state, &user).await?))
}

/// POST /auth/resend-code
pub async fn resend_code(
    State(state): State<AppState>,
    Json(payload): Json<ResendCodeRequest>,
) -> Result<Json<MessageResponse>, HandlerError> {
    send_verification_code(&state, payload.email.trim()).await?;
    Ok(Json(MessageResponse {
        message: "Verification code sent".to_string(),
    }))
}

/// POST /auth/login
/// Authenticate by email or username
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthPayload>, HandlerError> {
    if payload.identifier.trim().is_empty() || payload.password.is_empty() {
        return Err(error(
            StatusCode::BAD_REQUEST,
            "Email or username and password are required",
        ));
    }

    // Same answer for unknown users and wrong passwords.
    let invalid = || {
        tracing::warn!(identifier = %payload.identifier, "failed login attempt");
        error(StatusCode::UNAUTHORIZED, "Invalid credentials")
    };
    let user = state
        .db
        .find_user_by_identifier(&payload.identifier)
        .await
        .ok_or_else(invalid)?;
    if !password_matches(payload.password.clone(), user.password_hash.clone()).await {
        return Err(invalid());
    }

    if !user.is_verified {
        let body = ErrorResponse {
            needs_verification: Some(true),
            ..ErrorResponse::new("Please verify your email before signing in")
        };
        return Err((StatusCode::FORBIDDEN, Json(body)));
    }

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(issue_tokens(&state, &user).await?))
}

/// GET /auth/check
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CheckResponse>, HandlerError> {
    let claims = extract_bearer_token(&headers)
        .and_then(|token| verify_access_token(&state.config.jwt_secret, &token).ok())
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid or expired token"))?;

    let user = state
        .db
        .find_user(&claims.sub)
        .await
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "User no longer exists"))?;
    Ok(Json(CheckResponse {
        user: user.to_user(),
    }))
}

/// POST /auth/refresh
/// Rotate the refresh token and mint a new access token
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, HandlerError> {
    if payload.refresh_token.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Refresh token is required"));
    }

    let token_hash = hash_refresh_token(&payload.refresh_token);
    let user_id = state
        .db
        .consume_refresh_token(&token_hash, Utc::now())
        .await
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token"))?;
    let user = state
        .db
        .find_user(&user_id)
        .await
        .ok_or_else(|| error(StatusCode::UNAUTHORIZED, "Invalid or expired refresh token"))?;

    let issued = issue_tokens(&state, &user).await?;
    Ok(Json(RefreshResponse {
        token: issued.token,
        refresh_token: issued.refresh_token,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{send, signed_in_user, test_state};
    use axum::routing::{get, post};
    use axum::Router;
    use serde_json::json;

    fn auth_router(state: AppState) -> Router {
        Router::new()
            .route("/auth/register", post(register))
            .route("/auth/verify-email", post(verify_email))
            .route("/auth/resend-code", post(resend_code))
            .route("/auth/login", post(login))
            .route("/auth/check", get(check))
            .route("/auth/refresh", post(refresh))
            .with_state(state)
    }

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token("secret", "invalid.jwt.token").is_err());
    }

    #[test]
    fn test_verification_code_is_six_digits() {
        let code = generate_verification_code();
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_register_rejects_short_password() {
        let (status, body) = send(
            auth_router(test_state()),
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "jane", "email": "jane@x.com", "password": "short"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap().contains("8 characters"));
    }

    #[tokio::test]
    async fn test_register_verify_login_flow() {
        let state = test_state();
        let app = auth_router(state.clone());
        let credentials = json!({"identifier": "jane", "password": "password123"});

        let (status, body) = send(
            app.clone(),
            "POST",
            "/auth/register",
            None,
            Some(json!({"username": "jane", "email": "Jane@X.com", "password": "password123"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["email"], "jane@x.com");

        // Unverified accounts are told to verify.
        let (status, body) = send(app.clone(), "POST", "/auth/login", None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["needsVerification"], true);

        let code = state
            .db
            .find_user_by_identifier("jane")
            .await
            .unwrap()
            .verification_code
            .unwrap();
        let (status, body) = send(
            app.clone(),
            "POST",
            "/auth/verify-email",
            None,
            Some(json!({"email": "jane@x.com", "code": code})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["isVerified"], true);

        let (status, body) = send(app, "POST", "/auth/login", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
        assert!(body["refreshToken"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_login_wrong_credentials_returns_unauthorized() {
        let (status, body) = send(
            auth_router(test_state()),
            "POST",
            "/auth/login",
            None,
            Some(json!({"identifier": "nobody@example.com", "password": "wrongpassword"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Invalid credentials");
    }

    #[tokio::test]
    async fn test_check_with_bad_token_is_unauthorized() {
        let (status, _) = send(
            auth_router(test_state()),
            "GET",
            "/auth/check",
            Some("not-a-token"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_check_returns_user() {
        let state = test_state();
        let (_, token) = signed_in_user(&state, "jane").await;
        let (status, body) = send(auth_router(state), "GET", "/auth/check", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["username"], "jane");
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_revokes() {
        let state = test_state();
        let (user_id, _) = signed_in_user(&state, "jane").await;
        let user = state.db.find_user(&user_id).await.unwrap();
        let issued = issue_tokens(&state, &user).await.unwrap();
        let app = auth_router(state);

        let (status, body) = send(
            app.clone(),
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": issued.refresh_token})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(body["refreshToken"], json!(issued.refresh_token));

        let (status, _) = send(
            app,
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": issued.refresh_token})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_empty_token_returns_bad_request() {
        let (status, _) = send(
            auth_router(test_state()),
            "POST",
            "/auth/refresh",
            None,
            Some(json!({"refreshToken": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
