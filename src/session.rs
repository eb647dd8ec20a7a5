/**
 * Session Gate
 * Bearer-token session state, sign-in/out and server-side verification
 */
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::api::types::{AuthPayload, RegisterRequest, User};
use crate::api::{ApiError, AuthApi};
use crate::cache::LocalCache;

/// Cache slot holding the persisted session.
pub const SESSION_KEY: &str = "auth-storage";

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    pub refresh_token: String,
}

/// The token lives inside the non-anonymous variants, so "authenticated
/// without a token" is unrepresentable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SessionState {
    #[default]
    Anonymous,
    /// Token present but not yet confirmed by the server.
    PendingVerification {
        credentials: Credentials,
        user: Option<User>,
    },
    Authenticated {
        credentials: Credentials,
        user: User,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Anonymous,
    PendingVerification,
    Authenticated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub state: SessionState,
    pub last_login: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    pub fn status(&self) -> AuthStatus {
        match self.state {
            SessionState::Anonymous => AuthStatus::Anonymous,
            SessionState::PendingVerification { .. } => AuthStatus::PendingVerification,
            SessionState::Authenticated { .. } => AuthStatus::Authenticated,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match &self.state {
            SessionState::Anonymous => None,
            SessionState::PendingVerification { credentials, .. }
            | SessionState::Authenticated { credentials, .. } => Some(credentials),
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.credentials().map(|c| c.token.as_str())
    }

    pub fn user(&self) -> Option<&User> {
        match &self.state {
            SessionState::Anonymous => None,
            SessionState::PendingVerification { user, .. } => user.as_ref(),
            SessionState::Authenticated { user, .. } => Some(user),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignInError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account email is not verified")]
    Unverified,

    #[error("{0}")]
    Server(String),

    #[error("network failure: {0}")]
    Network(String),
}

impl From<ApiError> for SignInError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status: 401, .. } => SignInError::InvalidCredentials,
            ApiError::Status { status: 403, .. } => SignInError::Unverified,
            ApiError::Status { message, .. } => SignInError::Server(message),
            ApiError::Decode(message) => SignInError::Server(message),
            e @ (ApiError::Request(_) | ApiError::Timeout) => SignInError::Network(e.to_string()),
        }
    }
}

// ============================================================================
// Gate
// ============================================================================

/// Session service. Construct once at startup and share it behind an `Arc`.
pub struct SessionGate {
    api: Arc<dyn AuthApi>,
    cache: Arc<dyn LocalCache>,
    verify_timeout: Duration,
    session: RwLock<Session>,
}

impl SessionGate {
    /// Start anonymous, ignoring anything persisted.
    pub fn new(api: Arc<dyn AuthApi>, cache: Arc<dyn LocalCache>, verify_timeout: Duration) -> Self {
        Self {
            api,
            cache,
            verify_timeout,
            session: RwLock::new(Session::default()),
        }
    }

    /// Resume the persisted session. A stored token comes back unconfirmed.
    pub fn restore(
        api: Arc<dyn AuthApi>,
        cache: Arc<dyn LocalCache>,
        verify_timeout: Duration,
    ) -> Self {
        let session = match cache.read(SESSION_KEY) {
            Ok(Some(json)) => match serde_json::from_str::<Session>(&json) {
                Ok(session) => Self::unconfirmed(session),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding unreadable persisted session");
                    Session::default()
                }
            },
            Ok(None) => Session::default(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted session");
                Session::default()
            }
        };
        tracing::debug!(status = ?session.status(), "session restored");

        Self {
            api,
            cache,
            verify_timeout,
            session: RwLock::new(session),
        }
    }

    fn unconfirmed(session: Session) -> Session {
        let state = match session.state {
            SessionState::Authenticated { credentials, user } => {
                SessionState::PendingVerification {
                    credentials,
                    user: Some(user),
                }
            }
            other => other,
        };
        Session {
            state,
            last_login: session.last_login,
        }
    }

    pub async fn snapshot(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn status(&self) -> AuthStatus {
        self.session.read().await.status()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }

    pub async fn token(&self) -> Option<String> {
        self.session.read().await.token().map(str::to_string)
    }

    pub async fn user(&self) -> Option<User> {
        self.session.read().await.user().cloned()
    }

    /// Sign in with an email or username. Session is untouched on failure.
    pub async fn sign_in(&self, identifier: &str, password: &str) -> Result<User, SignInError> {
        match self.api.login(identifier, password).await {
            Ok(payload) => Ok(self.establish(payload).await),
            Err(e) => {
                let err = SignInError::from(e);
                tracing::warn!(identifier = %identifier, error = %err, "sign-in failed");
                Err(err)
            }
        }
    }

    /// Confirm the stored token with the server.
    ///
    /// * no token: forces anonymous, returns `false`
    /// * 200: refreshes the user, authenticated, returns `true`
    /// * 401: clears the session, returns `false`
    /// * anything else (including timeout): state untouched, returns `false`
    pub async fn check_auth_state(&self) -> bool {
        let token = self.session.read().await.token().map(str::to_string);
        let Some(token) = token else {
            self.clear_if(|s| s.token().is_none()).await;
            return false;
        };

        let result = match tokio::time::timeout(self.verify_timeout, self.api.check(&token)).await
        {
            Ok(result) => result,
            Err(_) => Err(ApiError::Timeout),
        };

        match result {
            Ok(user) => {
                let mut session = self.session.write().await;
                // Only confirm the token we actually checked.
                let credentials = match session.credentials() {
                    Some(c) if c.token == token => c.clone(),
                    _ => return false,
                };
                session.state = SessionState::Authenticated { credentials, user };
                self.persist(&session);
                tracing::debug!("session verified");
                true
            }
            Err(e) if e.is_unauthorized() => {
                tracing::info!("session rejected by server; signing out");
                self.clear_if(|s| s.token() == Some(token.as_str())).await;
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "session verification inconclusive; keeping state");
                false
            }
        }
    }

    /// Clear the session locally. Never touches the network.
    pub async fn sign_out(&self) {
        let mut session = self.session.write().await;
        *session = Session::default();
        self.persist(&session);
        tracing::info!("signed out");
    }

    /// Register a new, unverified account. Returns the server's message.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<String, SignInError> {
        let request = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.api.register(&request).await.map_err(|e| match e {
            // Registration has no credentials to be wrong about.
            ApiError::Status { message, .. } => SignInError::Server(message),
            other => SignInError::from(other),
        })?;
        tracing::info!(email = %response.email, "registration pending verification");
        Ok(response.message)
    }

    /// Confirm an emailed code; signs in on success.
    pub async fn verify_email(&self, email: &str, code: &str) -> Result<User, SignInError> {
        let payload = self.api.verify_email(email, code).await.map_err(|e| match e {
            ApiError::Status { message, .. } => SignInError::Server(message),
            other => SignInError::from(other),
        })?;
        Ok(self.establish(payload).await)
    }

    pub async fn resend_code(&self, email: &str) -> Result<(), SignInError> {
        self.api.resend_code(email).await.map_err(|e| match e {
            ApiError::Status { message, .. } => SignInError::Server(message),
            other => SignInError::from(other),
        })
    }

    /// Rotate the token pair. A rejected refresh token clears the session.
    pub async fn refresh(&self) -> bool {
        let current = match self.session.read().await.credentials() {
            Some(c) => c.clone(),
            None => return false,
        };

        match self.api.refresh(&current.refresh_token).await {
            Ok(rotated) => {
                let mut session = self.session.write().await;
                let credentials = Credentials {
                    token: rotated.token,
                    refresh_token: rotated.refresh_token,
                };
                let next = match &session.state {
                    SessionState::Authenticated { credentials: c, user }
                        if c.token == current.token =>
                    {
                        SessionState::Authenticated {
                            credentials,
                            user: user.clone(),
                        }
                    }
                    SessionState::PendingVerification { credentials: c, user }
                        if c.token == current.token =>
                    {
                        SessionState::PendingVerification {
                            credentials,
                            user: user.clone(),
                        }
                    }
                    _ => return false,
                };
                session.state = next;
                self.persist(&session);
                tracing::debug!("session tokens rotated");
                true
            }
            Err(e) if e.is_unauthorized() => {
                tracing::info!("refresh token rejected; signing out");
                self.clear_if(|s| s.token() == Some(current.token.as_str()))
                    .await;
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                false
            }
        }
    }

    // ---- private helpers ----

    async fn establish(&self, payload: AuthPayload) -> User {
        let mut session = self.session.write().await;
        *session = Session {
            state: SessionState::Authenticated {
                credentials: Credentials {
                    token: payload.token,
                    refresh_token: payload.refresh_token,
                },
                user: payload.user.clone(),
            },
            last_login: Some(Utc::now()),
        };
        self.persist(&session);
        tracing::info!(user_id = %payload.user.id, "signed in");
        payload.user
    }

    /// Reset to anonymous if the session still matches `predicate`.
    async fn clear_if(&self, predicate: impl Fn(&Session) -> bool) {
        let mut session = self.session.write().await;
        if predicate(&session) {
            *session = Session::default();
            self.persist(&session);
        }
    }

    fn persist(&self, session: &Session) {
        let result = match session.state {
            SessionState::Anonymous => self.cache.remove(SESSION_KEY),
            _ => match serde_json::to_string(session) {
                Ok(json) => self.cache.write(SESSION_KEY, &json),
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize session");
                    return;
                }
            },
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist session; sign-in will not survive a restart");
        }
    }
}
