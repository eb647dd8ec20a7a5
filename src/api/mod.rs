//! REST client for the portfolio backend.
//!
//! [`AuthApi`] and [`PortfolioApi`] are the seams the session gate and the
//! submission orchestrator talk through; [`ApiClient`] implements both with
//! [`reqwest`].

pub mod types;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::template::TemplateKind;
use types::{
    AuthPayload, CheckResponse, CustomUrlRequest, CustomUrlResponse, ErrorBody, LoginRequest,
    PortfolioInput, PortfolioRecord, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, ResendCodeRequest, User, VerifyEmailRequest,
};

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("request timed out")]
    Timeout,

    /// Non-2xx status with the server-provided message.
    #[error("server responded with {status}: {message}")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Transport-level failure: nothing meaningful came back from the server.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Request(_) | ApiError::Timeout)
    }
}

/// Result of a create call.
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(PortfolioRecord),
    /// 409: a record already exists for this user and template.
    AlreadyExists { portfolio_id: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CustomUrlOutcome {
    Assigned(String),
    Taken,
}

#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthPayload, ApiError>;
    async fn check(&self, token: &str) -> Result<User, ApiError>;
    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError>;
    async fn verify_email(&self, email: &str, code: &str) -> Result<AuthPayload, ApiError>;
    async fn resend_code(&self, email: &str) -> Result<(), ApiError>;
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;
}

#[async_trait]
pub trait PortfolioApi: Send + Sync {
    /// `Ok(None)` when the user has no record for this template yet.
    async fn fetch(
        &self,
        token: &str,
        template: TemplateKind,
    ) -> Result<Option<PortfolioRecord>, ApiError>;

    async fn create(
        &self,
        token: &str,
        template: TemplateKind,
        input: &PortfolioInput,
    ) -> Result<CreateOutcome, ApiError>;

    async fn update(
        &self,
        token: &str,
        template: TemplateKind,
        id: &str,
        input: &PortfolioInput,
    ) -> Result<PortfolioRecord, ApiError>;

    async fn claim_custom_url(
        &self,
        token: &str,
        template: TemplateKind,
        slug: &str,
    ) -> Result<CustomUrlOutcome, ApiError>;
}

/// HTTP client for one backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// * `base_url` - backend origin, e.g. `http://localhost:3001`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn portfolio_url(&self, template: TemplateKind) -> String {
        self.url(&format!("/api/portfolios/{}", template.tag()))
    }

    // ---- private helpers ----

    /// Turn a non-2xx response into [`ApiError::Status`], preferring the
    /// `{message}` body and falling back to the raw text.
    async fn status_error(response: reqwest::Response) -> ApiError {
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .map(|b| b.message)
            .filter(|m| !m.is_empty())
            .unwrap_or(text);
        ApiError::Status { status, message }
    }

    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::status_error(response).await)
        }
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Accept `{portfolio: {...}}` or the bare record.
    fn decode_record(value: serde_json::Value) -> Result<PortfolioRecord, ApiError> {
        let record = match value {
            serde_json::Value::Object(mut map) if map.contains_key("portfolio") => map
                .remove("portfolio")
                .unwrap_or(serde_json::Value::Null),
            other => other,
        };
        serde_json::from_value(record).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, identifier: &str, password: &str) -> Result<AuthPayload, ApiError> {
        let body = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let response = self
            .client
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn check(&self, token: &str) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url("/auth/check"))
            .bearer_auth(token)
            .send()
            .await?;
        let body: CheckResponse = Self::parse_response(response).await?;
        Ok(body.user)
    }

    async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/auth/register"))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn verify_email(&self, email: &str, code: &str) -> Result<AuthPayload, ApiError> {
        let body = VerifyEmailRequest {
            email: email.to_string(),
            code: code.to_string(),
        };
        let response = self
            .client
            .post(self.url("/auth/verify-email"))
            .json(&body)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn resend_code(&self, email: &str) -> Result<(), ApiError> {
        let body = ResendCodeRequest {
            email: email.to_string(),
        };
        let response = self
            .client
            .post(self.url("/auth/resend-code"))
            .json(&body)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        let response = self
            .client
            .post(self.url("/auth/refresh"))
            .json(&body)
            .send()
            .await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl PortfolioApi for ApiClient {
    async fn fetch(
        &self,
        token: &str,
        template: TemplateKind,
    ) -> Result<Option<PortfolioRecord>, ApiError> {
        let response = self
            .client
            .get(self.portfolio_url(template))
            .bearer_auth(token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(template = %template, "no portfolio stored yet");
            return Ok(None);
        }
        let value: serde_json::Value = Self::parse_response(response).await?;
        Self::decode_record(value).map(Some)
    }

    async fn create(
        &self,
        token: &str,
        template: TemplateKind,
        input: &PortfolioInput,
    ) -> Result<CreateOutcome, ApiError> {
        let response = self
            .client
            .post(self.portfolio_url(template))
            .bearer_auth(token)
            .json(input)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            let body: ErrorBody = response.json().await.unwrap_or_default();
            tracing::info!(
                template = %template,
                portfolio_id = ?body.portfolio_id,
                "portfolio already exists"
            );
            return Ok(CreateOutcome::AlreadyExists {
                portfolio_id: body.portfolio_id.filter(|id| !id.is_empty()),
            });
        }

        let value: serde_json::Value = Self::parse_response(response).await?;
        Self::decode_record(value).map(CreateOutcome::Created)
    }

    async fn update(
        &self,
        token: &str,
        template: TemplateKind,
        id: &str,
        input: &PortfolioInput,
    ) -> Result<PortfolioRecord, ApiError> {
        let response = self
            .client
            .put(format!("{}/{}", self.portfolio_url(template), id))
            .bearer_auth(token)
            .json(input)
            .send()
            .await?;
        let value: serde_json::Value = Self::parse_response(response).await?;
        Self::decode_record(value)
    }

    async fn claim_custom_url(
        &self,
        token: &str,
        template: TemplateKind,
        slug: &str,
    ) -> Result<CustomUrlOutcome, ApiError> {
        let body = CustomUrlRequest {
            template_type: template.tag().to_string(),
            custom_url: slug.to_string(),
        };
        let response = self
            .client
            .post(self.url("/api/portfolios/custom-url"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            return Ok(CustomUrlOutcome::Taken);
        }
        let body: CustomUrlResponse = Self::parse_response(response).await?;
        if body.available {
            Ok(CustomUrlOutcome::Assigned(body.custom_url))
        } else {
            Ok(CustomUrlOutcome::Taken)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:3001/");
        assert_eq!(
            client.portfolio_url(TemplateKind::One),
            "http://localhost:3001/api/portfolios/template1"
        );
    }

    #[test]
    fn test_decode_record_accepts_envelope_and_bare_body() {
        let wrapped = ApiClient::decode_record(json!({"portfolio": {"_id": "abc123"}})).unwrap();
        assert_eq!(wrapped.id, "abc123");
        let bare = ApiClient::decode_record(json!({"_id": "def456", "title": "T"})).unwrap();
        assert_eq!(bare.id, "def456");
        assert_eq!(bare.content.title, "T");
    }

    #[test]
    fn test_error_classification() {
        let err = ApiError::Status {
            status: 401,
            message: "expired".into(),
        };
        assert!(err.is_unauthorized());
        assert!(!err.is_network());
        assert!(ApiError::Timeout.is_network());
    }
}
