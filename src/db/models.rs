//! Rows held by the in-memory store.

use chrono::{DateTime, Utc};

use crate::api::types::{PortfolioInput, PortfolioRecord, User};
use crate::template::TemplateKind;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
    pub verification_code: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
            is_verified: self.is_verified,
        }
    }
}

/// New account for insertion
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_verified: bool,
}

/// Refresh tokens are stored by SHA-256 hash, never in the clear.
#[derive(Debug, Clone)]
pub struct RefreshTokenRow {
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}

#[derive(Debug, Clone)]
pub struct PortfolioRow {
    pub id: String,
    pub user_id: String,
    pub template: TemplateKind,
    pub content: PortfolioInput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PortfolioRow {
    pub fn to_record(&self) -> PortfolioRecord {
        let mut content = self.content.clone();
        content.template_type = self.template.tag().to_string();
        PortfolioRecord {
            id: self.id.clone(),
            content,
            created_at: Some(self.created_at),
            updated_at: Some(self.updated_at),
        }
    }
}
