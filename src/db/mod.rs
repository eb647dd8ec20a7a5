//! In-memory store behind the development backend.
//!
//! Stands in for the document database: users, refresh tokens and one
//! portfolio per (user, template).

pub mod models;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::types::PortfolioInput;
use crate::template::TemplateKind;
use models::{NewUser, PortfolioRow, RefreshTokenRow, UserRow};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DbError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Portfolio already exists for this template")]
    PortfolioExists { portfolio_id: String },

    #[error("Custom URL is already taken")]
    SlugTaken,

    #[error("Custom URL must be 3-50 characters of lowercase letters, digits or dashes")]
    InvalidSlug,

    #[error("Invalid verification code")]
    InvalidCode,

    #[error("Verification code has expired")]
    CodeExpired,

    #[error("Email is already verified")]
    AlreadyVerified,
}

/// Lowercase and validate a requested slug.
pub fn normalize_slug(slug: &str) -> Result<String, DbError> {
    let slug = slug.trim().to_lowercase();
    let valid = (3..=50).contains(&slug.len())
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');
    if valid {
        Ok(slug)
    } else {
        Err(DbError::InvalidSlug)
    }
}

#[derive(Debug, Default)]
pub struct Database {
    users: RwLock<HashMap<String, UserRow>>,
    refresh_tokens: RwLock<HashMap<String, RefreshTokenRow>>,
    portfolios: RwLock<HashMap<String, PortfolioRow>>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- users ----

    pub async fn insert_user(&self, new: NewUser) -> Result<UserRow, DbError> {
        let mut users = self.users.write().await;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(&new.email)) {
            return Err(DbError::DuplicateEmail);
        }
        if users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&new.username))
        {
            return Err(DbError::DuplicateUsername);
        }

        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: new.username,
            email: new.email.to_lowercase(),
            password_hash: new.password_hash,
            is_verified: new.is_verified,
            verification_code: None,
            verification_expires_at: None,
            created_at: Utc::now(),
        };
        users.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    pub async fn find_user(&self, id: &str) -> Option<UserRow> {
        self.users.read().await.get(id).cloned()
    }

    /// Look a user up by email or username, case-insensitively.
    pub async fn find_user_by_identifier(&self, identifier: &str) -> Option<UserRow> {
        let identifier = identifier.trim();
        self.users
            .read()
            .await
            .values()
            .find(|u| {
                u.email.eq_ignore_ascii_case(identifier) || u.username.eq_ignore_ascii_case(identifier)
            })
            .cloned()
    }

    pub async fn set_verification_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .ok_or(DbError::NotFound("User"))?;
        if user.is_verified {
            return Err(DbError::AlreadyVerified);
        }
        user.verification_code = Some(code.to_string());
        user.verification_expires_at = Some(expires_at);
        Ok(())
    }

    /// Consume a verification code and mark the account verified.
    pub async fn verify_email(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<UserRow, DbError> {
        let mut users = self.users.write().await;
        let user = users
            .values_mut()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .ok_or(DbError::NotFound("User"))?;
        if user.is_verified {
            return Err(DbError::AlreadyVerified);
        }
        if user.verification_code.as_deref() != Some(code.trim()) {
            return Err(DbError::InvalidCode);
        }
        if user.verification_expires_at.is_some_and(|at| at < now) {
            return Err(DbError::CodeExpired);
        }

        user.is_verified = true;
        user.verification_code = None;
        user.verification_expires_at = None;
        Ok(user.clone())
    }

    // ---- refresh tokens ----

    pub async fn store_refresh_token(&self, token_hash: String, row: RefreshTokenRow) {
        let mut tokens = self.refresh_tokens.write().await;
        // Drop what can never be used again.
        let now = Utc::now();
        tokens.retain(|_, t| !t.revoked && t.expires_at > now);
        tokens.insert(token_hash, row);
    }

    /// Revoke a live refresh token and return its owner.
    pub async fn consume_refresh_token(&self, token_hash: &str, now: DateTime<Utc>) -> Option<String> {
        let mut tokens = self.refresh_tokens.write().await;
        match tokens.get_mut(token_hash) {
            Some(row) if !row.revoked && row.expires_at > now => {
                row.revoked = true;
                Some(row.user_id.clone())
            }
            _ => None,
        }
    }

    // ---- portfolios ----

    pub async fn find_portfolio(&self, user_id: &str, template: TemplateKind) -> Option<PortfolioRow> {
        self.portfolios
            .read()
            .await
            .values()
            .find(|p| p.user_id == user_id && p.template == template)
            .cloned()
    }

    /// Insert unless the user already has a record for `template`. The
    /// check and the insert happen under one write lock.
    pub async fn create_portfolio(
        &self,
        user_id: &str,
        template: TemplateKind,
        content: PortfolioInput,
    ) -> Result<PortfolioRow, DbError> {
        let mut portfolios = self.portfolios.write().await;
        if let Some(existing) = portfolios
            .values()
            .find(|p| p.user_id == user_id && p.template == template)
        {
            return Err(DbError::PortfolioExists {
                portfolio_id: existing.id.clone(),
            });
        }

        let now = Utc::now();
        let mut content = content;
        // Slugs are only assigned through the custom-url claim.
        content.custom_url = None;
        let row = PortfolioRow {
            id: Uuid::new_v4().simple().to_string(),
            user_id: user_id.to_string(),
            template,
            content,
            created_at: now,
            updated_at: now,
        };
        portfolios.insert(row.id.clone(), row.clone());
        Ok(row)
    }

    pub async fn update_portfolio(
        &self,
        user_id: &str,
        template: TemplateKind,
        id: &str,
        content: PortfolioInput,
    ) -> Result<PortfolioRow, DbError> {
        let mut portfolios = self.portfolios.write().await;
        let row = portfolios
            .get_mut(id)
            .filter(|p| p.user_id == user_id && p.template == template)
            .ok_or(DbError::NotFound("Portfolio"))?;

        let custom_url = row.content.custom_url.take();
        row.content = PortfolioInput {
            custom_url,
            ..content
        };
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    /// Assign `slug` to the user's record for `template`.
    pub async fn claim_custom_url(
        &self,
        user_id: &str,
        template: TemplateKind,
        slug: &str,
    ) -> Result<String, DbError> {
        let slug = normalize_slug(slug)?;
        let mut portfolios = self.portfolios.write().await;

        let owner = portfolios
            .values()
            .find(|p| p.user_id == user_id && p.template == template)
            .map(|p| p.id.clone())
            .ok_or(DbError::NotFound("Portfolio"))?;
        if portfolios
            .values()
            .any(|p| p.id != owner && p.content.custom_url.as_deref() == Some(slug.as_str()))
        {
            return Err(DbError::SlugTaken);
        }

        if let Some(row) = portfolios.get_mut(&owner) {
            row.content.custom_url = Some(slug.clone());
            row.updated_at = Utc::now();
        }
        Ok(slug)
    }

    pub async fn portfolio_count(&self) -> usize {
        self.portfolios.read().await.len()
    }
}
