//! Environment-driven configuration for the dev backend and the editor
//! client. Values fall back to development defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Secret used when `JWT_SECRET` is unset. Never accepted in production.
pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT_SECRET must be set to a secure, unique value in production")]
    InsecureSecret,

    #[error("invalid bind address {0}")]
    InvalidAddress(String),
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Account created at startup, already verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub upload_dir: PathBuf,
    /// Prefix for URLs handed back by the upload endpoint.
    pub public_base_url: String,
    pub allowed_origins: Vec<String>,
    pub environment: String,
    pub seed_user: Option<SeedUser>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            access_token_minutes: 15,
            refresh_token_days: 7,
            upload_dir: PathBuf::from("uploads"),
            public_base_url: "http://127.0.0.1:3001".to_string(),
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
            environment: "development".to_string(),
            seed_user: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = env_or("HOST", &defaults.host);
        let port = env_parse("PORT", defaults.port);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .or_else(|| std::env::var("FRONTEND_ORIGIN").ok().map(|o| vec![o]))
            .unwrap_or(defaults.allowed_origins);

        let seed_user = match (
            std::env::var("SEED_USER_EMAIL"),
            std::env::var("SEED_USER_PASSWORD"),
        ) {
            (Ok(email), Ok(password)) if !email.is_empty() && !password.is_empty() => {
                Some(SeedUser {
                    username: env_or("SEED_USER_USERNAME", "demo"),
                    email,
                    password,
                })
            }
            _ => None,
        };

        Self {
            public_base_url: env_or("PUBLIC_BASE_URL", &format!("http://{host}:{port}")),
            host,
            port,
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET),
            access_token_minutes: env_parse("ACCESS_TOKEN_MINUTES", defaults.access_token_minutes),
            refresh_token_days: env_parse("REFRESH_TOKEN_DAYS", defaults.refresh_token_days),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", "uploads")),
            allowed_origins,
            environment: env_or("ENVIRONMENT", &defaults.environment),
            seed_user,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Refuse the default secret in production.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.is_production() && self.jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::InsecureSecret);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}

/// Settings for the editor core when it runs against a backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub cache_dir: PathBuf,
    pub upload_url: String,
    pub upload_preset: Option<String>,
    pub verify_timeout: Duration,
    pub route_debounce: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:3001".to_string(),
            cache_dir: PathBuf::from(".portfolio-cache"),
            upload_url: "http://127.0.0.1:3001/api/uploads".to_string(),
            upload_preset: None,
            verify_timeout: Duration::from_millis(5000),
            route_debounce: Duration::from_millis(100),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let api_url = env_or("PORTFOLIO_API_URL", &defaults.api_url);
        let upload_url = env_or(
            "UPLOAD_URL",
            &format!("{}/api/uploads", api_url.trim_end_matches('/')),
        );
        Self {
            cache_dir: PathBuf::from(env_or(
                "PORTFOLIO_CACHE_DIR",
                &defaults.cache_dir.to_string_lossy(),
            )),
            upload_preset: std::env::var("UPLOAD_PRESET").ok().filter(|p| !p.is_empty()),
            verify_timeout: Duration::from_millis(env_parse("AUTH_VERIFY_TIMEOUT_MS", 5000)),
            route_debounce: Duration::from_millis(env_parse("ROUTE_DEBOUNCE_MS", 100)),
            api_url,
            upload_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_secret_rejected_in_production() {
        let config = ServerConfig {
            environment: "production".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InsecureSecret)));

        let config = ServerConfig {
            jwt_secret: "a-real-secret".to_string(),
            ..config
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_secret_allowed_in_development() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr().unwrap().port(), 3001);
        let bad = ServerConfig {
            host: "not a host".to_string(),
            ..ServerConfig::default()
        };
        assert!(bad.bind_addr().is_err());
    }
}
