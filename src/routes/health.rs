/**
 * Health Routes
 * Liveness ping for the development backend
 */
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::routes::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub portfolios: usize,
}

/// GET /health
pub async fn health_ping(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        environment: state.config.environment.clone(),
        portfolios: state.db.portfolio_count().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{send, test_state};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        let app = Router::new()
            .route("/health", get(health_ping))
            .with_state(test_state());
        let (status, body) = send(app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["portfolios"], 0);
    }
}
