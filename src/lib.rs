//! Portfolio Builder - editor core and development backend
//!
//! The editor core (draft store, reconciliation, session gate, route
//! gating, submission and image upload) talks to a REST backend through
//! [`api::ApiClient`]. The same crate ships an axum backend that serves
//! that contract from memory for local development and tests.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod draft;
pub mod editor;
pub mod logging;
pub mod reconcile;
pub mod routes;
pub mod routing;
pub mod session;
pub mod submit;
pub mod template;
pub mod upload;

use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use config::ServerConfig;
use routes::AppState;

/// Request bodies above this are rejected before buffering.
const MAX_BODY_BYTES: usize = upload::MAX_IMAGE_BYTES + 1024 * 1024;

/// CORS for the configured frontend origins.
pub fn configure_cors(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors(&state.config);
    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route("/auth/resend-code", post(routes::auth::resend_code))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/check", get(routes::auth::check))
        .route("/auth/refresh", post(routes::auth::refresh))
        .route(
            "/api/portfolios/custom-url",
            post(routes::portfolio::claim_custom_url),
        )
        .route(
            "/api/portfolios/{template}",
            get(routes::portfolio::get_portfolio).post(routes::portfolio::create_portfolio),
        )
        .route(
            "/api/portfolios/{template}/{id}",
            put(routes::portfolio::update_portfolio),
        )
        .route("/api/uploads", post(routes::upload::upload_image))
        .route("/health", get(routes::health::health_ping))
        .nest_service("/uploads", uploads)
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(cors)
}

/// Seed configured accounts, then serve `state` on `listener` until the
/// server stops.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Some(seed) = state.config.seed_user.clone() {
        routes::auth::seed_user(&state, &seed).await;
    }
    let app = create_app(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

/// Run the server (used by main).
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env();

    // Held for the process lifetime so buffered log lines are flushed.
    let _log_guards = logging::init(&config.environment);

    config.validate()?;
    let addr = config.bind_addr()?;

    tracing::info!(
        environment = %config.environment,
        upload_dir = %config.upload_dir.display(),
        origins = ?config.allowed_origins,
        "starting development backend"
    );

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "listening");

    serve(listener, AppState::new(config)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{send, signed_in_user, test_state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_create_app_serves_health() {
        let (status, body) = send(create_app(test_state()), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_custom_url_route_wins_over_template_param() {
        let state = test_state();
        let (_, token) = signed_in_user(&state, "jane").await;
        let (status, body) = send(
            create_app(state),
            "POST",
            "/api/portfolios/custom-url",
            Some(&token),
            Some(serde_json::json!({"templateType": "template1", "customUrl": "jane"})),
        )
        .await;
        // No record yet; the template route would have said "Unknown template".
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Portfolio not found");
    }

    #[tokio::test]
    async fn test_response_carries_request_id() {
        use tower::ServiceExt;
        let res = create_app(test_state())
            .oneshot(
                axum::http::Request::get("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(res.headers().contains_key("x-request-id"));
    }
}
