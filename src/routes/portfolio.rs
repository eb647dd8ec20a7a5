/**
 * Portfolio Routes
 * One portfolio record per user and template
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use crate::api::types::{
    CustomUrlRequest, CustomUrlResponse, PortfolioEnvelope, PortfolioInput, PortfolioRecord,
};
use crate::routes::{db_error, error, require_user, AppState, HandlerError};
use crate::template::TemplateKind;

fn parse_template(tag: &str) -> Result<TemplateKind, HandlerError> {
    tag.parse()
        .map_err(|_| error(StatusCode::NOT_FOUND, format!("Unknown template '{tag}'")))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/portfolios/{template}
pub async fn get_portfolio(
    State(state): State<AppState>,
    Path(template): Path<String>,
    headers: HeaderMap,
) -> Result<Json<PortfolioRecord>, HandlerError> {
    let user_id = require_user(&state, &headers)?;
    let template = parse_template(&template)?;

    let row = state
        .db
        .find_portfolio(&user_id, template)
        .await
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Portfolio not found"))?;
    Ok(Json(row.to_record()))
}

/// POST /api/portfolios/{template}
/// 409 with `portfolioId` when the user already has one for this template
pub async fn create_portfolio(
    State(state): State<AppState>,
    Path(template): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<PortfolioInput>,
) -> Result<impl IntoResponse, HandlerError> {
    let user_id = require_user(&state, &headers)?;
    let template = parse_template(&template)?;

    let row = state
        .db
        .create_portfolio(&user_id, template, payload)
        .await
        .map_err(|e| {
            tracing::info!(user_id = %user_id, template = %template, error = %e, "portfolio create rejected");
            db_error(e)
        })?;

    tracing::info!(user_id = %user_id, template = %template, portfolio_id = %row.id, "portfolio created");
    Ok((
        StatusCode::CREATED,
        Json(PortfolioEnvelope {
            portfolio: row.to_record(),
        }),
    ))
}

/// PUT /api/portfolios/{template}/{id}
pub async fn update_portfolio(
    State(state): State<AppState>,
    Path((template, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(payload): Json<PortfolioInput>,
) -> Result<Json<PortfolioEnvelope>, HandlerError> {
    let user_id = require_user(&state, &headers)?;
    let template = parse_template(&template)?;

    let row = state
        .db
        .update_portfolio(&user_id, template, &id, payload)
        .await
        .map_err(db_error)?;

    tracing::info!(user_id = %user_id, portfolio_id = %row.id, "portfolio updated");
    Ok(Json(PortfolioEnvelope {
        portfolio: row.to_record(),
    }))
}

/// POST /api/portfolios/custom-url
pub async fn claim_custom_url(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CustomUrlRequest>,
) -> Result<Json<CustomUrlResponse>, HandlerError> {
    let user_id = require_user(&state, &headers)?;
    let template = parse_template(&payload.template_type)?;

    let custom_url = state
        .db
        .claim_custom_url(&user_id, template, &payload.custom_url)
        .await
        .map_err(db_error)?;

    tracing::info!(user_id = %user_id, custom_url = %custom_url, "custom url claimed");
    Ok(Json(CustomUrlResponse {
        available: true,
        custom_url,
    }))
}
