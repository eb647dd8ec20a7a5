/**
 * Upload Routes
 * Image uploads stored on disk and served back under /uploads
 */
use axum::{
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::api::types::UploadResponse;
use crate::routes::{error, require_user, AppState, HandlerError};
use crate::upload::{extension_for, sniff_image_type, MAX_IMAGE_BYTES};

/// Field carrying the file; other fields (e.g. `upload_preset`) are ignored.
const FILE_FIELD: &str = "file";

/// POST /api/uploads
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let user_id = require_user(&state, &headers)?;

    let upload_path = state.config.upload_dir.clone();
    if let Err(e) = tokio::fs::create_dir_all(&upload_path).await {
        tracing::error!(error = %e, "failed to create upload directory");
        return Err(error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to initialize upload directory",
        ));
    }

    let mut bytes = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some(FILE_FIELD) => {
                let data = field.bytes().await.map_err(|e| {
                    tracing::error!(error = %e, "failed to read upload bytes");
                    error(StatusCode::BAD_REQUEST, "Failed to read file data")
                })?;
                bytes = Some(data);
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "multipart error");
                return Err(error(StatusCode::BAD_REQUEST, "Invalid multipart data"));
            }
        }
    }
    let bytes = bytes.ok_or_else(|| error(StatusCode::BAD_REQUEST, "No file provided"))?;

    if bytes.is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "Empty file"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(error(
            StatusCode::PAYLOAD_TOO_LARGE,
            "File too large. Maximum size is 5MB.",
        ));
    }
    let mime_type = sniff_image_type(&bytes).ok_or_else(|| {
        error(
            StatusCode::BAD_REQUEST,
            "File content does not match an allowed image type.",
        )
    })?;

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
    let file_path = upload_path.join(&filename);
    if let Err(e) = tokio::fs::write(&file_path, &bytes).await {
        tracing::error!(error = %e, "failed to write upload file");
        return Err(error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save file"));
    }

    let url = format!(
        "{}/uploads/{}",
        state.config.public_base_url.trim_end_matches('/'),
        filename
    );
    tracing::info!(user_id = %user_id, filename = %filename, size = bytes.len(), "image uploaded");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            secure_url: url.clone(),
            url,
            filename,
            size: bytes.len(),
            mime_type: mime_type.to_string(),
        }),
    ))
}
