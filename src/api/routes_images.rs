//! Image tools. Images travel as base64 (optionally a `data:` URL) inside
//! JSON, so the router's 1 MiB body limit applies.

use axum::extract::State;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::integrations::images;

#[derive(Deserialize)]
pub(super) struct ImagePayload {
    image: String,
}

/// POST /api/images/remove-background → `{"image_base64": "<png>"}`
pub(super) async fn handler_remove_background(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<Value>, ApiError> {
    let remover = state
        .background_remover
        .as_ref()
        .ok_or(ApiError::Unavailable("Background removal"))?;
    let image = images::decode_image(&payload.image)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let png = remover
        .remove_background(&image)
        .await
        .map_err(|e| ApiError::Upstream(e.to_string()))?;
    info!(user_id = %user.user_id, bytes = png.len(), "background removed");
    Ok(Json(json!({
        "image_base64": STANDARD.encode(&png),
        "content_type": "image/png",
    })))
}

/// POST /api/images/enhance → `{"image_base64": ..., "enhanced": false}`
pub(super) async fn handler_enhance(
    RequireAuth(_user): RequireAuth,
    Json(payload): Json<ImagePayload>,
) -> Result<Json<images::Enhanced>, ApiError> {
    let image = images::decode_image(&payload.image)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(Json(images::enhance(&image)))
}
