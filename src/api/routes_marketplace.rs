//! Marketplace endpoints: browse, publish, edit and remove ads.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::db::marketplace::AdFilter;
use crate::marketplace::{self, AdPayload};

/// GET /api/marketplace?category=&search=&owner=&status=&sort_by=&sort_dir=&limit=&offset=
pub(super) async fn handler_ads_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    Query(filter): Query<AdFilter>,
) -> Result<Json<Value>, ApiError> {
    let ads = state.db.list_ads(&filter).await?;
    Ok(Json(json!({ "ads": ads })))
}

/// POST /api/marketplace
pub(super) async fn handler_ad_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<AdPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let (ad, award) = marketplace::create_ad(
        &state.db,
        &user.profile,
        &payload,
        state.config.points_day_offset(),
    )
    .await?;
    if let Some(outcome) = &award {
        state.record_award(outcome);
    }
    Ok((StatusCode::CREATED, Json(json!({ "ad": ad, "award": award }))))
}

/// GET /api/marketplace/{id}
pub(super) async fn handler_ad_get(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let ad = state
        .db
        .get_ad(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Ad"))?;
    let seller = state.db.get_profile(ad.owner_id).await?.map(|p| p.public_view());
    Ok(Json(json!({ "ad": ad, "seller": seller })))
}

/// PUT /api/marketplace/{id} — owner or admin.
pub(super) async fn handler_ad_update(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<AdPayload>,
) -> Result<Json<Value>, ApiError> {
    let ad = marketplace::update_ad(&state.db, &user.profile, id, &payload).await?;
    Ok(Json(json!(ad)))
}

/// DELETE /api/marketplace/{id} — owner or admin.
pub(super) async fn handler_ad_delete(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<StatusCode, ApiError> {
    marketplace::delete_ad(&state.db, &user.profile, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
