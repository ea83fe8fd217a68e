//! In-app notification feed.

use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};

#[derive(Deserialize)]
pub(super) struct NotificationQuery {
    #[serde(default)]
    unread: bool,
    limit: Option<i64>,
}

/// GET /api/notifications?unread=true&limit=N
pub(super) async fn handler_notifications_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<NotificationQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = params.limit.unwrap_or(50).clamp(1, 200);
    let notifications = state
        .db
        .list_notifications(user.user_id, params.unread, limit)
        .await?;
    let unread = state.db.count_unread_notifications(user.user_id).await?;
    Ok(Json(json!({ "notifications": notifications, "unread": unread })))
}

/// POST /api/notifications/{id}/read
pub(super) async fn handler_notification_read(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    if !state.db.mark_notification_read(user.user_id, id).await? {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(Json(json!({ "ok": true })))
}

/// POST /api/notifications/read-all
pub(super) async fn handler_notifications_read_all(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let updated = state.db.mark_all_notifications_read(user.user_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
