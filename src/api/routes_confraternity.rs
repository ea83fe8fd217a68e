//! Confraternity (member meetup) endpoints.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::confraternity::{self, CompletePayload, InvitePayload, RespondPayload};

/// GET /api/confraternity — invites the caller sent or received.
pub(super) async fn handler_invites_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let invites = state.db.list_invites_for_user(user.user_id).await?;
    Ok(Json(json!({ "invites": invites })))
}

/// POST /api/confraternity
pub(super) async fn handler_invite_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<InvitePayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let invite = confraternity::invite(
        &state.db,
        &state.mailer,
        &user.profile,
        &payload,
        chrono::Utc::now(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!(invite))))
}

/// POST /api/confraternity/{id}/respond — `{"accept": bool}`
pub(super) async fn handler_invite_respond(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<RespondPayload>,
) -> Result<Json<Value>, ApiError> {
    let invite = confraternity::respond(&state.db, user.user_id, id, payload.accept).await?;
    Ok(Json(json!(invite)))
}

/// POST /api/confraternity/{id}/complete — `{"proof_photo_url": "..."}`
pub(super) async fn handler_invite_complete(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<CompletePayload>,
) -> Result<Json<confraternity::Completion>, ApiError> {
    let completion = confraternity::complete(
        &state.db,
        user.user_id,
        id,
        &payload.proof_photo_url,
        chrono::Utc::now(),
        state.config.points_day_offset(),
    )
    .await?;
    for award in &completion.awards {
        state.record_award(award);
    }
    Ok(Json(completion))
}

/// POST /api/confraternity/{id}/cancel
pub(super) async fn handler_invite_cancel(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let invite = confraternity::cancel(&state.db, user.user_id, id).await?;
    Ok(Json(json!(invite)))
}
