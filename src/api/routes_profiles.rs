//! Profile endpoints: own profile (read/edit) and public member cards.

use axum::extract::{Path as AxumPath, State};
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::db::profiles::ProfileUpdate;
use crate::gamification::{self, award_points_best_effort};

const PROFILE_COMPLETED_ACTION: &str = "profile_completed";

/// Points, current rank and next rank for a member.
async fn standing(state: &AppState, user_id: uuid::Uuid) -> Result<Value, ApiError> {
    let total = state
        .db
        .get_user_stats(user_id)
        .await?
        .map(|s| s.total_points)
        .unwrap_or(0);
    let ranks = state.db.list_ranks().await?;
    Ok(json!({
        "total_points": total,
        "rank": gamification::resolve_rank(&ranks, total),
        "next_rank": gamification::next_rank(&ranks, total),
    }))
}

/// GET /api/profiles/me
pub(super) async fn handler_profile_me(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let plan = state.db.get_user_plan(user.user_id).await?;
    let unread = state.db.count_unread_notifications(user.user_id).await?;
    Ok(Json(json!({
        "profile": user.profile,
        "plan": plan,
        "unread_notifications": unread,
        "standing": standing(&state, user.user_id).await?,
    })))
}

/// PUT /api/profiles/me — partial update. The first time a profile becomes
/// complete the member earns `profile_completed`.
pub(super) async fn handler_profile_update(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<ProfileUpdate>,
) -> Result<Json<Value>, ApiError> {
    let update = payload.validate().map_err(ApiError::BadRequest)?;
    let was_complete = user.profile.is_complete();
    let updated = state
        .db
        .update_profile(user.user_id, &update)
        .await
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    info!(user_id = %user.user_id, "profile updated");

    let mut award = None;
    if !was_complete
        && updated.is_complete()
        && state
            .db
            .count_action_occurrences(user.user_id, PROFILE_COMPLETED_ACTION, None)
            .await?
            == 0
    {
        award = award_points_best_effort(
            &state.db,
            user.user_id,
            PROFILE_COMPLETED_ACTION,
            state.config.points_day_offset(),
        )
        .await;
        if let Some(outcome) = &award {
            state.record_award(outcome);
        }
    }

    Ok(Json(json!({ "profile": updated, "award": award })))
}

/// GET /api/profiles/{id} — public card: no contact fields.
pub(super) async fn handler_profile_public(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    AxumPath(id): AxumPath<uuid::Uuid>,
) -> Result<Json<Value>, ApiError> {
    let profile = state
        .db
        .get_profile(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile"))?;
    let medals = state.db.list_user_medals(id).await?;
    Ok(Json(json!({
        "profile": profile.public_view(),
        "standing": standing(&state, id).await?,
        "medals": medals,
    })))
}
