//! Admin API: catalogue CRUD for ranks, medals, missions, point actions
//! and seasons, manual medal awards and role changes.
//!
//! Every handler takes [`RequireAdmin`], so non-admins get 403.

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::middleware_auth::RequireAdmin;
use super::{ApiError, AppState};
use crate::db::gamification::ActionInput;
use crate::db::medals::MedalInput;
use crate::db::missions::MissionInput;
use crate::db::ranks::RankInput;
use crate::db::seasons::SeasonInput;
use crate::gamification::{self, MedalOutcome};

const ROLES: &[&str] = &["client", "professional", "admin"];

fn deleted(found: bool, what: &str) -> Result<StatusCode, ApiError> {
    if found {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(what))
    }
}

// ── Ranks ───────────────────────────────────────────────────────

pub(super) async fn handler_ranks_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "ranks": state.db.list_ranks().await? })))
}

pub(super) async fn handler_rank_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<RankInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let rank = state.db.create_rank(&input).await.map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(json!(rank))))
}

pub(super) async fn handler_rank_update(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
    Json(input): Json<RankInput>,
) -> Result<Json<Value>, ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let rank = state
        .db
        .update_rank(id, &input)
        .await
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Rank"))?;
    Ok(Json(json!(rank)))
}

pub(super) async fn handler_rank_delete(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
) -> Result<StatusCode, ApiError> {
    deleted(state.db.delete_rank(id).await?, "Rank")
}

// ── Medals ──────────────────────────────────────────────────────

pub(super) async fn handler_medals_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "medals": state.db.list_medals().await? })))
}

pub(super) async fn handler_medal_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<MedalInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let medal = state.db.create_medal(&input).await.map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(json!(medal))))
}

pub(super) async fn handler_medal_update(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
    Json(input): Json<MedalInput>,
) -> Result<Json<Value>, ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let medal = state
        .db
        .update_medal(id, &input)
        .await
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Medal"))?;
    Ok(Json(json!(medal)))
}

pub(super) async fn handler_medal_delete(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
) -> Result<StatusCode, ApiError> {
    deleted(state.db.delete_medal(id).await?, "Medal")
}

#[derive(Deserialize)]
pub(super) struct MedalAwardPayload {
    user_id: uuid::Uuid,
}

/// POST /api/admin/medals/{id}/award
pub(super) async fn handler_medal_award(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<MedalAwardPayload>,
) -> Result<Json<MedalOutcome>, ApiError> {
    if state.db.get_profile(payload.user_id).await?.is_none() {
        return Err(ApiError::not_found("Member"));
    }
    let outcome = gamification::award_medal(&state.db, payload.user_id, id).await?;
    match &outcome {
        MedalOutcome::NotFound => return Err(ApiError::not_found("Medal")),
        MedalOutcome::Inactive => {
            return Err(ApiError::BadRequest("medal is inactive".into()));
        }
        MedalOutcome::AlreadyHeld => {
            return Err(ApiError::Conflict("member already holds this medal".into()));
        }
        MedalOutcome::Awarded { points, .. } => {
            info!(admin = %admin.user_id, user_id = %payload.user_id, medal_id = id, "medal granted");
            state
                .prom_metrics
                .record_award(&format!("medal:{}", id), *points, false);
            if let Err(e) = state
                .db
                .create_notification(
                    payload.user_id,
                    "medal_awarded",
                    "Nova medalha",
                    "Você recebeu uma nova medalha.",
                    Some("/perfil"),
                )
                .await
            {
                warn!(user_id = %payload.user_id, error = %e, "failed to notify medal award");
            }
        }
    }
    Ok(Json(outcome))
}

// ── Missions ────────────────────────────────────────────────────

pub(super) async fn handler_missions_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "missions": state.db.list_missions(false).await? })))
}

pub(super) async fn handler_mission_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<MissionInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let mission = state
        .db
        .create_mission(&input)
        .await
        .map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(json!(mission))))
}

pub(super) async fn handler_mission_update(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
    Json(input): Json<MissionInput>,
) -> Result<Json<Value>, ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let mission = state
        .db
        .update_mission(id, &input)
        .await
        .map_err(ApiError::from_db)?
        .ok_or_else(|| ApiError::not_found("Mission"))?;
    Ok(Json(json!(mission)))
}

pub(super) async fn handler_mission_delete(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<i64>,
) -> Result<StatusCode, ApiError> {
    deleted(state.db.delete_mission(id).await?, "Mission")
}

// ── Point actions ───────────────────────────────────────────────

fn valid_action_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

pub(super) async fn handler_actions_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({
        "actions": state.db.list_gamification_actions().await?
    })))
}

pub(super) async fn handler_action_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<ActionInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let id = input.id.as_deref().map(str::trim).unwrap_or_default();
    if !valid_action_id(id) {
        return Err(ApiError::BadRequest(
            "id must be lowercase letters, digits or '_'".into(),
        ));
    }
    if state.db.get_gamification_action(id).await?.is_some() {
        return Err(ApiError::Conflict(format!("action {} already exists", id)));
    }
    let action = state
        .db
        .upsert_gamification_action(id, &input)
        .await
        .map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(json!(action))))
}

pub(super) async fn handler_action_update(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<String>,
    Json(input): Json<ActionInput>,
) -> Result<Json<Value>, ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    if state.db.get_gamification_action(&id).await?.is_none() {
        return Err(ApiError::not_found("Action"));
    }
    let action = state
        .db
        .upsert_gamification_action(&id, &input)
        .await
        .map_err(ApiError::from_db)?;
    Ok(Json(json!(action)))
}

pub(super) async fn handler_action_delete(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    deleted(state.db.delete_gamification_action(&id).await?, "Action")
}

// ── Seasons ─────────────────────────────────────────────────────

pub(super) async fn handler_seasons_list(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!({ "seasons": state.db.list_seasons().await? })))
}

pub(super) async fn handler_season_create(
    State(state): State<Arc<AppState>>,
    RequireAdmin(_admin): RequireAdmin,
    Json(input): Json<SeasonInput>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    input.validate().map_err(ApiError::BadRequest)?;
    let season = state
        .db
        .create_season(&input)
        .await
        .map_err(ApiError::from_db)?;
    Ok((StatusCode::CREATED, Json(json!(season))))
}

// ── Users ───────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct RolePayload {
    role: String,
}

/// PUT /api/admin/users/{id}/role
pub(super) async fn handler_user_role(
    State(state): State<Arc<AppState>>,
    RequireAdmin(admin): RequireAdmin,
    AxumPath(id): AxumPath<uuid::Uuid>,
    Json(payload): Json<RolePayload>,
) -> Result<Json<Value>, ApiError> {
    let role = payload.role.trim();
    if !ROLES.contains(&role) {
        return Err(ApiError::BadRequest(format!(
            "role must be one of {}",
            ROLES.join(", ")
        )));
    }
    if !state.db.set_profile_role(id, role).await? {
        return Err(ApiError::not_found("Member"));
    }
    info!(admin = %admin.user_id, user_id = %id, role, "role changed");
    Ok(Json(json!({ "user_id": id, "role": role })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_ids_are_snake_case() {
        assert!(valid_action_id("daily_login"));
        assert!(valid_action_id("level2_bonus"));
        assert!(!valid_action_id(""));
        assert!(!valid_action_id("Daily"));
        assert!(!valid_action_id("medal:3"));
        assert!(!valid_action_id(&"a".repeat(65)));
    }
}
