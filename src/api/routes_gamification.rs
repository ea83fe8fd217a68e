//! Gamification API: point awards, member standing, leaderboard, missions.

use axum::extract::{Path as AxumPath, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::gamification::{self, AwardOutcome, ClaimOutcome, PlanTier};

/// Actions only the server credits, as a side effect of the operation
/// they describe. Members cannot claim them directly.
const SERVER_AWARDED: &[&str] = &[
    "project_accepted",
    "project_completed",
    "proposal_submitted",
    "confraternity_completed",
    "referral",
    "marketplace_ad_created",
    "profile_completed",
];

#[derive(Deserialize)]
pub(super) struct AwardPayload {
    action_id: String,
    /// Admin only: credit another member.
    user_id: Option<uuid::Uuid>,
}

/// POST /api/gamification/points
pub(super) async fn handler_award_points(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<AwardPayload>,
) -> Result<Json<AwardOutcome>, ApiError> {
    let action_id = payload.action_id.trim();
    if action_id.is_empty() {
        return Err(ApiError::BadRequest("action_id is required".into()));
    }
    let target = match payload.user_id {
        Some(other) if other != user.user_id => {
            if !user.is_admin() {
                return Err(ApiError::Forbidden(
                    "only admins can award points to other members".into(),
                ));
            }
            other
        }
        _ => user.user_id,
    };
    if !user.is_admin() && SERVER_AWARDED.contains(&action_id) {
        return Err(ApiError::Forbidden(format!(
            "{} is awarded automatically",
            action_id
        )));
    }

    let outcome = gamification::award_points(
        &state.db,
        target,
        action_id,
        chrono::Utc::now(),
        state.config.points_day_offset(),
    )
    .await?;
    state.record_award(&outcome);
    Ok(Json(outcome))
}

/// GET /api/gamification/me
pub(super) async fn handler_my_stats(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let total = state
        .db
        .get_user_stats(user.user_id)
        .await?
        .map(|s| s.total_points)
        .unwrap_or(0);
    let ranks = state.db.list_ranks().await?;
    let plan = PlanTier::from_plan(&state.db.get_user_plan(user.user_id).await?);
    let medals = state.db.list_user_medals(user.user_id).await?;
    let history = state.db.get_points_history(user.user_id, 50).await?;
    Ok(Json(json!({
        "total_points": total,
        "rank": gamification::resolve_rank(&ranks, total),
        "next_rank": gamification::next_rank(&ranks, total),
        "plan": plan,
        "multiplier": plan.multiplier(),
        "medals": medals,
        "history": history,
    })))
}

#[derive(Deserialize)]
pub(super) struct LeaderboardQuery {
    limit: Option<i64>,
}

/// GET /api/gamification/leaderboard?limit=N
pub(super) async fn handler_leaderboard(
    State(state): State<Arc<AppState>>,
    RequireAuth(_user): RequireAuth,
    Query(params): Query<LeaderboardQuery>,
) -> Result<Json<gamification::Leaderboard>, ApiError> {
    let board =
        gamification::leaderboard(&state.db, chrono::Utc::now(), params.limit.unwrap_or(20))
            .await?;
    Ok(Json(board))
}

/// GET /api/gamification/ranks
pub(super) async fn handler_ranks(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    let ranks = state.db.list_ranks().await?;
    Ok(Json(json!({ "ranks": ranks })))
}

/// GET /api/gamification/missions
pub(super) async fn handler_missions(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let missions =
        gamification::mission_progress(&state.db, user.user_id, chrono::Utc::now()).await?;
    Ok(Json(json!({ "missions": missions })))
}

/// POST /api/gamification/missions/{id}/claim
pub(super) async fn handler_mission_claim(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<ClaimOutcome>, ApiError> {
    let outcome =
        gamification::claim_mission(&state.db, user.user_id, id, chrono::Utc::now()).await?;
    match outcome {
        ClaimOutcome::Claimed { points, .. } => {
            state
                .prom_metrics
                .record_award(&format!("mission:{}", id), points, false);
            Ok(Json(outcome))
        }
        ClaimOutcome::NotReady { progress, target } => Err(ApiError::Conflict(format!(
            "mission not completed yet ({}/{})",
            progress, target
        ))),
        ClaimOutcome::AlreadyClaimed => {
            Err(ApiError::Conflict("mission already claimed this season".into()))
        }
        ClaimOutcome::NotFound => Err(ApiError::not_found("Mission")),
    }
}
