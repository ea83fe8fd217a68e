//! Project API: creation, listing, race-safe accept, status changes,
//! proposals and the public tracking view.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use super::middleware_auth::{AuthUser, RequireAuth};
use super::{ApiError, AppState};
use crate::gamification::award_points_best_effort;
use crate::project::{
    self, AcceptOutcome, ActivityType, CreateProjectPayload, ProjectRow, ProjectStatus,
    ProposalPayload,
};

async fn load_project(state: &AppState, id: i64) -> Result<ProjectRow, ApiError> {
    state
        .db
        .get_project(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))
}

/// Client, accepting professional or admin.
fn can_view(project: &ProjectRow, user: &AuthUser) -> bool {
    user.is_admin() || project.client_id == user.user_id || project.accepted_by == Some(user.user_id)
}

async fn credit(state: &AppState, user_id: uuid::Uuid, action: &str) -> Option<Value> {
    let outcome =
        award_points_best_effort(&state.db, user_id, action, state.config.points_day_offset())
            .await?;
    state.record_award(&outcome);
    serde_json::to_value(outcome).ok()
}

#[derive(Deserialize)]
pub(super) struct ProjectListQuery {
    view: Option<String>,
}

/// GET /api/projects — `view=mine` (requested), `open` (acceptable by the
/// caller) or `accepted`. Professionals default to `open`, others to `mine`.
pub(super) async fn handler_projects_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Query(params): Query<ProjectListQuery>,
) -> Result<Json<Value>, ApiError> {
    let default_view = if user.is_professional() { "open" } else { "mine" };
    let view = params.view.as_deref().unwrap_or(default_view);
    let projects = match view {
        "mine" => state.db.list_projects_for_client(user.user_id).await?,
        "open" => {
            if !user.is_professional() {
                return Err(ApiError::Forbidden(
                    "only professionals can browse open projects".into(),
                ));
            }
            state
                .db
                .list_open_projects_for_professional(
                    &user.profile.categories,
                    user.profile.pista.as_deref(),
                )
                .await?
        }
        "accepted" => state.db.list_projects_accepted_by(user.user_id).await?,
        other => return Err(ApiError::BadRequest(format!("unknown view: {}", other))),
    };
    Ok(Json(json!({ "projects": projects })))
}

/// POST /api/projects — create and broadcast to group 1.
pub(super) async fn handler_projects_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<CreateProjectPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let new_project = payload.validate().map_err(ApiError::BadRequest)?;
    let token = project::generate_tracking_token();
    let created = state
        .db
        .create_project(user.user_id, &new_project, &token)
        .await
        .map_err(ApiError::from_db)?;
    state.prom_metrics.projects_created.inc();
    info!(project_id = created.id, client_id = %user.user_id, category = %created.category, "project created");

    // A failure here leaves group 1 unstamped; the next cron run retries it.
    let notified = match project::distribute_new_project(&state.db, &state.mailer, &created).await {
        Ok(n) => n,
        Err(e) => {
            warn!(project_id = created.id, error = %e, "initial distribution failed");
            0
        }
    };
    let created = state.db.get_project(created.id).await?.unwrap_or(created);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "project": created,
            "tracking_token": token,
            "notified": notified,
        })),
    ))
}

/// GET /api/projects/{id} — project with its activity log.
pub(super) async fn handler_project_get(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let project = load_project(&state, id).await?;
    if !can_view(&project, &user) {
        return Err(ApiError::Forbidden("you cannot view this project".into()));
    }
    let activities = state.db.get_project_activities(id).await?;
    Ok(Json(json!({ "project": project, "activities": activities })))
}

/// POST /api/projects/{id}/accept
pub(super) async fn handler_project_accept(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    match project::accept_project(&state.db, &state.mailer, id, &user.profile).await? {
        AcceptOutcome::Accepted(accepted) => {
            state.prom_metrics.projects_accepted.inc();
            let award = credit(&state, user.user_id, "project_accepted").await;
            Ok(Json(json!({ "project": accepted, "award": award })))
        }
        AcceptOutcome::NotFound => Err(ApiError::not_found("Project")),
        AcceptOutcome::AlreadyTaken => Err(ApiError::Conflict(
            "project is no longer available".into(),
        )),
        AcceptOutcome::Ineligible(reason) => Err(ApiError::Forbidden(reason.to_string())),
        AcceptOutcome::RaceLost => {
            state.prom_metrics.accept_races_lost.inc();
            Err(ApiError::Conflict(
                "someone else just accepted this project".into(),
            ))
        }
    }
}

#[derive(Deserialize)]
pub(super) struct StatusPayload {
    status: String,
}

/// POST /api/projects/{id}/status — `accepted → in_progress → completed`,
/// by the client or the accepting professional.
pub(super) async fn handler_project_status(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<StatusPayload>,
) -> Result<Json<Value>, ApiError> {
    let project = load_project(&state, id).await?;
    if !can_view(&project, &user) {
        return Err(ApiError::Forbidden("you cannot change this project".into()));
    }
    let to: ProjectStatus = payload.status.parse().map_err(ApiError::BadRequest)?;
    let from = project
        .status()
        .ok_or_else(|| ApiError::Conflict(format!("unexpected status {}", project.status)))?;
    project::validate_status_transition(from, to).map_err(ApiError::BadRequest)?;

    let updated = state
        .db
        .update_project_status(id, from, to)
        .await?
        .ok_or_else(|| ApiError::Conflict("project status changed concurrently".into()))?;
    info!(project_id = id, from = %from, to = %to, "project status changed");

    if let Err(e) = state
        .db
        .insert_project_activity(
            id,
            Some(user.user_id),
            ActivityType::StatusChanged,
            Some(json!({ "from": from.as_str(), "to": to.as_str() })),
        )
        .await
    {
        warn!(project_id = id, error = %e, "failed to record status activity");
    }

    let counterpart = if user.user_id == updated.client_id {
        updated.accepted_by
    } else {
        Some(updated.client_id)
    };
    if let Some(recipient) = counterpart {
        if let Err(e) = state
            .db
            .create_notification(
                recipient,
                "project_status",
                "Projeto atualizado",
                &format!("O projeto \"{}\" agora está {}.", updated.title, to),
                Some(&format!("/projetos/{}", id)),
            )
            .await
        {
            warn!(project_id = id, error = %e, "failed to notify status change");
        }
    }

    let award = match (to, updated.accepted_by) {
        (ProjectStatus::Completed, Some(professional)) => {
            credit(&state, professional, "project_completed").await
        }
        _ => None,
    };
    Ok(Json(json!({ "project": updated, "award": award })))
}

/// GET /api/projects/{id}/proposals — all bids for the client or an admin;
/// a professional sees only their own.
pub(super) async fn handler_proposals_list(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
) -> Result<Json<Value>, ApiError> {
    let project = load_project(&state, id).await?;
    let mut proposals = state.db.list_proposals(id).await?;
    if !(user.is_admin() || project.client_id == user.user_id) {
        proposals.retain(|p| p.professional_id == user.user_id);
    }
    Ok(Json(json!({ "proposals": proposals })))
}

/// POST /api/projects/{id}/proposals — one bid per professional.
pub(super) async fn handler_proposal_create(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath(id): AxumPath<i64>,
    Json(payload): Json<ProposalPayload>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    payload.validate().map_err(ApiError::BadRequest)?;
    let project = load_project(&state, id).await?;
    if project.status() != Some(ProjectStatus::Pending) {
        return Err(ApiError::Conflict("project is no longer open for proposals".into()));
    }
    project::check_eligibility(&project, &user.profile)
        .map_err(|reason| ApiError::Forbidden(reason.to_string()))?;

    let proposal = state
        .db
        .create_proposal(id, user.user_id, payload.amount_cents, payload.message.trim())
        .await?
        .ok_or_else(|| ApiError::Conflict("you already sent a proposal for this project".into()))?;
    info!(project_id = id, proposal_id = proposal.id, professional_id = %user.user_id, "proposal submitted");

    if let Err(e) = state
        .db
        .insert_project_activity(
            id,
            Some(user.user_id),
            ActivityType::ProposalSubmitted,
            Some(json!({ "proposal_id": proposal.id })),
        )
        .await
    {
        warn!(project_id = id, error = %e, "failed to record proposal activity");
    }
    if let Err(e) = state
        .db
        .create_notification(
            project.client_id,
            "proposal_received",
            "Nova proposta",
            &format!("Você recebeu uma proposta para \"{}\".", project.title),
            Some(&format!("/projetos/{}", id)),
        )
        .await
    {
        warn!(project_id = id, error = %e, "failed to notify client of proposal");
    }

    let award = credit(&state, user.user_id, "proposal_submitted").await;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "proposal": proposal, "award": award })),
    ))
}

#[derive(Deserialize)]
pub(super) struct ProposalDecision {
    status: String,
}

/// POST /api/projects/{id}/proposals/{proposal_id} — client accepts or
/// rejects a pending bid.
pub(super) async fn handler_proposal_decide(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    AxumPath((id, proposal_id)): AxumPath<(i64, i64)>,
    Json(payload): Json<ProposalDecision>,
) -> Result<Json<Value>, ApiError> {
    if !matches!(payload.status.as_str(), "accepted" | "rejected") {
        return Err(ApiError::BadRequest("status must be accepted or rejected".into()));
    }
    let project = load_project(&state, id).await?;
    if !(user.is_admin() || project.client_id == user.user_id) {
        return Err(ApiError::Forbidden("only the client can decide on proposals".into()));
    }
    let proposal = state
        .db
        .update_proposal_status(id, proposal_id, &payload.status)
        .await?
        .ok_or_else(|| ApiError::Conflict("proposal not found or already decided".into()))?;

    if let Err(e) = state
        .db
        .create_notification(
            proposal.professional_id,
            "proposal_decided",
            "Proposta respondida",
            &format!("Sua proposta para \"{}\" foi respondida.", project.title),
            Some(&format!("/projetos/{}", id)),
        )
        .await
    {
        warn!(project_id = id, error = %e, "failed to notify professional of decision");
    }
    Ok(Json(json!({ "proposal": proposal })))
}

/// GET /api/projects/track/{token} — public, no auth.
pub(super) async fn handler_project_track(
    State(state): State<Arc<AppState>>,
    AxumPath(token): AxumPath<String>,
) -> Result<Json<Value>, ApiError> {
    if token.len() != 32 || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::not_found("Project"));
    }
    let project = state
        .db
        .get_project_by_token(&token.to_ascii_lowercase())
        .await?
        .ok_or_else(|| ApiError::not_found("Project"))?;
    Ok(Json(project.tracking_view()))
}
