//! Referral endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::middleware_auth::RequireAuth;
use super::{ApiError, AppState};
use crate::db::profiles::referral_code_for;
use crate::referrals::{self, ReferralOutcome};

#[derive(Deserialize)]
pub(super) struct RegisterPayload {
    code: String,
}

/// POST /api/referrals/register — the caller was referred by `code`.
pub(super) async fn handler_referral_register(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<ReferralOutcome>), ApiError> {
    if payload.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code is required".into()));
    }
    let outcome = referrals::register_referral(
        &state.db,
        user.user_id,
        &payload.code,
        state.config.points_day_offset(),
    )
    .await?;
    if let Some(award) = &outcome.referrer_award {
        state.record_award(award);
    }
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /api/referrals/me — own code and how many members used it.
pub(super) async fn handler_referral_me(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let code = user
        .profile
        .referral_code
        .clone()
        .unwrap_or_else(|| referral_code_for(user.user_id));
    let count = state.db.count_referrals_by(user.user_id).await?;
    Ok(Json(json!({
        "code": code,
        "link": format!("{}/cadastro?ref={}", state.config.app_url, code),
        "referrals": count,
    })))
}
