//! Cron trigger for the tiered distribution job.
//!
//! The scheduler calls `GET` or `POST /api/cron/distribute-projects` with
//! `Authorization: Bearer <CRON_SECRET>`. One call is one distribution pass.

use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::Json;
use std::sync::Arc;
use tracing::warn;

use super::{ApiError, AppState};
use crate::project::{self, DistributionReport};

pub(super) async fn handler_cron_distribute(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<DistributionReport>, ApiError> {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if !state.config.cron_authorized(authorization) {
        warn!("rejected cron call without a valid secret");
        return Err(ApiError::Unauthorized);
    }

    let report = project::run_distribution(&state.db, &state.mailer, chrono::Utc::now()).await?;
    state
        .prom_metrics
        .distribution_escalations
        .inc_by(report.escalated as u64);
    state
        .prom_metrics
        .distribution_expired
        .inc_by(report.expired as u64);
    Ok(Json(report))
}
