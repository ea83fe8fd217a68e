//! Capped, plan-multiplied point awards.

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::ranks::refresh_rank;
use super::tiers::{compute_points, day_start, PlanTier};
use crate::db::gamification::{CreditResult, PointsCredit};
use crate::db::ranks::RankRow;
use crate::db::Database;

/// Result of [`award_points`]. Serialized as the award endpoint's body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardOutcome {
    pub action_id: String,
    pub points: i64,
    pub limit_reached: bool,
    pub total: i64,
    pub plan: PlanTier,
    pub multiplier: f64,
    /// Set when this award moved the member to a new rank.
    pub rank_up: Option<RankRow>,
}

/// Credit `action_id` to `user_id`.
///
/// A missing or inactive action is not an error: it yields zero points.
/// At the daily cap the outcome has `limit_reached` and zero points.
pub async fn award_points(
    db: &Database,
    user_id: uuid::Uuid,
    action_id: &str,
    now: DateTime<Utc>,
    day_offset: FixedOffset,
) -> Result<AwardOutcome> {
    let plan = PlanTier::from_plan(&db.get_user_plan(user_id).await?);
    let multiplier = plan.multiplier();
    let mut outcome = AwardOutcome {
        action_id: action_id.to_string(),
        points: 0,
        limit_reached: false,
        total: 0,
        plan,
        multiplier,
        rank_up: None,
    };

    let action = match db.get_gamification_action(action_id).await? {
        Some(action) if action.active => action,
        _ => {
            outcome.total = current_total(db, user_id).await?;
            return Ok(outcome);
        }
    };

    let base = i64::from(action.base_points);
    let points = compute_points(base, multiplier);
    let mut metadata = serde_json::Map::new();
    metadata.insert("base".into(), base.into());
    metadata.insert("multiplier".into(), multiplier.into());
    metadata.insert("plan".into(), plan.as_str().into());

    let credit = PointsCredit {
        action_id,
        points,
        max_per_day: action.max_per_day,
        day_start: day_start(now, day_offset),
        metadata,
    };
    match db.award_points_tx(user_id, credit).await? {
        CreditResult::LimitReached { total } => {
            info!(%user_id, action_id, "daily limit reached");
            outcome.limit_reached = true;
            outcome.total = total;
        }
        CreditResult::Credited { after, .. } => {
            info!(%user_id, action_id, points, total = after, "points awarded");
            outcome.points = points;
            outcome.total = after;
            outcome.rank_up = refresh_rank(db, user_id).await?;
        }
    }
    Ok(outcome)
}

/// [`award_points`] for side effects of other operations: failures are
/// logged and reported as `None` instead of failing the caller.
pub async fn award_points_best_effort(
    db: &Database,
    user_id: uuid::Uuid,
    action_id: &str,
    day_offset: FixedOffset,
) -> Option<AwardOutcome> {
    match award_points(db, user_id, action_id, Utc::now(), day_offset).await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(%user_id, action_id, error = %e, "point award failed");
            None
        }
    }
}

async fn current_total(db: &Database, user_id: uuid::Uuid) -> Result<i64> {
    Ok(db
        .get_user_stats(user_id)
        .await?
        .map(|s| s.total_points)
        .unwrap_or(0))
}
