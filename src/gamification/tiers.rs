//! Plan tiers and point arithmetic.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::Serialize;

/// Subscription plan as seen by gamification and distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Pro,
    Elite,
}

impl PlanTier {
    /// Parse an effective plan name. Anything unknown counts as `Free`.
    pub fn from_plan(plan: &str) -> Self {
        match plan.trim().to_ascii_lowercase().as_str() {
            "pro" => PlanTier::Pro,
            "elite" => PlanTier::Elite,
            _ => PlanTier::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Elite => "elite",
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            PlanTier::Free => 1.0,
            PlanTier::Pro => 1.5,
            PlanTier::Elite => 2.0,
        }
    }

    /// Distribution group a professional on this plan belongs to.
    pub fn distribution_group(&self) -> i32 {
        match self {
            PlanTier::Elite => 1,
            PlanTier::Pro => 2,
            PlanTier::Free => 3,
        }
    }
}

/// `round(base * multiplier)`, halves rounded away from zero.
pub fn compute_points(base: i64, multiplier: f64) -> i64 {
    (base as f64 * multiplier).round() as i64
}

/// Start (as UTC) of the gamification day containing `now`, where days
/// begin at local midnight in `offset`.
pub fn day_start(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local = now.with_timezone(&offset);
    let midnight = local.date_naive().and_hms_opt(0, 0, 0).unwrap_or(local.naive_local());
    offset
        .from_local_datetime(&midnight)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now)
}
