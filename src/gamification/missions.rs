//! Mission progress, claims and the seasonal leaderboard.
//!
//! Progress counts ledger rows for the mission's action since the active
//! season started (all time when no season runs), so it resets each season.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ranks::refresh_rank;
use crate::db::missions::{MissionClaim, MissionRow};
use crate::db::ranks::RankRow;
use crate::db::seasons::{LeaderboardEntry, SeasonRow};
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct MissionProgress {
    #[serde(flatten)]
    pub mission: MissionRow,
    pub progress: i64,
    pub completed: bool,
    pub claimed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed {
        points: i64,
        total: i64,
        rank_up: Option<RankRow>,
    },
    NotReady {
        progress: i64,
        target: i32,
    },
    AlreadyClaimed,
    NotFound,
}

/// `(season_id, since)` scoping progress and claims; season 0 = none.
fn season_scope(season: Option<&SeasonRow>) -> (i64, Option<DateTime<Utc>>) {
    season.map_or((0, None), |s| (s.id, Some(s.starts_at)))
}

/// Active missions with the member's progress in the current season.
pub async fn mission_progress(
    db: &Database,
    user_id: uuid::Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<MissionProgress>> {
    let season = db.get_active_season(now).await?;
    let (season_id, since) = season_scope(season.as_ref());
    let claimed = db.claimed_mission_ids(user_id, season_id).await?;

    let mut out = Vec::new();
    for mission in db.list_missions(true).await? {
        let progress = db
            .count_action_occurrences(user_id, &mission.action_id, since)
            .await?;
        out.push(MissionProgress {
            completed: progress >= i64::from(mission.target_count),
            claimed: claimed.contains(&mission.id),
            progress,
            mission,
        });
    }
    Ok(out)
}

/// Claim a completed mission's reward, once per season.
pub async fn claim_mission(
    db: &Database,
    user_id: uuid::Uuid,
    mission_id: i64,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome> {
    let mission = match db.get_mission(mission_id).await? {
        Some(m) if m.active => m,
        _ => return Ok(ClaimOutcome::NotFound),
    };
    let season = db.get_active_season(now).await?;
    let (season_id, since) = season_scope(season.as_ref());

    match db.claim_mission_tx(user_id, &mission, season_id, since).await? {
        MissionClaim::NotReady { progress } => Ok(ClaimOutcome::NotReady {
            progress,
            target: mission.target_count,
        }),
        MissionClaim::AlreadyClaimed => Ok(ClaimOutcome::AlreadyClaimed),
        MissionClaim::Claimed { points, total } => {
            let rank_up = if points > 0 {
                refresh_rank(db, user_id).await?
            } else {
                None
            };
            Ok(ClaimOutcome::Claimed {
                points,
                total,
                rank_up,
            })
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Leaderboard {
    pub season: Option<SeasonRow>,
    pub entries: Vec<LeaderboardEntry>,
}

/// Top `limit` members of the active season (lifetime when none runs).
pub async fn leaderboard(db: &Database, now: DateTime<Utc>, limit: i64) -> Result<Leaderboard> {
    let season = db.get_active_season(now).await?;
    let window = season.as_ref().map(|s| (s.starts_at, s.ends_at));
    let entries = db.season_leaderboard(window, limit.clamp(1, 100)).await?;
    Ok(Leaderboard { season, entries })
}
