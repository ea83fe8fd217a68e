//! Rank ladder resolution.

use anyhow::Result;

use crate::db::ranks::RankRow;
use crate::db::Database;

/// Highest rank whose `min_points` is at or below `total`.
pub fn resolve_rank(ranks: &[RankRow], total: i64) -> Option<&RankRow> {
    ranks
        .iter()
        .filter(|r| r.min_points <= total)
        .max_by_key(|r| (r.min_points, r.sort_order))
}

/// Next rank above `total`, for "points to next rank" displays.
pub fn next_rank(ranks: &[RankRow], total: i64) -> Option<&RankRow> {
    ranks
        .iter()
        .filter(|r| r.min_points > total)
        .min_by_key(|r| (r.min_points, r.sort_order))
}

/// Recompute a member's rank from their stored total. Returns the new rank
/// when it differs from the stored one.
pub async fn refresh_rank(db: &Database, user_id: uuid::Uuid) -> Result<Option<RankRow>> {
    let Some(change) = db.sync_user_rank(user_id).await? else {
        return Ok(None);
    };
    let Some(to) = change.to else {
        return Ok(None);
    };
    Ok(db.list_ranks().await?.into_iter().find(|r| r.id == to))
}
