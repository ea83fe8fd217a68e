//! Once-only medal awards.

use anyhow::Result;
use serde::Serialize;
use tracing::info;

use super::ranks::refresh_rank;
use crate::db::medals::MedalAward;
use crate::db::ranks::RankRow;
use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum MedalOutcome {
    Awarded {
        points: i64,
        total: i64,
        rank_up: Option<RankRow>,
    },
    AlreadyHeld,
    NotFound,
    Inactive,
}

/// Give `medal_id` to `user_id` unless they already hold it.
pub async fn award_medal(db: &Database, user_id: uuid::Uuid, medal_id: i64) -> Result<MedalOutcome> {
    let Some(medal) = db.get_medal(medal_id).await? else {
        return Ok(MedalOutcome::NotFound);
    };
    if !medal.active {
        return Ok(MedalOutcome::Inactive);
    }
    match db.award_medal_tx(user_id, &medal).await? {
        MedalAward::AlreadyHeld => Ok(MedalOutcome::AlreadyHeld),
        MedalAward::Awarded { points, total } => {
            info!(%user_id, medal = %medal.slug, points, "medal awarded");
            let rank_up = if points > 0 {
                refresh_rank(db, user_id).await?
            } else {
                None
            };
            Ok(MedalOutcome::Awarded {
                points,
                total,
                rank_up,
            })
        }
    }
}
