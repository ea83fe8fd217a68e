//! Seasons and the seasonal leaderboard.
//!
//! The leaderboard sums ledger points earned inside the season window, so
//! a season starts everyone at zero without touching lifetime totals.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SeasonRow {
    pub id: i64,
    pub name: String,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    pub ends_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeasonInput {
    pub name: String,
    pub starts_at: chrono::DateTime<chrono::Utc>,
    pub ends_at: chrono::DateTime<chrono::Utc>,
}

impl SeasonInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.ends_at <= self.starts_at {
            return Err("ends_at must be after starts_at".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub user_id: uuid::Uuid,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub points: i64,
}

impl Database {
    /// The season whose window contains `now`; the latest-starting one if
    /// windows overlap.
    pub async fn get_active_season(
        &self,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<SeasonRow>> {
        let row = sqlx::query_as::<_, SeasonRow>(
            "SELECT id, name, starts_at, ends_at FROM seasons
             WHERE starts_at <= $1 AND ends_at > $1
             ORDER BY starts_at DESC
             LIMIT 1",
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_seasons(&self) -> Result<Vec<SeasonRow>> {
        let rows = sqlx::query_as::<_, SeasonRow>(
            "SELECT id, name, starts_at, ends_at FROM seasons ORDER BY starts_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_season(&self, input: &SeasonInput) -> Result<SeasonRow> {
        let row = sqlx::query_as::<_, SeasonRow>(
            "INSERT INTO seasons (name, starts_at, ends_at) VALUES ($1, $2, $3)
             RETURNING id, name, starts_at, ends_at",
        )
        .bind(input.name.trim())
        .bind(input.starts_at)
        .bind(input.ends_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Top `limit` members by points earned in `[starts_at, ends_at)`.
    /// Without a window the lifetime ledger is ranked.
    pub async fn season_leaderboard(
        &self,
        window: Option<(chrono::DateTime<chrono::Utc>, chrono::DateTime<chrono::Utc>)>,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>> {
        let (starts_at, ends_at) = window.unzip();
        let rows = sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT h.user_id, p.display_name, p.avatar_url, SUM(h.points)::BIGINT AS points
             FROM points_history h
             JOIN profiles p ON p.id = h.user_id
             WHERE ($1::timestamptz IS NULL OR h.created_at >= $1)
               AND ($2::timestamptz IS NULL OR h.created_at < $2)
             GROUP BY h.user_id, p.display_name, p.avatar_url
             HAVING SUM(h.points) > 0
             ORDER BY points DESC, h.user_id
             LIMIT $3",
        )
        .bind(starts_at)
        .bind(ends_at)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
