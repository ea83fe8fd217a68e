//! Point economy storage: action catalogue, running totals and the
//! append-only `points_history` ledger.
//!
//! Every credit goes through a transaction that first locks the user's
//! `user_gamification` row (`SELECT ... FOR UPDATE`). Concurrent awards for
//! the same user therefore serialize, which is what keeps the daily cap
//! exact: the occurrence count is read after the lock is held.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct GamificationActionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub base_points: i32,
    pub max_per_day: Option<i32>,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Admin create/update payload for an action.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionInput {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub base_points: i32,
    pub max_per_day: Option<i32>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl ActionInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.base_points < 0 {
            return Err("base_points must be non-negative".into());
        }
        if matches!(self.max_per_day, Some(n) if n <= 0) {
            return Err("max_per_day must be positive when set".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserStatsRow {
    pub user_id: uuid::Uuid,
    pub total_points: i64,
    pub rank_id: Option<i64>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PointsHistoryRow {
    pub id: i64,
    pub user_id: uuid::Uuid,
    pub action_id: String,
    pub points: i64,
    pub metadata: serde_json::Value,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// One credit to apply inside [`Database::award_points_tx`].
#[derive(Debug, Clone)]
pub struct PointsCredit<'a> {
    pub action_id: &'a str,
    pub points: i64,
    /// Occurrences allowed per day; `None` means uncapped.
    pub max_per_day: Option<i32>,
    /// Start of the current gamification day.
    pub day_start: chrono::DateTime<chrono::Utc>,
    /// Audit payload; `before`/`after` totals are added on insert.
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditResult {
    Credited { before: i64, after: i64 },
    LimitReached { total: i64 },
}

/// A member's rank moving from `from` to `to` (rank ids).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankChange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

const ACTION_COLUMNS: &str =
    "id, name, description, base_points, max_per_day, active, created_at, updated_at";

impl Database {
    pub async fn get_gamification_action(
        &self,
        action_id: &str,
    ) -> Result<Option<GamificationActionRow>> {
        let row = sqlx::query_as::<_, GamificationActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM gamification_actions WHERE id = $1"
        ))
        .bind(action_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_gamification_actions(&self) -> Result<Vec<GamificationActionRow>> {
        let rows = sqlx::query_as::<_, GamificationActionRow>(&format!(
            "SELECT {ACTION_COLUMNS} FROM gamification_actions ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Insert or replace an action by id.
    pub async fn upsert_gamification_action(
        &self,
        id: &str,
        input: &ActionInput,
    ) -> Result<GamificationActionRow> {
        let row = sqlx::query_as::<_, GamificationActionRow>(&format!(
            "INSERT INTO gamification_actions (id, name, description, base_points, max_per_day, active)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                base_points = EXCLUDED.base_points,
                max_per_day = EXCLUDED.max_per_day,
                active = EXCLUDED.active,
                updated_at = NOW()
             RETURNING {ACTION_COLUMNS}"
        ))
        .bind(id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(input.base_points)
        .bind(input.max_per_day)
        .bind(input.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_gamification_action(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM gamification_actions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply one credit under the user's row lock.
    ///
    /// With `max_per_day` set, today's occurrences of `action_id` are counted
    /// after the lock is taken; at the cap nothing is written.
    pub async fn award_points_tx(
        &self,
        user_id: uuid::Uuid,
        credit: PointsCredit<'_>,
    ) -> Result<CreditResult> {
        let mut tx = self.pool.begin().await?;
        let before = lock_user_total(&mut tx, user_id).await?;

        if let Some(cap) = credit.max_per_day {
            let today: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM points_history
                 WHERE user_id = $1 AND action_id = $2 AND created_at >= $3",
            )
            .bind(user_id)
            .bind(credit.action_id)
            .bind(credit.day_start)
            .fetch_one(&mut *tx)
            .await?;
            if today >= i64::from(cap) {
                tx.rollback().await?;
                return Ok(CreditResult::LimitReached { total: before });
            }
        }

        let after = append_points(
            &mut tx,
            user_id,
            credit.action_id,
            credit.points,
            credit.metadata,
            before,
        )
        .await?;
        tx.commit().await?;
        Ok(CreditResult::Credited { before, after })
    }

    pub async fn get_user_stats(&self, user_id: uuid::Uuid) -> Result<Option<UserStatsRow>> {
        let row = sqlx::query_as::<_, UserStatsRow>(
            "SELECT user_id, total_points, rank_id, updated_at
             FROM user_gamification WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Ledger entries for a user, newest first.
    pub async fn get_points_history(
        &self,
        user_id: uuid::Uuid,
        limit: i64,
    ) -> Result<Vec<PointsHistoryRow>> {
        let rows = sqlx::query_as::<_, PointsHistoryRow>(
            "SELECT id, user_id, action_id, points, metadata, created_at
             FROM points_history WHERE user_id = $1
             ORDER BY created_at DESC, id DESC
             LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Occurrences of an action for a user since `since` (all time if `None`).
    pub async fn count_action_occurrences(
        &self,
        user_id: uuid::Uuid,
        action_id: &str,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM points_history
             WHERE user_id = $1 AND action_id = $2 AND ($3::timestamptz IS NULL OR created_at >= $3)",
        )
        .bind(user_id)
        .bind(action_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Re-derive `rank_id` from the stored `total_points` while holding the
    /// stats row lock, so a late refresh can never write a rank computed
    /// from an older total. Returns the change, if any.
    pub async fn sync_user_rank(&self, user_id: uuid::Uuid) -> Result<Option<RankChange>> {
        let mut tx = self.pool.begin().await?;
        let Some((total, from)) = sqlx::query_as::<_, (i64, Option<i64>)>(
            "SELECT total_points, rank_id FROM user_gamification WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let to: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM ranks WHERE min_points <= $1
             ORDER BY min_points DESC, sort_order DESC LIMIT 1",
        )
        .bind(total)
        .fetch_optional(&mut *tx)
        .await?;
        if to == from {
            return Ok(None);
        }

        sqlx::query(
            "UPDATE user_gamification SET rank_id = $2, updated_at = NOW() WHERE user_id = $1",
        )
        .bind(user_id)
        .bind(to)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(RankChange { from, to }))
    }
}

/// Create the stats row if missing, then lock it and return the total.
pub(super) async fn lock_user_total(conn: &mut PgConnection, user_id: uuid::Uuid) -> Result<i64> {
    sqlx::query("INSERT INTO user_gamification (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let total: i64 = sqlx::query_scalar(
        "SELECT total_points FROM user_gamification WHERE user_id = $1 FOR UPDATE",
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(total)
}

/// Append a ledger row and bump the running total. The caller must hold the
/// lock from [`lock_user_total`]; `before` is the total it returned.
pub(super) async fn append_points(
    conn: &mut PgConnection,
    user_id: uuid::Uuid,
    action_id: &str,
    points: i64,
    mut metadata: serde_json::Map<String, serde_json::Value>,
    before: i64,
) -> Result<i64> {
    let after = before + points;
    metadata.insert("before".into(), before.into());
    metadata.insert("after".into(), after.into());

    sqlx::query(
        "INSERT INTO points_history (user_id, action_id, points, metadata)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(action_id)
    .bind(points)
    .bind(serde_json::Value::Object(metadata))
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        "UPDATE user_gamification SET total_points = $2, updated_at = NOW() WHERE user_id = $1",
    )
    .bind(user_id)
    .bind(after)
    .execute(&mut *conn)
    .await?;
    Ok(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ActionInput {
        ActionInput {
            id: Some("daily_login".into()),
            name: "Daily login".into(),
            description: String::new(),
            base_points: 5,
            max_per_day: Some(1),
            active: true,
        }
    }

    #[test]
    fn action_input_validation() {
        assert!(input().validate().is_ok());

        let mut bad = input();
        bad.name = " ".into();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.base_points = -1;
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.max_per_day = Some(0);
        assert!(bad.validate().is_err());

        let mut uncapped = input();
        uncapped.max_per_day = None;
        assert!(uncapped.validate().is_ok());
    }
}
