//! Missions: "do action X N times" goals. Progress is derived from the
//! ledger, claims are recorded once per (user, mission, season).

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::gamification::{append_points, lock_user_total};
use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MissionRow {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub action_id: String,
    pub target_count: i32,
    pub points_reward: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MissionInput {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub action_id: String,
    pub target_count: i32,
    #[serde(default)]
    pub points_reward: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl MissionInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".into());
        }
        if self.action_id.trim().is_empty() {
            return Err("action_id is required".into());
        }
        if self.target_count <= 0 {
            return Err("target_count must be positive".into());
        }
        if self.points_reward < 0 {
            return Err("points_reward must be non-negative".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionClaim {
    Claimed { points: i64, total: i64 },
    NotReady { progress: i64 },
    AlreadyClaimed,
}

const MISSION_COLUMNS: &str =
    "id, title, description, action_id, target_count, points_reward, active";

impl Database {
    pub async fn list_missions(&self, active_only: bool) -> Result<Vec<MissionRow>> {
        let rows = sqlx::query_as::<_, MissionRow>(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions
             WHERE (NOT $1 OR active) ORDER BY id"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_mission(&self, id: i64) -> Result<Option<MissionRow>> {
        let row = sqlx::query_as::<_, MissionRow>(&format!(
            "SELECT {MISSION_COLUMNS} FROM missions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_mission(&self, input: &MissionInput) -> Result<MissionRow> {
        let row = sqlx::query_as::<_, MissionRow>(&format!(
            "INSERT INTO missions (title, description, action_id, target_count, points_reward, active)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MISSION_COLUMNS}"
        ))
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.action_id.trim())
        .bind(input.target_count)
        .bind(input.points_reward)
        .bind(input.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_mission(&self, id: i64, input: &MissionInput) -> Result<Option<MissionRow>> {
        let row = sqlx::query_as::<_, MissionRow>(&format!(
            "UPDATE missions SET title = $2, description = $3, action_id = $4,
                                 target_count = $5, points_reward = $6, active = $7,
                                 updated_at = NOW()
             WHERE id = $1
             RETURNING {MISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(input.title.trim())
        .bind(&input.description)
        .bind(input.action_id.trim())
        .bind(input.target_count)
        .bind(input.points_reward)
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_mission(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM missions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mission ids the user already claimed in `season_id` (0 = no season).
    pub async fn claimed_mission_ids(&self, user_id: uuid::Uuid, season_id: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT mission_id FROM user_missions WHERE user_id = $1 AND season_id = $2",
        )
        .bind(user_id)
        .bind(season_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Claim a mission's reward under the user's row lock.
    ///
    /// Progress is recounted inside the transaction so a claim can never
    /// race ahead of the ledger.
    pub async fn claim_mission_tx(
        &self,
        user_id: uuid::Uuid,
        mission: &MissionRow,
        season_id: i64,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<MissionClaim> {
        let mut tx = self.pool.begin().await?;
        let before = lock_user_total(&mut tx, user_id).await?;

        let progress: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM points_history
             WHERE user_id = $1 AND action_id = $2 AND ($3::timestamptz IS NULL OR created_at >= $3)",
        )
        .bind(user_id)
        .bind(&mission.action_id)
        .bind(since)
        .fetch_one(&mut *tx)
        .await?;
        if progress < i64::from(mission.target_count) {
            tx.rollback().await?;
            return Ok(MissionClaim::NotReady { progress });
        }

        let inserted = sqlx::query(
            "INSERT INTO user_missions (user_id, mission_id, season_id) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, mission_id, season_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(mission.id)
        .bind(season_id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(MissionClaim::AlreadyClaimed);
        }

        let points = i64::from(mission.points_reward);
        let total = if points > 0 {
            let mut metadata = serde_json::Map::new();
            metadata.insert("season_id".into(), season_id.into());
            metadata.insert("progress".into(), progress.into());
            append_points(&mut tx, user_id, &format!("mission:{}", mission.id), points, metadata, before)
                .await?
        } else {
            before
        };
        tx.commit().await?;
        Ok(MissionClaim::Claimed { points, total })
    }
}
