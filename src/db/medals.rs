//! Medal catalogue and awards. A medal is awarded to a user at most once
//! (`user_medals` primary key); its `points_reward` is paid into the ledger
//! in the same transaction as the award.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::gamification::{append_points, lock_user_total};
use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MedalRow {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub points_reward: i32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserMedalRow {
    pub medal_id: i64,
    pub slug: String,
    pub name: String,
    pub icon: String,
    pub awarded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MedalInput {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub points_reward: i32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl MedalInput {
    pub fn validate(&self) -> Result<(), String> {
        let slug = self.slug.trim();
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            return Err("slug must be lowercase letters, digits, '-' or '_'".into());
        }
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.points_reward < 0 {
            return Err("points_reward must be non-negative".into());
        }
        Ok(())
    }
}

/// Result of [`Database::award_medal_tx`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MedalAward {
    Awarded { points: i64, total: i64 },
    AlreadyHeld,
}

const MEDAL_COLUMNS: &str = "id, slug, name, description, icon, points_reward, active";

impl Database {
    pub async fn list_medals(&self) -> Result<Vec<MedalRow>> {
        let rows = sqlx::query_as::<_, MedalRow>(&format!(
            "SELECT {MEDAL_COLUMNS} FROM medals ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn get_medal(&self, id: i64) -> Result<Option<MedalRow>> {
        let row = sqlx::query_as::<_, MedalRow>(&format!(
            "SELECT {MEDAL_COLUMNS} FROM medals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_medal(&self, input: &MedalInput) -> Result<MedalRow> {
        let row = sqlx::query_as::<_, MedalRow>(&format!(
            "INSERT INTO medals (slug, name, description, icon, points_reward, active)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {MEDAL_COLUMNS}"
        ))
        .bind(input.slug.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.icon)
        .bind(input.points_reward)
        .bind(input.active)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_medal(&self, id: i64, input: &MedalInput) -> Result<Option<MedalRow>> {
        let row = sqlx::query_as::<_, MedalRow>(&format!(
            "UPDATE medals SET slug = $2, name = $3, description = $4, icon = $5,
                               points_reward = $6, active = $7, updated_at = NOW()
             WHERE id = $1
             RETURNING {MEDAL_COLUMNS}"
        ))
        .bind(id)
        .bind(input.slug.trim())
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.icon)
        .bind(input.points_reward)
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_medal(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM medals WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Award `medal` once. The reward is credited under action
    /// `medal:<id>` without a plan multiplier.
    pub async fn award_medal_tx(&self, user_id: uuid::Uuid, medal: &MedalRow) -> Result<MedalAward> {
        let mut tx = self.pool.begin().await?;
        let before = lock_user_total(&mut tx, user_id).await?;

        let inserted = sqlx::query(
            "INSERT INTO user_medals (user_id, medal_id) VALUES ($1, $2)
             ON CONFLICT (user_id, medal_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(medal.id)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(MedalAward::AlreadyHeld);
        }

        let points = i64::from(medal.points_reward);
        let total = if points > 0 {
            let mut metadata = serde_json::Map::new();
            metadata.insert("medal".into(), medal.slug.clone().into());
            append_points(&mut tx, user_id, &format!("medal:{}", medal.id), points, metadata, before)
                .await?
        } else {
            before
        };
        tx.commit().await?;
        Ok(MedalAward::Awarded { points, total })
    }

    pub async fn list_user_medals(&self, user_id: uuid::Uuid) -> Result<Vec<UserMedalRow>> {
        let rows = sqlx::query_as::<_, UserMedalRow>(
            "SELECT m.id AS medal_id, m.slug, m.name, m.icon, um.awarded_at
             FROM user_medals um
             JOIN medals m ON m.id = um.medal_id
             WHERE um.user_id = $1
             ORDER BY um.awarded_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_must_be_url_safe() {
        let mut input = MedalInput {
            slug: "first-project".into(),
            name: "Primeiro projeto".into(),
            description: String::new(),
            icon: String::new(),
            points_reward: 100,
            active: true,
        };
        assert!(input.validate().is_ok());
        input.slug = "First Project".into();
        assert!(input.validate().is_err());
        input.slug = "ok_1".into();
        input.points_reward = -1;
        assert!(input.validate().is_err());
    }
}
