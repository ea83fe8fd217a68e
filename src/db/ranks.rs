//! Rank ladder (admin CRUD). Ranks are ordered by `min_points`.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RankRow {
    pub id: i64,
    pub name: String,
    pub min_points: i64,
    pub icon: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RankInput {
    pub name: String,
    pub min_points: i64,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub sort_order: i32,
}

impl RankInput {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".into());
        }
        if self.min_points < 0 {
            return Err("min_points must be non-negative".into());
        }
        Ok(())
    }
}

impl Database {
    /// All ranks, lowest threshold first.
    pub async fn list_ranks(&self) -> Result<Vec<RankRow>> {
        let rows = sqlx::query_as::<_, RankRow>(
            "SELECT id, name, min_points, icon, sort_order FROM ranks
             ORDER BY min_points, sort_order",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn create_rank(&self, input: &RankInput) -> Result<RankRow> {
        let row = sqlx::query_as::<_, RankRow>(
            "INSERT INTO ranks (name, min_points, icon, sort_order)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, min_points, icon, sort_order",
        )
        .bind(input.name.trim())
        .bind(input.min_points)
        .bind(&input.icon)
        .bind(input.sort_order)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn update_rank(&self, id: i64, input: &RankInput) -> Result<Option<RankRow>> {
        let row = sqlx::query_as::<_, RankRow>(
            "UPDATE ranks SET name = $2, min_points = $3, icon = $4, sort_order = $5,
                              updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, min_points, icon, sort_order",
        )
        .bind(id)
        .bind(input.name.trim())
        .bind(input.min_points)
        .bind(&input.icon)
        .bind(input.sort_order)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_rank(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM ranks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
