//! Member classified ads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{like_pattern, safe_sort_dir, Database};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AdRow {
    pub id: i64,
    pub owner_id: uuid::Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// Query-string filter for `GET /api/marketplace`.
#[derive(Debug, Default, Deserialize)]
pub struct AdFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub owner: Option<uuid::Uuid>,
    /// Defaults to `active`; `all` lists every status.
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A validated ad, as written by create and update.
#[derive(Debug, Clone, PartialEq)]
pub struct AdFields {
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub status: String,
}

const AD_COLUMNS: &str = "id, owner_id, title, description, price_cents, category, image_url,
                          status, created_at, updated_at";

/// Whitelisted ORDER BY column.
fn safe_sort_column(col: Option<&str>) -> &'static str {
    match col {
        Some("price") | Some("price_cents") => "price_cents",
        Some("title") => "title",
        Some("updated_at") => "updated_at",
        _ => "created_at",
    }
}

impl Database {
    pub async fn create_ad(&self, owner_id: uuid::Uuid, ad: &AdFields) -> Result<AdRow> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "INSERT INTO marketplace_ads (owner_id, title, description, price_cents, category,
                                          image_url, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {AD_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(ad.price_cents)
        .bind(&ad.category)
        .bind(ad.image_url.as_deref())
        .bind(&ad.status)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_ad(&self, id: i64) -> Result<Option<AdRow>> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "SELECT {AD_COLUMNS} FROM marketplace_ads WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Filtered listing. User text only reaches SQL as bind parameters;
    /// sort column and direction come from whitelists.
    pub async fn list_ads(&self, filter: &AdFilter) -> Result<Vec<AdRow>> {
        let column = safe_sort_column(filter.sort_by.as_deref());
        let dir = safe_sort_dir(filter.sort_dir.as_deref());
        let limit = filter.limit.unwrap_or(50).clamp(1, 200);
        let offset = filter.offset.unwrap_or(0).max(0);
        let status = match filter.status.as_deref() {
            Some("all") => None,
            Some(s) => Some(s.to_string()),
            None => Some("active".to_string()),
        };
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let rows = sqlx::query_as::<_, AdRow>(&format!(
            "SELECT {AD_COLUMNS} FROM marketplace_ads
             WHERE ($1::text IS NULL OR category = $1)
               AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2)
               AND ($3::uuid IS NULL OR owner_id = $3)
               AND ($4::text IS NULL OR status = $4)
             ORDER BY {column} {dir}, id {dir}
             LIMIT $5 OFFSET $6"
        ))
        .bind(filter.category.as_deref().map(|c| c.trim().to_lowercase()))
        .bind(search)
        .bind(filter.owner)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn update_ad(&self, id: i64, ad: &AdFields) -> Result<Option<AdRow>> {
        let row = sqlx::query_as::<_, AdRow>(&format!(
            "UPDATE marketplace_ads SET
                title = $2, description = $3, price_cents = $4, category = $5,
                image_url = $6, status = $7, updated_at = NOW()
             WHERE id = $1
             RETURNING {AD_COLUMNS}"
        ))
        .bind(id)
        .bind(&ad.title)
        .bind(&ad.description)
        .bind(ad.price_cents)
        .bind(&ad.category)
        .bind(ad.image_url.as_deref())
        .bind(&ad.status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn delete_ad(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM marketplace_ads WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_column_is_whitelisted() {
        assert_eq!(safe_sort_column(Some("price")), "price_cents");
        assert_eq!(safe_sort_column(Some("title")), "title");
        assert_eq!(safe_sort_column(Some("owner_id; DROP TABLE x")), "created_at");
        assert_eq!(safe_sort_column(None), "created_at");
    }
}
