//! Referral registrations. A member can be referred once (unique
//! `referred_id`).

use anyhow::Result;
use serde::Serialize;

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReferralRow {
    pub id: i64,
    pub referrer_id: uuid::Uuid,
    pub referred_id: uuid::Uuid,
    pub code: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Database {
    /// Record a referral. Returns `None` if `referred_id` was already
    /// referred by someone.
    pub async fn create_referral(
        &self,
        referrer_id: uuid::Uuid,
        referred_id: uuid::Uuid,
        code: &str,
    ) -> Result<Option<ReferralRow>> {
        let row = sqlx::query_as::<_, ReferralRow>(
            "INSERT INTO referrals (referrer_id, referred_id, code)
             VALUES ($1, $2, $3)
             ON CONFLICT (referred_id) DO NOTHING
             RETURNING id, referrer_id, referred_id, code, created_at",
        )
        .bind(referrer_id)
        .bind(referred_id)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn count_referrals_by(&self, referrer_id: uuid::Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM referrals WHERE referrer_id = $1")
            .bind(referrer_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
