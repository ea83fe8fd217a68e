//! Stripe-backed subscription state, one row per user.
//!
//! Only `active` and `trialing` subscriptions grant a paid plan; anything
//! else reads as `free`.

use anyhow::Result;
use serde::Serialize;

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SubscriptionRow {
    pub user_id: uuid::Uuid,
    pub plan: String,
    pub status: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub current_period_end: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl SubscriptionRow {
    pub fn is_active(&self) -> bool {
        matches!(self.status.as_str(), "active" | "trialing")
    }

    /// Plan that currently applies (`free` unless the subscription is live).
    pub fn effective_plan(&self) -> &str {
        if self.is_active() {
            &self.plan
        } else {
            "free"
        }
    }
}

/// Values written by the Stripe webhook.
#[derive(Debug, Clone)]
pub struct SubscriptionUpsert<'a> {
    pub plan: &'a str,
    pub status: &'a str,
    pub stripe_customer_id: Option<&'a str>,
    pub stripe_subscription_id: Option<&'a str>,
    pub current_period_end: Option<chrono::DateTime<chrono::Utc>>,
}

const SUBSCRIPTION_COLUMNS: &str = "user_id, plan, status, stripe_customer_id,
                                    stripe_subscription_id, current_period_end, updated_at";

impl Database {
    pub async fn get_subscription(&self, user_id: uuid::Uuid) -> Result<Option<SubscriptionRow>> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Effective plan name for point multipliers and distribution groups.
    pub async fn get_user_plan(&self, user_id: uuid::Uuid) -> Result<String> {
        Ok(self
            .get_subscription(user_id)
            .await?
            .map(|s| s.effective_plan().to_string())
            .unwrap_or_else(|| "free".to_string()))
    }

    pub async fn upsert_subscription(
        &self,
        user_id: uuid::Uuid,
        sub: &SubscriptionUpsert<'_>,
    ) -> Result<SubscriptionRow> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO subscriptions (user_id, plan, status, stripe_customer_id,
                                        stripe_subscription_id, current_period_end)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (user_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                stripe_customer_id = COALESCE(EXCLUDED.stripe_customer_id, subscriptions.stripe_customer_id),
                stripe_subscription_id = COALESCE(EXCLUDED.stripe_subscription_id, subscriptions.stripe_subscription_id),
                current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
                updated_at = NOW()
             RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(user_id)
        .bind(sub.plan)
        .bind(sub.status)
        .bind(sub.stripe_customer_id)
        .bind(sub.stripe_subscription_id)
        .bind(sub.current_period_end)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    /// Remember the Stripe customer created for a user.
    pub async fn set_stripe_customer(&self, user_id: uuid::Uuid, customer_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO subscriptions (user_id, stripe_customer_id) VALUES ($1, $2)
             ON CONFLICT (user_id) DO UPDATE SET stripe_customer_id = EXCLUDED.stripe_customer_id,
                                                 updated_at = NOW()",
        )
        .bind(user_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Apply a `customer.subscription.*` event. `plan` is left unchanged
    /// when `None`. Returns `false` for subscriptions we do not know.
    pub async fn update_subscription_by_stripe_id(
        &self,
        stripe_subscription_id: &str,
        status: &str,
        plan: Option<&str>,
        current_period_end: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE subscriptions SET
                status = $2,
                plan = COALESCE($3, plan),
                current_period_end = COALESCE($4, current_period_end),
                updated_at = NOW()
             WHERE stripe_subscription_id = $1",
        )
        .bind(stripe_subscription_id)
        .bind(status)
        .bind(plan)
        .bind(current_period_end)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
