//! Profile queries: role lookup, profile edits and referral codes.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProfileRow {
    pub id: uuid::Uuid,
    pub role: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub bio: String,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub categories: Vec<String>,
    pub pista: Option<String>,
    pub referral_code: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProfileRow {
    pub fn is_professional(&self) -> bool {
        self.role == "professional"
    }

    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    /// Name, bio and avatar filled in; professionals also need categories.
    pub fn is_complete(&self) -> bool {
        let filled = |v: Option<&str>| v.is_some_and(|s| !s.trim().is_empty());
        filled(self.display_name.as_deref())
            && filled(self.avatar_url.as_deref())
            && !self.bio.trim().is_empty()
            && (!self.is_professional() || !self.categories.is_empty())
    }

    /// Public projection: drops contact data.
    pub fn public_view(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "role": self.role,
            "display_name": self.display_name,
            "bio": self.bio,
            "avatar_url": self.avatar_url,
            "company": self.company,
            "categories": self.categories,
            "pista": self.pista,
            "created_at": self.created_at,
        })
    }
}

/// Editable profile fields. `None` leaves the column unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub categories: Option<Vec<String>>,
    pub pista: Option<String>,
}

impl ProfileUpdate {
    /// Trim text fields and normalize categories (lowercase, deduplicated).
    pub fn validate(mut self) -> Result<Self, String> {
        if let Some(name) = self.display_name.as_mut() {
            *name = name.trim().to_string();
            if name.is_empty() || name.chars().count() > 80 {
                return Err("display_name must be between 1 and 80 characters".into());
            }
        }
        if self.bio.as_ref().is_some_and(|b| b.len() > 2000) {
            return Err("bio must be at most 2000 characters".into());
        }
        if let Some(categories) = self.categories.as_mut() {
            let mut normalized: Vec<String> = categories
                .iter()
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect();
            normalized.sort();
            normalized.dedup();
            if normalized.len() > 20 {
                return Err("at most 20 categories".into());
            }
            *categories = normalized;
        }
        if let Some(pista) = self.pista.as_mut() {
            *pista = pista.trim().to_string();
        }
        Ok(self)
    }
}

const PROFILE_COLUMNS: &str = "id, role, email, display_name, bio, avatar_url, company, phone,
                               categories, pista, referral_code, created_at, updated_at";

impl Database {
    pub async fn get_profile(&self, user_id: uuid::Uuid) -> Result<Option<ProfileRow>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Get the role for a user (returns "client" if no profile exists).
    pub async fn get_profile_role(&self, user_id: uuid::Uuid) -> Result<String> {
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM profiles WHERE id = $1")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(role.unwrap_or_else(|| "client".to_string()))
    }

    /// Create a profile row if the auth user has none yet.
    ///
    /// In production a Supabase trigger on `auth.users` does this; the
    /// service calls it too so a fresh token never hits a missing row.
    pub async fn ensure_profile(
        &self,
        user_id: uuid::Uuid,
        email: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO profiles (id, email, referral_code)
             VALUES ($1, $2, $3)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(user_id)
        .bind(email)
        .bind(referral_code_for(user_id))
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn update_profile(
        &self,
        user_id: uuid::Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<ProfileRow>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "UPDATE profiles SET
                display_name = COALESCE($2, display_name),
                bio          = COALESCE($3, bio),
                avatar_url   = COALESCE($4, avatar_url),
                company      = COALESCE($5, company),
                phone        = COALESCE($6, phone),
                categories   = COALESCE($7, categories),
                pista        = COALESCE($8, pista),
                updated_at   = NOW()
             WHERE id = $1
             RETURNING {PROFILE_COLUMNS}"
        ))
        .bind(user_id)
        .bind(update.display_name.as_deref())
        .bind(update.bio.as_deref())
        .bind(update.avatar_url.as_deref())
        .bind(update.company.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.categories.as_deref())
        .bind(update.pista.as_deref())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_profile_by_referral_code(&self, code: &str) -> Result<Option<ProfileRow>> {
        let row = sqlx::query_as::<_, ProfileRow>(&format!(
            "SELECT {PROFILE_COLUMNS} FROM profiles WHERE referral_code = $1"
        ))
        .bind(code.trim().to_uppercase())
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Set a user's role (admin operation).
    pub async fn set_profile_role(&self, user_id: uuid::Uuid, role: &str) -> Result<bool> {
        let result = sqlx::query("UPDATE profiles SET role = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(role)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Referral code derived from the user id: 8 upper-case hex chars.
pub fn referral_code_for(user_id: uuid::Uuid) -> String {
    user_id.simple().to_string()[..8].to_uppercase()
}
