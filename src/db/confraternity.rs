//! Confraternity invites: meetups between two members.
//!
//! Status moves `pending → accepted | declined | cancelled` and
//! `accepted → completed | cancelled`. Each move is a conditional update on
//! the expected current status.

use anyhow::Result;
use serde::Serialize;

use super::Database;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InviteRow {
    pub id: i64,
    pub inviter_id: uuid::Uuid,
    pub invitee_id: uuid::Uuid,
    pub status: String,
    pub scheduled_for: chrono::DateTime<chrono::Utc>,
    pub location: String,
    pub message: String,
    pub proof_photo_url: Option<String>,
    pub responded_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl InviteRow {
    pub fn involves(&self, user_id: uuid::Uuid) -> bool {
        self.inviter_id == user_id || self.invitee_id == user_id
    }

    /// The other member of the pair, from `user_id`'s point of view.
    pub fn counterpart(&self, user_id: uuid::Uuid) -> uuid::Uuid {
        if self.inviter_id == user_id {
            self.invitee_id
        } else {
            self.inviter_id
        }
    }
}

const INVITE_COLUMNS: &str = "id, inviter_id, invitee_id, status, scheduled_for, location, message,
                              proof_photo_url, responded_at, completed_at, created_at, updated_at";

impl Database {
    /// Insert a pending invite. `None` when the pair already holds an open
    /// invite (partial unique index `idx_confraternity_open_pair`).
    pub async fn create_invite(
        &self,
        inviter_id: uuid::Uuid,
        invitee_id: uuid::Uuid,
        scheduled_for: chrono::DateTime<chrono::Utc>,
        location: &str,
        message: &str,
    ) -> Result<Option<InviteRow>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "INSERT INTO confraternity_invites (inviter_id, invitee_id, scheduled_for, location, message)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT DO NOTHING
             RETURNING {INVITE_COLUMNS}"
        ))
        .bind(inviter_id)
        .bind(invitee_id)
        .bind(scheduled_for)
        .bind(location)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_invite(&self, id: i64) -> Result<Option<InviteRow>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {INVITE_COLUMNS} FROM confraternity_invites WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Invites sent or received by a user, newest first.
    pub async fn list_invites_for_user(&self, user_id: uuid::Uuid) -> Result<Vec<InviteRow>> {
        let rows = sqlx::query_as::<_, InviteRow>(&format!(
            "SELECT {INVITE_COLUMNS} FROM confraternity_invites
             WHERE inviter_id = $1 OR invitee_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Whether a pending or accepted invite exists between the two members,
    /// in either direction.
    pub async fn has_open_invite_between(&self, a: uuid::Uuid, b: uuid::Uuid) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM confraternity_invites
                 WHERE status IN ('pending', 'accepted')
                   AND ((inviter_id = $1 AND invitee_id = $2) OR (inviter_id = $2 AND invitee_id = $1))
             )",
        )
        .bind(a)
        .bind(b)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Completed meetups between the pair since `since`, either direction.
    pub async fn count_completed_between_since(
        &self,
        a: uuid::Uuid,
        b: uuid::Uuid,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM confraternity_invites
             WHERE status = 'completed' AND completed_at >= $3
               AND ((inviter_id = $1 AND invitee_id = $2) OR (inviter_id = $2 AND invitee_id = $1))",
        )
        .bind(a)
        .bind(b)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Invitee's answer to a pending invite (`accepted` or `declined`).
    pub async fn respond_invite(
        &self,
        id: i64,
        invitee_id: uuid::Uuid,
        status: &str,
    ) -> Result<Option<InviteRow>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "UPDATE confraternity_invites
             SET status = $3, responded_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND invitee_id = $2 AND status = 'pending'
             RETURNING {INVITE_COLUMNS}"
        ))
        .bind(id)
        .bind(invitee_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Mark an accepted invite completed with its proof photo.
    pub async fn complete_invite(&self, id: i64, proof_photo_url: &str) -> Result<Option<InviteRow>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "UPDATE confraternity_invites
             SET status = 'completed', proof_photo_url = $2, completed_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'accepted'
             RETURNING {INVITE_COLUMNS}"
        ))
        .bind(id)
        .bind(proof_photo_url)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Inviter cancels while the invite is pending or accepted.
    pub async fn cancel_invite(&self, id: i64, inviter_id: uuid::Uuid) -> Result<Option<InviteRow>> {
        let row = sqlx::query_as::<_, InviteRow>(&format!(
            "UPDATE confraternity_invites
             SET status = 'cancelled', updated_at = NOW()
             WHERE id = $1 AND inviter_id = $2 AND status IN ('pending', 'accepted')
             RETURNING {INVITE_COLUMNS}"
        ))
        .bind(id)
        .bind(inviter_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
