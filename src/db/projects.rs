//! Project lifecycle operations.
//!
//! Every state transition is a single conditional `UPDATE ... WHERE status =
//! ... RETURNING`, so concurrent requests and overlapping cron runs resolve
//! inside PostgreSQL: the loser simply gets no row back.
//!
//! ## Lifecycle
//!
//! 1. `create_project` — inserts the project (pending, group 1, not yet
//!    notified) and its `created` activity in one transaction
//! 2. `claim_group_notification` / `escalate_project` — stamp a group's
//!    `notified_at` before its broadcast goes out
//! 3. `try_accept_project` — first eligible professional wins
//! 4. `expire_project` — pending after group 3's window → `no_interest`
//! 5. `update_project_status` — accepted → in_progress → completed

use anyhow::Result;

use super::Database;
use crate::project::{ActivityType, NewProject, ProjectActivityRow, ProjectRow, ProjectStatus};

const PROJECT_COLUMNS: &str = "id, client_id, title, description, category, scope, pista,
                               budget_cents, status, current_group,
                               group1_notified_at, group2_notified_at, group3_notified_at,
                               accepted_by, accepted_at, completed_at, tracking_token,
                               created_at, updated_at";

/// Column holding the notification stamp of a distribution group.
/// Only whitelisted names ever reach SQL text.
fn notified_column(group: i32) -> Option<&'static str> {
    match group {
        1 => Some("group1_notified_at"),
        2 => Some("group2_notified_at"),
        3 => Some("group3_notified_at"),
        _ => None,
    }
}

impl Database {
    /// Insert a project with its `created` activity.
    pub async fn create_project(
        &self,
        client_id: uuid::Uuid,
        project: &NewProject,
        tracking_token: &str,
    ) -> Result<ProjectRow> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "INSERT INTO projects (client_id, title, description, category, scope, pista,
                                   budget_cents, tracking_token)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(client_id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.category)
        .bind(project.scope.as_str())
        .bind(project.pista.as_deref())
        .bind(project.budget_cents)
        .bind(tracking_token)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO project_activities (project_id, actor_id, activity_type, detail)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(row.id)
        .bind(client_id)
        .bind(ActivityType::Created.as_str())
        .bind(serde_json::json!({
            "category": row.category,
            "scope": row.scope,
            "pista": row.pista,
        }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    pub async fn get_project(&self, project_id: i64) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE id = $1"
        ))
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn get_project_by_token(&self, token: &str) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE tracking_token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Projects requested by a client, newest first.
    pub async fn list_projects_for_client(&self, client_id: uuid::Uuid) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE client_id = $1 ORDER BY created_at DESC"
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Pending projects a professional could accept: matching category and,
    /// for pista-scoped projects, the same pista.
    pub async fn list_open_projects_for_professional(
        &self,
        categories: &[String],
        pista: Option<&str>,
    ) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE status = 'pending'
               AND category = ANY($1)
               AND (scope = 'national' OR pista = $2)
             ORDER BY created_at DESC
             LIMIT 200"
        ))
        .bind(categories)
        .bind(pista)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Projects a professional has accepted, newest first.
    pub async fn list_projects_accepted_by(
        &self,
        professional_id: uuid::Uuid,
    ) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE accepted_by = $1 ORDER BY accepted_at DESC"
        ))
        .bind(professional_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Conditional accept. Returns `None` when another request already moved
    /// the project out of `pending` or set `accepted_by`.
    pub async fn try_accept_project(
        &self,
        project_id: i64,
        professional_id: uuid::Uuid,
    ) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects
             SET status = 'accepted', accepted_by = $2, accepted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'pending' AND accepted_by IS NULL
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(project_id)
        .bind(professional_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Pending projects whose current group was notified at or before
    /// `cutoff`, or never notified at all.
    pub async fn projects_due_for_distribution(
        &self,
        cutoff: chrono::DateTime<chrono::Utc>,
        limit: i64,
    ) -> Result<Vec<ProjectRow>> {
        let rows = sqlx::query_as::<_, ProjectRow>(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE status = 'pending'
               AND COALESCE(CASE current_group
                              WHEN 1 THEN group1_notified_at
                              WHEN 2 THEN group2_notified_at
                              ELSE group3_notified_at
                            END, '-infinity'::timestamptz) <= $1
             ORDER BY created_at
             LIMIT $2"
        ))
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Stamp the current group's `notified_at` on a project that has never
    /// been broadcast to it. Returns `false` if someone else got there first
    /// or the project left `pending`.
    pub async fn claim_group_notification(&self, project_id: i64, group: i32) -> Result<bool> {
        let Some(column) = notified_column(group) else {
            anyhow::bail!("invalid distribution group {}", group);
        };
        let result = sqlx::query(&format!(
            "UPDATE projects SET {column} = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'pending' AND current_group = $2 AND {column} IS NULL"
        ))
        .bind(project_id)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Undo a notification stamp after a failed broadcast so the next cron
    /// run retries the group.
    pub async fn clear_group_notification(&self, project_id: i64, group: i32) -> Result<()> {
        let Some(column) = notified_column(group) else {
            anyhow::bail!("invalid distribution group {}", group);
        };
        sqlx::query(&format!(
            "UPDATE projects SET {column} = NULL, updated_at = NOW()
             WHERE id = $1 AND status = 'pending' AND current_group = $2"
        ))
        .bind(project_id)
        .bind(group)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move a pending project from group `from` to `from + 1`, stamp the
    /// new group's `notified_at` and log the `escalated` activity, all in
    /// one transaction. Conditional on the project still sitting in `from`,
    /// so two overlapping cron runs escalate it once.
    pub async fn escalate_project(&self, project_id: i64, from: i32) -> Result<Option<ProjectRow>> {
        let to = from + 1;
        let Some(column) = notified_column(to) else {
            anyhow::bail!("cannot escalate past group {}", from);
        };
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects
             SET current_group = $3, {column} = NOW(), updated_at = NOW()
             WHERE id = $1 AND status = 'pending' AND current_group = $2
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(project_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO project_activities (project_id, actor_id, activity_type, detail)
             VALUES ($1, NULL, $2, $3)",
        )
        .bind(project_id)
        .bind(ActivityType::Escalated.as_str())
        .bind(serde_json::json!({ "from_group": from, "to_group": to }))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    /// Mark a project that went unanswered through every group as
    /// `no_interest`, together with its activity row and the client's
    /// notification.
    pub async fn expire_project(&self, project_id: i64) -> Result<Option<ProjectRow>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects SET status = 'no_interest', updated_at = NOW()
             WHERE id = $1 AND status = 'pending' AND current_group = 3
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(project_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO project_activities (project_id, actor_id, activity_type, detail)
             VALUES ($1, NULL, $2, $3)",
        )
        .bind(row.id)
        .bind(ActivityType::NoInterest.as_str())
        .bind(serde_json::json!({
            "hours_pending": (row.updated_at - row.created_at).num_hours(),
        }))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO notifications (user_id, kind, title, body, link)
             VALUES ($1, 'project_no_interest', $2, $3, $4)",
        )
        .bind(row.client_id)
        .bind("Nenhum profissional aceitou seu projeto")
        .bind(format!(
            "O projeto \"{}\" passou por todos os grupos sem ser aceito.",
            row.title
        ))
        .bind(format!("/projetos/{}", row.id))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row))
    }

    /// Conditional status change (`from` must still be the current status).
    ///
    /// Sets `completed_at` when moving to `completed`.
    pub async fn update_project_status(
        &self,
        project_id: i64,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> Result<Option<ProjectRow>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!(
            "UPDATE projects
             SET status = $3, updated_at = NOW(),
                 completed_at = CASE WHEN $3 = 'completed' THEN NOW() ELSE completed_at END
             WHERE id = $1 AND status = $2
             RETURNING {PROJECT_COLUMNS}"
        ))
        .bind(project_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Append an activity row.
    pub async fn insert_project_activity(
        &self,
        project_id: i64,
        actor_id: Option<uuid::Uuid>,
        activity: ActivityType,
        detail: Option<serde_json::Value>,
    ) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO project_activities (project_id, actor_id, activity_type, detail)
             VALUES ($1, $2, $3, $4)
             RETURNING id",
        )
        .bind(project_id)
        .bind(actor_id)
        .bind(activity.as_str())
        .bind(detail)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Activity log of a project, oldest first.
    pub async fn get_project_activities(&self, project_id: i64) -> Result<Vec<ProjectActivityRow>> {
        let rows = sqlx::query_as::<_, ProjectActivityRow>(
            "SELECT id, project_id, actor_id, activity_type, detail, created_at
             FROM project_activities WHERE project_id = $1 ORDER BY created_at, id",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
