//! Professional bids on projects. One proposal per professional per project
//! (unique constraint); resubmitting is a conflict.

use anyhow::Result;

use super::Database;
use crate::project::ProposalRow;

const PROPOSAL_COLUMNS: &str =
    "id, project_id, professional_id, amount_cents, message, status, created_at, updated_at";

impl Database {
    /// Insert a proposal. Returns `None` when this professional already bid
    /// on the project.
    pub async fn create_proposal(
        &self,
        project_id: i64,
        professional_id: uuid::Uuid,
        amount_cents: i64,
        message: &str,
    ) -> Result<Option<ProposalRow>> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "INSERT INTO project_proposals (project_id, professional_id, amount_cents, message)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (project_id, professional_id) DO NOTHING
             RETURNING {PROPOSAL_COLUMNS}"
        ))
        .bind(project_id)
        .bind(professional_id)
        .bind(amount_cents)
        .bind(message)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn list_proposals(&self, project_id: i64) -> Result<Vec<ProposalRow>> {
        let rows = sqlx::query_as::<_, ProposalRow>(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM project_proposals
             WHERE project_id = $1 ORDER BY created_at"
        ))
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Change a proposal's status while it is still `pending`.
    pub async fn update_proposal_status(
        &self,
        project_id: i64,
        proposal_id: i64,
        status: &str,
    ) -> Result<Option<ProposalRow>> {
        let row = sqlx::query_as::<_, ProposalRow>(&format!(
            "UPDATE project_proposals SET status = $3, updated_at = NOW()
             WHERE id = $2 AND project_id = $1 AND status = 'pending'
             RETURNING {PROPOSAL_COLUMNS}"
        ))
        .bind(project_id)
        .bind(proposal_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
