//! Broadcast of a project to one distribution group.
//!
//! A professional's group follows their plan: active `elite` subscribers are
//! group 1, active `pro` subscribers group 2, everybody else group 3 (the
//! same mapping as `gamification::PlanTier::distribution_group`). Only
//! professionals whose categories include the project's category are
//! notified, and for pista-scoped projects only those in the same pista.

use anyhow::Result;
use serde::Serialize;

use super::Database;
use crate::project::ProjectRow;

/// A professional who was notified about a project.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct DistributionRecipient {
    pub user_id: uuid::Uuid,
    pub email: Option<String>,
}

impl Database {
    /// Insert a `new_project` notification for every eligible professional
    /// of `group` in one statement and return who was notified.
    pub async fn distribute_to_group(
        &self,
        project: &ProjectRow,
        group: i32,
    ) -> Result<Vec<DistributionRecipient>> {
        let rows = sqlx::query_as::<_, DistributionRecipient>(
            "WITH eligible AS (
                 SELECT p.id, p.email
                 FROM profiles p
                 LEFT JOIN subscriptions s
                        ON s.user_id = p.id AND s.status IN ('active', 'trialing')
                 WHERE p.role = 'professional'
                   AND p.id <> $1
                   AND $2 = ANY(p.categories)
                   AND ($3 = 'national' OR p.pista = $4)
                   AND (CASE s.plan
                          WHEN 'elite' THEN 1
                          WHEN 'pro' THEN 2
                          ELSE 3
                        END) = $5
             ),
             inserted AS (
                 INSERT INTO notifications (user_id, kind, title, body, link)
                 SELECT e.id, 'new_project', $6, $7, $8
                 FROM eligible e
                 RETURNING user_id
             )
             SELECT i.user_id, e.email
             FROM inserted i
             JOIN eligible e ON e.id = i.user_id",
        )
        .bind(project.client_id)
        .bind(&project.category)
        .bind(&project.scope)
        .bind(project.pista.as_deref())
        .bind(group)
        .bind(format!("Novo projeto disponível: {}", project.title))
        .bind(format!(
            "Categoria {}. Seja o primeiro a aceitar.",
            project.category
        ))
        .bind(format!("/projetos/{}", project.id))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
