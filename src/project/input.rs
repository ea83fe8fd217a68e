//! Request payload validation for project creation, status changes and
//! proposals.

use serde::Deserialize;

use super::types::{ProjectScope, ProjectStatus};

/// Raw `POST /api/projects` body.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub pista: Option<String>,
    pub budget_cents: Option<i64>,
}

fn default_scope() -> String {
    "national".to_string()
}

/// A validated project ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub category: String,
    pub scope: ProjectScope,
    pub pista: Option<String>,
    pub budget_cents: Option<i64>,
}

impl CreateProjectPayload {
    pub fn validate(self) -> Result<NewProject, String> {
        let title = self.title.trim().to_string();
        let title_chars = title.chars().count();
        if !(3..=160).contains(&title_chars) {
            return Err("title must be between 3 and 160 characters".into());
        }
        let category = self.category.trim().to_lowercase();
        if category.is_empty() {
            return Err("category is required".into());
        }
        let scope: ProjectScope = self.scope.parse()?;
        let pista = self
            .pista
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        if scope == ProjectScope::Pista && pista.is_none() {
            return Err("pista is required for pista-scoped projects".into());
        }
        if let Some(budget) = self.budget_cents {
            if budget < 0 {
                return Err("budget_cents must be non-negative".into());
            }
        }
        Ok(NewProject {
            title,
            description: self.description.trim().to_string(),
            category,
            scope,
            pista,
            budget_cents: self.budget_cents,
        })
    }
}

/// Tracking token handed to the client: 32 lowercase hex chars.
pub fn generate_tracking_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Post-acceptance transitions: `accepted → in_progress → completed`.
pub fn validate_status_transition(
    from: ProjectStatus,
    to: ProjectStatus,
) -> Result<(), String> {
    match (from, to) {
        (ProjectStatus::Accepted, ProjectStatus::InProgress)
        | (ProjectStatus::Accepted, ProjectStatus::Completed)
        | (ProjectStatus::InProgress, ProjectStatus::Completed) => Ok(()),
        _ => Err(format!("cannot move a project from {} to {}", from, to)),
    }
}

/// Raw `POST /api/projects/{id}/proposals` body.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalPayload {
    pub amount_cents: i64,
    #[serde(default)]
    pub message: String,
}

impl ProposalPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.amount_cents < 0 {
            return Err("amount_cents must be non-negative".into());
        }
        if self.message.len() > 4000 {
            return Err("message must be at most 4000 characters".into());
        }
        Ok(())
    }
}
