//! Database row types and status vocabularies for projects, activities and
//! proposals.
//!
//! Rows keep status columns as `String` (the database CHECK constraints are
//! the source of truth); the enums below are used wherever code branches on
//! a status.

use serde::{Deserialize, Serialize};

/// Lifecycle of a client's service request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Pending,
    Accepted,
    NoInterest,
    InProgress,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Pending => "pending",
            ProjectStatus::Accepted => "accepted",
            ProjectStatus::NoInterest => "no_interest",
            ProjectStatus::InProgress => "in_progress",
            ProjectStatus::Completed => "completed",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ProjectStatus::Pending),
            "accepted" => Ok(ProjectStatus::Accepted),
            "no_interest" => Ok(ProjectStatus::NoInterest),
            "in_progress" => Ok(ProjectStatus::InProgress),
            "completed" => Ok(ProjectStatus::Completed),
            other => Err(format!("unknown project status: {}", other)),
        }
    }
}

/// Which professionals a project is broadcast to.
///
/// - **National**: every professional with a matching category.
/// - **Pista**: only professionals registered in the project's pista.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectScope {
    National,
    Pista,
}

impl ProjectScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectScope::National => "national",
            ProjectScope::Pista => "pista",
        }
    }
}

impl std::str::FromStr for ProjectScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "national" => Ok(ProjectScope::National),
            "pista" => Ok(ProjectScope::Pista),
            other => Err(format!("unknown project scope: {}", other)),
        }
    }
}

/// Entries of the append-only `project_activities` log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityType {
    Created,
    Escalated,
    Accepted,
    NoInterest,
    StatusChanged,
    ProposalSubmitted,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::Created => "created",
            ActivityType::Escalated => "escalated",
            ActivityType::Accepted => "accepted",
            ActivityType::NoInterest => "no_interest",
            ActivityType::StatusChanged => "status_changed",
            ActivityType::ProposalSubmitted => "proposal_submitted",
        }
    }
}

/// Database row for a project.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: i64,
    pub client_id: uuid::Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub scope: String,
    pub pista: Option<String>,
    pub budget_cents: Option<i64>,
    pub status: String,
    pub current_group: i32,
    pub group1_notified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub group2_notified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub group3_notified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub accepted_by: Option<uuid::Uuid>,
    pub accepted_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub tracking_token: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl ProjectRow {
    /// Parsed status; rows violating the CHECK constraint read as `None`.
    pub fn status(&self) -> Option<ProjectStatus> {
        self.status.parse().ok()
    }

    pub fn scope(&self) -> Option<ProjectScope> {
        self.scope.parse().ok()
    }

    /// Notification timestamp of the given distribution group (1–3).
    pub fn group_notified_at(&self, group: i32) -> Option<chrono::DateTime<chrono::Utc>> {
        match group {
            1 => self.group1_notified_at,
            2 => self.group2_notified_at,
            3 => self.group3_notified_at,
            _ => None,
        }
    }

    /// Public tracking projection served to anyone holding the token.
    pub fn tracking_view(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "category": self.category,
            "status": self.status,
            "current_group": self.current_group,
            "accepted": self.accepted_by.is_some(),
            "accepted_at": self.accepted_at,
            "completed_at": self.completed_at,
            "created_at": self.created_at,
        })
    }
}

/// Database row for a project activity.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProjectActivityRow {
    pub id: i64,
    pub project_id: i64,
    pub actor_id: Option<uuid::Uuid>,
    pub activity_type: String,
    pub detail: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Database row for a proposal.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProposalRow {
    pub id: i64,
    pub project_id: i64,
    pub professional_id: uuid::Uuid,
    pub amount_cents: i64,
    pub message: String,
    pub status: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
