//! Race-safe acceptance of a pending project.
//!
//! Many professionals see the same broadcast. The winner is decided by the
//! conditional update in `Database::try_accept_project`; everyone else gets
//! [`AcceptOutcome::RaceLost`]. The pre-checks below only produce better
//! error messages, they are not what guarantees a single `accepted_by`.

use anyhow::Result;
use tracing::{info, warn};

use super::types::{ActivityType, ProjectRow, ProjectScope, ProjectStatus};
use crate::db::profiles::ProfileRow;
use crate::db::Database;
use crate::integrations::email::{self, Mailer};

/// Why a professional may not take a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    NotProfessional,
    OwnProject,
    CategoryMismatch,
    PistaMismatch,
}

impl std::fmt::Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            Ineligible::NotProfessional => "only professionals can accept projects",
            Ineligible::OwnProject => "you cannot accept your own project",
            Ineligible::CategoryMismatch => "project category is not in your categories",
            Ineligible::PistaMismatch => "project is restricted to another pista",
        };
        f.write_str(msg)
    }
}

/// Category and region check for `profile` taking `project`.
pub fn check_eligibility(project: &ProjectRow, profile: &ProfileRow) -> Result<(), Ineligible> {
    if !profile.is_professional() {
        return Err(Ineligible::NotProfessional);
    }
    if project.client_id == profile.id {
        return Err(Ineligible::OwnProject);
    }
    if !profile.categories.contains(&project.category) {
        return Err(Ineligible::CategoryMismatch);
    }
    if project.scope() == Some(ProjectScope::Pista) {
        let same_pista = matches!(
            (project.pista.as_deref(), profile.pista.as_deref()),
            (Some(a), Some(b)) if a == b
        );
        if !same_pista {
            return Err(Ineligible::PistaMismatch);
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum AcceptOutcome {
    Accepted(ProjectRow),
    NotFound,
    /// Already accepted (or otherwise no longer pending) when we looked.
    AlreadyTaken,
    Ineligible(Ineligible),
    /// Was pending when we looked, but another professional's update landed
    /// first.
    RaceLost,
}

/// Accept `project_id` on behalf of `professional`.
///
/// Side effects after a win (activity row, client notification, email) are
/// best-effort: the acceptance itself is already committed.
pub async fn accept_project(
    db: &Database,
    mailer: &Mailer,
    project_id: i64,
    professional: &ProfileRow,
) -> Result<AcceptOutcome> {
    let Some(project) = db.get_project(project_id).await? else {
        return Ok(AcceptOutcome::NotFound);
    };
    if project.status() != Some(ProjectStatus::Pending) || project.accepted_by.is_some() {
        return Ok(AcceptOutcome::AlreadyTaken);
    }
    if let Err(reason) = check_eligibility(&project, professional) {
        return Ok(AcceptOutcome::Ineligible(reason));
    }

    let Some(accepted) = db.try_accept_project(project_id, professional.id).await? else {
        info!(project_id, professional_id = %professional.id, "accept race lost");
        return Ok(AcceptOutcome::RaceLost);
    };
    info!(project_id, professional_id = %professional.id, group = accepted.current_group, "project accepted");

    if let Err(e) = db
        .insert_project_activity(
            accepted.id,
            Some(professional.id),
            ActivityType::Accepted,
            Some(serde_json::json!({ "group": accepted.current_group })),
        )
        .await
    {
        warn!(project_id, error = %e, "failed to record accept activity");
    }

    let who = professional
        .display_name
        .clone()
        .unwrap_or_else(|| "Um profissional".to_string());
    if let Err(e) = db
        .create_notification(
            accepted.client_id,
            "project_accepted",
            "Seu projeto foi aceito",
            &format!("{} aceitou o projeto \"{}\".", who, accepted.title),
            Some(&format!("/projetos/{}", accepted.id)),
        )
        .await
    {
        warn!(project_id, error = %e, "failed to notify client of acceptance");
    }

    match db.get_profile(accepted.client_id).await {
        Ok(Some(client)) => {
            if let Some(address) = client.email.as_deref() {
                let (subject, html) = email::project_accepted(&accepted, &who, mailer.app_url());
                mailer.send_best_effort(address, &subject, &html).await;
            }
        }
        Ok(None) => {}
        Err(e) => warn!(project_id, error = %e, "failed to load client for acceptance email"),
    }

    Ok(AcceptOutcome::Accepted(accepted))
}
