//! Tiered broadcast of pending projects.
//!
//! A new project is shown to distribution group 1 first. Every run of the
//! distribution job (an external cron hitting `/api/cron/distribute-projects`,
//! or `rota distribute`) looks at pending projects and, once the current
//! group has had the project for [`DISTRIBUTION_WINDOW_HOURS`], escalates it to the
//! next group. Group 3's window running out marks the project `no_interest`.
//!
//! ```text
//! created ─► group 1 ─24h─► group 2 ─24h─► group 3 ─24h─► no_interest
//!               │              │              │
//!               └──────────────┴──────────────┴──► accepted (first eligible professional)
//! ```
//!
//! Every transition is claimed with a conditional update before the
//! broadcast goes out, so overlapping runs never notify a group twice. A
//! failed broadcast clears its stamp; the next run then retries that group.
//! One project's failure is logged and the batch moves on.

use anyhow::Result;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::types::{ProjectRow, ProjectStatus};
use crate::db::Database;
use crate::integrations::email::{self, Mailer};

/// How long a group has a project to itself before it escalates.
pub const DISTRIBUTION_WINDOW_HOURS: i64 = 24;

pub fn distribution_window() -> TimeDelta {
    TimeDelta::hours(DISTRIBUTION_WINDOW_HOURS)
}

/// Last distribution group; its window expiring ends the broadcast.
pub const MAX_GROUP: i32 = 3;

/// Upper bound on projects handled per run.
const BATCH_LIMIT: i64 = 500;

/// What the distribution job should do with a project right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionStep {
    /// The current group was never notified (fresh project, or a previous
    /// broadcast failed): notify it now.
    Broadcast { group: i32 },
    /// The current group's window is over: move to the next one.
    Escalate { from: i32, to: i32 },
    /// Group 3's window is over: nobody wanted it.
    Expire,
}

/// Decide the next step for `project` at time `now`, or `None` when the
/// project is not pending or its current window is still open.
pub fn next_distribution_step(project: &ProjectRow, now: DateTime<Utc>) -> Option<DistributionStep> {
    if project.status() != Some(ProjectStatus::Pending) || project.accepted_by.is_some() {
        return None;
    }
    let group = project.current_group;
    if !(1..=MAX_GROUP).contains(&group) {
        return None;
    }
    match project.group_notified_at(group) {
        None => Some(DistributionStep::Broadcast { group }),
        Some(at) if now - at >= distribution_window() => {
            if group < MAX_GROUP {
                Some(DistributionStep::Escalate {
                    from: group,
                    to: group + 1,
                })
            } else {
                Some(DistributionStep::Expire)
            }
        }
        Some(_) => None,
    }
}

/// Counters returned by one distribution run.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct DistributionReport {
    pub scanned: usize,
    pub broadcast: usize,
    pub escalated: usize,
    pub expired: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of handling a single project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepResult {
    Broadcast,
    Escalated,
    Expired,
    /// Another run or an accept got there first.
    Skipped,
}

/// One pass over every pending project that is due.
pub async fn run_distribution(
    db: &Database,
    mailer: &Mailer,
    now: DateTime<Utc>,
) -> Result<DistributionReport> {
    let due = db
        .projects_due_for_distribution(now - distribution_window(), BATCH_LIMIT)
        .await?;

    let mut report = DistributionReport {
        scanned: due.len(),
        ..Default::default()
    };

    for project in &due {
        let Some(step) = next_distribution_step(project, now) else {
            report.skipped += 1;
            continue;
        };
        match apply_step(db, mailer, project, step).await {
            Ok(StepResult::Broadcast) => report.broadcast += 1,
            Ok(StepResult::Escalated) => report.escalated += 1,
            Ok(StepResult::Expired) => report.expired += 1,
            Ok(StepResult::Skipped) => report.skipped += 1,
            Err(e) => {
                report.failed += 1;
                warn!(project_id = project.id, ?step, error = %e, "distribution step failed");
            }
        }
    }

    info!(
        scanned = report.scanned,
        broadcast = report.broadcast,
        escalated = report.escalated,
        expired = report.expired,
        failed = report.failed,
        "distribution run finished"
    );
    Ok(report)
}

/// Send a freshly created project to group 1. Called right after creation;
/// a failure here is retried by the next distribution run.
pub async fn distribute_new_project(db: &Database, mailer: &Mailer, project: &ProjectRow) -> Result<usize> {
    if !db.claim_group_notification(project.id, 1).await? {
        return Ok(0);
    }
    match broadcast(db, mailer, project, 1).await {
        Ok(n) => Ok(n),
        Err(e) => {
            db.clear_group_notification(project.id, 1).await?;
            Err(e)
        }
    }
}

async fn apply_step(
    db: &Database,
    mailer: &Mailer,
    project: &ProjectRow,
    step: DistributionStep,
) -> Result<StepResult> {
    match step {
        DistributionStep::Broadcast { group } => {
            if !db.claim_group_notification(project.id, group).await? {
                return Ok(StepResult::Skipped);
            }
            if let Err(e) = broadcast(db, mailer, project, group).await {
                db.clear_group_notification(project.id, group).await?;
                return Err(e);
            }
            Ok(StepResult::Broadcast)
        }
        DistributionStep::Escalate { from, to } => {
            let Some(updated) = db.escalate_project(project.id, from).await? else {
                return Ok(StepResult::Skipped);
            };
            if let Err(e) = broadcast(db, mailer, &updated, to).await {
                db.clear_group_notification(project.id, to).await?;
                return Err(e);
            }
            Ok(StepResult::Escalated)
        }
        DistributionStep::Expire => {
            let Some(expired) = db.expire_project(project.id).await? else {
                return Ok(StepResult::Skipped);
            };
            info!(project_id = expired.id, "project marked no_interest");
            Ok(StepResult::Expired)
        }
    }
}

/// Notify every eligible professional in `group` and email the ones with an
/// address on file. Returns the number of professionals notified.
async fn broadcast(db: &Database, mailer: &Mailer, project: &ProjectRow, group: i32) -> Result<usize> {
    let recipients = db.distribute_to_group(project, group).await?;
    for recipient in &recipients {
        if let Some(address) = recipient.email.as_deref() {
            let (subject, html) = email::new_project_available(project, mailer.app_url());
            mailer.send_best_effort(address, &subject, &html).await;
        }
    }
    info!(
        project_id = project.id,
        group,
        recipients = recipients.len(),
        "project distributed"
    );
    Ok(recipients.len())
}
