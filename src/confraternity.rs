//! # Confraternity — Member Meetups
//!
//! One member invites another to a meetup. The invitee accepts or declines;
//! after the scheduled time either member can mark it completed with a
//! proof photo, which awards `confraternity_completed` to both (through the
//! regular point award, so daily caps apply).
//!
//! ```text
//! pending ──accept──► accepted ──complete──► completed
//!    │  └──decline──► declined      │
//!    └──cancel──┬─────────────────◄─┘ (inviter only)
//!               ▼
//!           cancelled
//! ```
//!
//! A pair may hold one open invite at a time and complete at most one
//! meetup per [`PAIR_COOLDOWN_DAYS`].

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::confraternity::InviteRow;
use crate::db::profiles::ProfileRow;
use crate::db::Database;
use crate::gamification::{award_points_best_effort, AwardOutcome};
use crate::integrations::email::{self, Mailer};

pub const PAIR_COOLDOWN_DAYS: i64 = 30;

const COMPLETED_ACTION: &str = "confraternity_completed";

#[derive(Debug, Error)]
pub enum ConfraternityError {
    #[error("{0}")]
    Invalid(String),
    #[error("invite not found")]
    InviteNotFound,
    #[error("member not found")]
    MemberNotFound,
    #[error("{0}")]
    Forbidden(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvitePayload {
    pub invitee_id: uuid::Uuid,
    pub scheduled_for: DateTime<Utc>,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RespondPayload {
    pub accept: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletePayload {
    pub proof_photo_url: String,
}

/// Result of completing a meetup: the invite and each member's award.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Completion {
    pub invite: InviteRow,
    pub awards: Vec<AwardOutcome>,
}

fn validate_proof_url(raw: &str) -> Result<(), ConfraternityError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|_| ConfraternityError::Invalid("proof_photo_url must be a valid URL".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfraternityError::Invalid(
            "proof_photo_url must be an http(s) URL".into(),
        ));
    }
    Ok(())
}

fn open_invite_conflict() -> ConfraternityError {
    ConfraternityError::Conflict("there is already an open invite between you".into())
}

pub async fn invite(
    db: &Database,
    mailer: &Mailer,
    inviter: &ProfileRow,
    payload: &InvitePayload,
    now: DateTime<Utc>,
) -> Result<InviteRow, ConfraternityError> {
    if payload.invitee_id == inviter.id {
        return Err(ConfraternityError::Invalid("you cannot invite yourself".into()));
    }
    if payload.scheduled_for <= now {
        return Err(ConfraternityError::Invalid(
            "scheduled_for must be in the future".into(),
        ));
    }
    if payload.location.len() > 300 || payload.message.len() > 2000 {
        return Err(ConfraternityError::Invalid("location or message too long".into()));
    }
    let invitee = db
        .get_profile(payload.invitee_id)
        .await?
        .ok_or(ConfraternityError::MemberNotFound)?;
    if db.has_open_invite_between(inviter.id, invitee.id).await? {
        return Err(open_invite_conflict());
    }

    let row = db
        .create_invite(
            inviter.id,
            invitee.id,
            payload.scheduled_for,
            payload.location.trim(),
            payload.message.trim(),
        )
        .await?
        .ok_or_else(open_invite_conflict)?;
    info!(invite_id = row.id, inviter = %inviter.id, invitee = %invitee.id, "confraternity invite created");

    let inviter_name = inviter.display_name.as_deref().unwrap_or("Um membro");
    if let Err(e) = db
        .create_notification(
            invitee.id,
            "confraternity_invite",
            "Convite para confraria",
            &format!("{} convidou você para uma confraria.", inviter_name),
            Some("/confraria"),
        )
        .await
    {
        warn!(invite_id = row.id, error = %e, "failed to notify invitee");
    }
    if let Some(address) = invitee.email.as_deref() {
        let (subject, html) =
            email::confraternity_invite(inviter_name, row.scheduled_for, &row.location, mailer.app_url());
        mailer.send_best_effort(address, &subject, &html).await;
    }
    Ok(row)
}

pub async fn respond(
    db: &Database,
    user_id: uuid::Uuid,
    invite_id: i64,
    accept: bool,
) -> Result<InviteRow, ConfraternityError> {
    let invite = db
        .get_invite(invite_id)
        .await?
        .ok_or(ConfraternityError::InviteNotFound)?;
    if invite.invitee_id != user_id {
        return Err(ConfraternityError::Forbidden("only the invitee can respond"));
    }
    let status = if accept { "accepted" } else { "declined" };
    let row = db
        .respond_invite(invite_id, user_id, status)
        .await?
        .ok_or_else(|| ConfraternityError::Conflict(format!("invite is already {}", invite.status)))?;

    if let Err(e) = db
        .create_notification(
            row.inviter_id,
            "confraternity_response",
            if accept { "Convite aceito" } else { "Convite recusado" },
            "Seu convite de confraria foi respondido.",
            Some("/confraria"),
        )
        .await
    {
        warn!(invite_id, error = %e, "failed to notify inviter");
    }
    Ok(row)
}

pub async fn complete(
    db: &Database,
    user_id: uuid::Uuid,
    invite_id: i64,
    proof_photo_url: &str,
    now: DateTime<Utc>,
    day_offset: FixedOffset,
) -> Result<Completion, ConfraternityError> {
    validate_proof_url(proof_photo_url)?;
    let invite = db
        .get_invite(invite_id)
        .await?
        .ok_or(ConfraternityError::InviteNotFound)?;
    if !invite.involves(user_id) {
        return Err(ConfraternityError::Forbidden("you are not part of this confraternity"));
    }
    if invite.status != "accepted" {
        return Err(ConfraternityError::Conflict(format!(
            "only accepted invites can be completed (status: {})",
            invite.status
        )));
    }
    if now < invite.scheduled_for {
        return Err(ConfraternityError::Invalid(
            "the meetup has not happened yet".into(),
        ));
    }
    let since = now - TimeDelta::days(PAIR_COOLDOWN_DAYS);
    if db
        .count_completed_between_since(invite.inviter_id, invite.invitee_id, since)
        .await?
        > 0
    {
        return Err(ConfraternityError::Conflict(format!(
            "this pair already completed a confraternity in the last {} days",
            PAIR_COOLDOWN_DAYS
        )));
    }

    let row = db
        .complete_invite(invite_id, proof_photo_url.trim())
        .await?
        .ok_or_else(|| ConfraternityError::Conflict("invite was completed or cancelled".into()))?;
    info!(invite_id, "confraternity completed");

    if let Err(e) = db
        .create_notification(
            row.counterpart(user_id),
            "confraternity_completed",
            "Confraria concluída",
            "Sua confraria foi marcada como concluída.",
            Some("/confraria"),
        )
        .await
    {
        warn!(invite_id, error = %e, "failed to notify the other member");
    }

    let mut awards = Vec::with_capacity(2);
    for member in [row.inviter_id, row.invitee_id] {
        if let Some(outcome) = award_points_best_effort(db, member, COMPLETED_ACTION, day_offset).await {
            awards.push(outcome);
        }
    }
    Ok(Completion { invite: row, awards })
}

pub async fn cancel(
    db: &Database,
    user_id: uuid::Uuid,
    invite_id: i64,
) -> Result<InviteRow, ConfraternityError> {
    let invite = db
        .get_invite(invite_id)
        .await?
        .ok_or(ConfraternityError::InviteNotFound)?;
    if invite.inviter_id != user_id {
        return Err(ConfraternityError::Forbidden("only the inviter can cancel"));
    }
    let row = db
        .cancel_invite(invite_id, user_id)
        .await?
        .ok_or_else(|| ConfraternityError::Conflict(format!("invite is already {}", invite.status)))?;

    if let Err(e) = db
        .create_notification(
            row.invitee_id,
            "confraternity_cancelled",
            "Confraria cancelada",
            "Um convite de confraria foi cancelado.",
            Some("/confraria"),
        )
        .await
    {
        warn!(invite_id, error = %e, "failed to notify invitee of cancellation");
    }
    Ok(row)
}
