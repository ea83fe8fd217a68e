//! Referral registration: a new member enters the referral code of the
//! member who brought them in. The referrer earns the `referral` action.

use chrono::FixedOffset;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::referrals::ReferralRow;
use crate::db::Database;
use crate::gamification::{award_points_best_effort, AwardOutcome};

const REFERRAL_ACTION: &str = "referral";

#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("referral code not found")]
    UnknownCode,
    #[error("you cannot use your own referral code")]
    SelfReferral,
    #[error("you were already referred")]
    AlreadyReferred,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralOutcome {
    pub referral: ReferralRow,
    /// Points credited to the referrer, if the award went through.
    pub referrer_award: Option<AwardOutcome>,
}

pub async fn register_referral(
    db: &Database,
    referred_id: uuid::Uuid,
    code: &str,
    day_offset: FixedOffset,
) -> Result<ReferralOutcome, ReferralError> {
    let referrer = db
        .get_profile_by_referral_code(code)
        .await?
        .ok_or(ReferralError::UnknownCode)?;
    if referrer.id == referred_id {
        return Err(ReferralError::SelfReferral);
    }
    let code = code.trim().to_uppercase();
    let referral = db
        .create_referral(referrer.id, referred_id, &code)
        .await?
        .ok_or(ReferralError::AlreadyReferred)?;
    info!(referrer = %referrer.id, referred = %referred_id, "referral registered");

    let referrer_award = award_points_best_effort(db, referrer.id, REFERRAL_ACTION, day_offset).await;
    if let Err(e) = db
        .create_notification(
            referrer.id,
            "referral",
            "Nova indicação",
            "Um novo membro entrou com o seu código de indicação.",
            Some("/indicacoes"),
        )
        .await
    {
        warn!(referrer = %referrer.id, error = %e, "failed to notify referrer");
    }
    Ok(ReferralOutcome {
        referral,
        referrer_award,
    })
}
