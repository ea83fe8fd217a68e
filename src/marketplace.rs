//! # Marketplace — Member Classified Ads
//!
//! Members publish ads (`active`, `paused` or `sold`). Only the owner or an
//! admin may change or delete an ad. Publishing credits the
//! `marketplace_ad_created` action.

use chrono::FixedOffset;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::db::marketplace::{AdFields, AdRow};
use crate::db::profiles::ProfileRow;
use crate::db::Database;
use crate::gamification::{award_points_best_effort, AwardOutcome};

const AD_CREATED_ACTION: &str = "marketplace_ad_created";

#[derive(Debug, Error)]
pub enum MarketplaceError {
    #[error("{0}")]
    Invalid(String),
    #[error("ad not found")]
    NotFound,
    #[error("only the owner can change this ad")]
    NotOwner,
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// `POST`/`PUT /api/marketplace` body.
#[derive(Debug, Clone, Deserialize)]
pub struct AdPayload {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub category: String,
    pub image_url: Option<String>,
    pub status: Option<String>,
}

impl AdPayload {
    pub fn validate(&self) -> Result<AdFields, String> {
        let title = self.title.trim();
        let chars = title.chars().count();
        if !(3..=120).contains(&chars) {
            return Err("title must be between 3 and 120 characters".into());
        }
        if self.description.len() > 5000 {
            return Err("description must be at most 5000 characters".into());
        }
        if self.price_cents < 0 {
            return Err("price_cents must be non-negative".into());
        }
        let category = self.category.trim().to_lowercase();
        if category.is_empty() {
            return Err("category is required".into());
        }
        let image_url = match self.image_url.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => {
                let parsed = url::Url::parse(raw).map_err(|_| "image_url must be a valid URL")?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err("image_url must be an http(s) URL".into());
                }
                Some(raw.to_string())
            }
        };
        let status = self.status.as_deref().unwrap_or("active");
        if !matches!(status, "active" | "paused" | "sold") {
            return Err("status must be active, paused or sold".into());
        }
        Ok(AdFields {
            title: title.to_string(),
            description: self.description.trim().to_string(),
            price_cents: self.price_cents,
            category,
            image_url,
            status: status.to_string(),
        })
    }
}

fn ensure_can_edit(ad: &AdRow, user: &ProfileRow) -> Result<(), MarketplaceError> {
    if ad.owner_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(MarketplaceError::NotOwner)
    }
}

pub async fn create_ad(
    db: &Database,
    owner: &ProfileRow,
    payload: &AdPayload,
    day_offset: FixedOffset,
) -> Result<(AdRow, Option<AwardOutcome>), MarketplaceError> {
    let fields = payload.validate().map_err(MarketplaceError::Invalid)?;
    let ad = db.create_ad(owner.id, &fields).await?;
    info!(ad_id = ad.id, owner = %owner.id, "marketplace ad created");
    let award = award_points_best_effort(db, owner.id, AD_CREATED_ACTION, day_offset).await;
    Ok((ad, award))
}

pub async fn update_ad(
    db: &Database,
    user: &ProfileRow,
    ad_id: i64,
    payload: &AdPayload,
) -> Result<AdRow, MarketplaceError> {
    let fields = payload.validate().map_err(MarketplaceError::Invalid)?;
    let ad = db.get_ad(ad_id).await?.ok_or(MarketplaceError::NotFound)?;
    ensure_can_edit(&ad, user)?;
    db.update_ad(ad_id, &fields)
        .await?
        .ok_or(MarketplaceError::NotFound)
}

pub async fn delete_ad(db: &Database, user: &ProfileRow, ad_id: i64) -> Result<(), MarketplaceError> {
    let ad = db.get_ad(ad_id).await?.ok_or(MarketplaceError::NotFound)?;
    ensure_can_edit(&ad, user)?;
    if !db.delete_ad(ad_id).await? {
        return Err(MarketplaceError::NotFound);
    }
    info!(ad_id, by = %user.id, "marketplace ad deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> AdPayload {
        AdPayload {
            title: "Consultoria tributária".into(),
            description: "Uma hora".into(),
            price_cents: 30_000,
            category: " Servicos ".into(),
            image_url: Some("https://cdn.example.com/a.png".into()),
            status: None,
        }
    }

    #[test]
    fn valid_payload_is_normalised() {
        let fields = payload().validate().unwrap();
        assert_eq!(fields.category, "servicos");
        assert_eq!(fields.status, "active");
        assert_eq!(fields.image_url.as_deref(), Some("https://cdn.example.com/a.png"));
    }

    #[test]
    fn invalid_payloads_are_rejected() {
        let mut p = payload();
        p.title = "ab".into();
        assert!(p.validate().is_err());

        let mut p = payload();
        p.title = "x".repeat(121);
        assert!(p.validate().is_err());

        let mut p = payload();
        p.price_cents = -1;
        assert!(p.validate().is_err());

        let mut p = payload();
        p.status = Some("deleted".into());
        assert!(p.validate().is_err());

        let mut p = payload();
        p.image_url = Some("javascript:alert(1)".into());
        assert!(p.validate().is_err());
    }

    #[test]
    fn empty_image_url_is_dropped() {
        let mut p = payload();
        p.image_url = Some("  ".into());
        assert_eq!(p.validate().unwrap().image_url, None);
    }
}
