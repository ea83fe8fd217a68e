//! # Config — Environment-Driven Application Settings
//!
//! Every third-party integration is optional. A missing key disables the
//! integration instead of failing startup: email is skipped with a log line,
//! payment and image routes answer 503.
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `SUPABASE_JWT_SECRET` | JWT verification (decode-only when unset) |
//! | `CRON_SECRET` | `/api/cron/*` bearer authentication |
//! | `STRIPE_SECRET_KEY` | checkout / billing portal sessions |
//! | `STRIPE_WEBHOOK_SECRET` | webhook signature verification |
//! | `STRIPE_PRICE_PRO`, `STRIPE_PRICE_ELITE` | plan ↔ price mapping |
//! | `RESEND_API_KEY`, `EMAIL_FROM` | transactional email |
//! | `REMOVE_BG_API_KEY` | background removal |
//! | `APP_URL` | links in emails and Stripe redirect URLs |
//! | `POINTS_DAY_OFFSET_HOURS` | UTC offset of the gamification "day" (default -3) |

use chrono::{FixedOffset, Offset, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub jwt_secret: Option<String>,
    pub cron_secret: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_price_pro: Option<String>,
    pub stripe_price_elite: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub remove_bg_api_key: Option<String>,
    pub app_url: String,
    pub points_day_offset_hours: i32,
}

/// Read an env var, treating empty strings as unset.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    pub fn from_env() -> Self {
        AppConfig {
            jwt_secret: env_opt("SUPABASE_JWT_SECRET"),
            cron_secret: env_opt("CRON_SECRET"),
            stripe_secret_key: env_opt("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: env_opt("STRIPE_WEBHOOK_SECRET"),
            stripe_price_pro: env_opt("STRIPE_PRICE_PRO"),
            stripe_price_elite: env_opt("STRIPE_PRICE_ELITE"),
            resend_api_key: env_opt("RESEND_API_KEY"),
            email_from: env_opt("EMAIL_FROM")
                .unwrap_or_else(|| "Rota Business Club <no-reply@rotabusiness.club>".to_string()),
            remove_bg_api_key: env_opt("REMOVE_BG_API_KEY"),
            app_url: env_opt("APP_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string())
                .trim_end_matches('/')
                .to_string(),
            points_day_offset_hours: env_opt("POINTS_DAY_OFFSET_HOURS")
                .and_then(|v| v.parse().ok())
                .filter(|h: &i32| (-12..=14).contains(h))
                .unwrap_or(-3),
        }
    }

    /// Cron endpoints accept only `Authorization: Bearer <CRON_SECRET>`.
    /// Without a configured secret every cron call is rejected.
    pub fn cron_authorized(&self, authorization: Option<&str>) -> bool {
        match (&self.cron_secret, authorization) {
            (Some(secret), Some(header)) => header
                .strip_prefix("Bearer ")
                .is_some_and(|token| same_secret(token, secret)),
            _ => false,
        }
    }

    /// Offset used to decide where a gamification "day" starts.
    pub fn points_day_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.points_day_offset_hours.clamp(-12, 14) * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Compare two secrets through their HMAC tags, so the comparison is the
/// `hmac` crate's constant-time `verify_slice`.
fn same_secret(given: &str, expected: &str) -> bool {
    let tag = |key: &str| {
        Hmac::<Sha256>::new_from_slice(key.as_bytes()).map(|mut mac| {
            mac.update(b"rota-cron");
            mac
        })
    };
    match (tag(given), tag(expected)) {
        (Ok(given), Ok(expected)) => given.verify_slice(&expected.finalize().into_bytes()).is_ok(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_cron(secret: Option<&str>) -> AppConfig {
        AppConfig {
            cron_secret: secret.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn cron_requires_configured_secret() {
        let cfg = with_cron(None);
        assert!(!cfg.cron_authorized(Some("Bearer anything")));
        assert!(!cfg.cron_authorized(None));
    }

    #[test]
    fn cron_accepts_matching_bearer_only() {
        let cfg = with_cron(Some("s3cret"));
        assert!(cfg.cron_authorized(Some("Bearer s3cret")));
        assert!(!cfg.cron_authorized(Some("Bearer s3cre")));
        assert!(!cfg.cron_authorized(Some("s3cret")));
        assert!(!cfg.cron_authorized(Some("bearer s3cret")));
        assert!(!cfg.cron_authorized(None));
    }

    #[test]
    fn day_offset_defaults_to_brasilia() {
        let cfg = AppConfig {
            points_day_offset_hours: -3,
            ..Default::default()
        };
        assert_eq!(cfg.points_day_offset().local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn same_secret_matches_exact_value_only() {
        assert!(same_secret("abc", "abc"));
        assert!(!same_secret("abc", "abd"));
        assert!(!same_secret("abc", "abcd"));
        assert!(!same_secret("", "abc"));
    }
}
