//! # Billing — Stripe Subscriptions
//!
//! Checkout and billing-portal sessions are created through Stripe's
//! form-encoded REST API. Subscription state flows back only through the
//! signed webhook, which upserts the member's `subscriptions` row.
//!
//! ## Webhook signature
//!
//! Stripe sends `Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>...]`. The
//! expected signature is HMAC-SHA256 of `"{t}.{raw body}"` keyed with the
//! endpoint secret. Any matching `v1` is accepted; timestamps older than the
//! tolerance are rejected to stop replays.

use anyhow::{anyhow, bail, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::subscriptions::SubscriptionUpsert;
use crate::db::Database;

const STRIPE_API: &str = "https://api.stripe.com/v1";

/// Default replay window for webhook timestamps, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: &str) -> Self {
        StripeClient {
            client: crate::integrations::http_client(),
            secret_key: secret_key.to_string(),
        }
    }

    async fn post_form(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", STRIPE_API, path))
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body["error"]["message"].as_str().unwrap_or("unknown error");
            bail!("stripe {} returned {}: {}", path, status, message);
        }
        Ok(body)
    }

    /// Create a customer tagged with our user id; returns its id.
    pub async fn create_customer(&self, email: Option<&str>, user_id: uuid::Uuid) -> Result<String> {
        let user = user_id.to_string();
        let mut params = vec![("metadata[user_id]", user.as_str())];
        if let Some(email) = email {
            params.push(("email", email));
        }
        let body = self.post_form("/customers", &params).await?;
        string_field(&body, "id")
    }

    /// Subscription checkout for `price`; returns the hosted page URL.
    pub async fn create_checkout_session(
        &self,
        customer: &str,
        price: &str,
        plan: &str,
        success_url: &str,
        cancel_url: &str,
        user_id: uuid::Uuid,
    ) -> Result<String> {
        let user = user_id.to_string();
        let params = [
            ("mode", "subscription"),
            ("customer", customer),
            ("line_items[0][price]", price),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("client_reference_id", user.as_str()),
            ("metadata[user_id]", user.as_str()),
            ("metadata[plan]", plan),
            ("subscription_data[metadata][user_id]", user.as_str()),
            ("subscription_data[metadata][plan]", plan),
        ];
        let body = self.post_form("/checkout/sessions", &params).await?;
        string_field(&body, "url")
    }

    /// Billing portal session; returns its URL.
    pub async fn create_portal_session(&self, customer: &str, return_url: &str) -> Result<String> {
        let params = [("customer", customer), ("return_url", return_url)];
        let body = self.post_form("/billing_portal/sessions", &params).await?;
        string_field(&body, "url")
    }
}

fn string_field(body: &Value, field: &str) -> Result<String> {
    body[field]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("stripe response missing `{}`", field))
}

/// Plan ↔ Stripe price mapping from `STRIPE_PRICE_PRO` / `STRIPE_PRICE_ELITE`.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    pub pro: Option<String>,
    pub elite: Option<String>,
}

impl PriceTable {
    pub fn from_config(cfg: &AppConfig) -> Self {
        PriceTable {
            pro: cfg.stripe_price_pro.clone(),
            elite: cfg.stripe_price_elite.clone(),
        }
    }

    pub fn price_for(&self, plan: &str) -> Option<&str> {
        match plan {
            "pro" => self.pro.as_deref(),
            "elite" => self.elite.as_deref(),
            _ => None,
        }
    }

    pub fn plan_for_price(&self, price: &str) -> Option<&'static str> {
        if self.pro.as_deref() == Some(price) {
            Some("pro")
        } else if self.elite.as_deref() == Some(price) {
            Some("elite")
        } else {
            None
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed Stripe-Signature header")]
    Malformed,
    #[error("webhook timestamp outside tolerance")]
    Stale,
    #[error("no matching v1 signature")]
    Mismatch,
}

type HmacSha256 = Hmac<Sha256>;

fn signing_mac(secret: &str, timestamp: i64, payload: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Some(mac)
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Option<String> {
    signing_mac(secret, timestamp, payload).map(|mac| hex::encode(mac.finalize().into_bytes()))
}

/// Check a `Stripe-Signature` header against the raw request body.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => candidates.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(SignatureError::Stale);
    }
    let mac = signing_mac(secret, timestamp, payload).ok_or(SignatureError::Mismatch)?;
    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// What a webhook delivery did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    SubscriptionActivated,
    SubscriptionUpdated,
    /// Event for a subscription or user we do not know about.
    Unmatched,
    Ignored,
}

fn unix_to_datetime(v: &Value) -> Option<chrono::DateTime<chrono::Utc>> {
    v.as_i64().and_then(|s| chrono::DateTime::from_timestamp(s, 0))
}

/// Apply a verified Stripe event to the subscriptions table.
pub async fn handle_webhook_event(
    db: &Database,
    prices: &PriceTable,
    event: &Value,
) -> Result<WebhookAction> {
    let kind = event["type"].as_str().unwrap_or_default();
    let object = &event["data"]["object"];

    match kind {
        "checkout.session.completed" => {
            let user_id = object["client_reference_id"]
                .as_str()
                .or_else(|| object["metadata"]["user_id"].as_str())
                .and_then(|s| uuid::Uuid::parse_str(s).ok());
            let Some(user_id) = user_id else {
                warn!(event = kind, "checkout session without a user reference");
                return Ok(WebhookAction::Unmatched);
            };
            let plan = object["metadata"]["plan"]
                .as_str()
                .filter(|p| matches!(*p, "pro" | "elite"))
                .unwrap_or("pro");
            let sub = SubscriptionUpsert {
                plan,
                status: "active",
                stripe_customer_id: object["customer"].as_str(),
                stripe_subscription_id: object["subscription"].as_str(),
                current_period_end: None,
            };
            db.upsert_subscription(user_id, &sub).await?;
            info!(%user_id, plan, "subscription activated");
            Ok(WebhookAction::SubscriptionActivated)
        }
        "customer.subscription.updated" | "customer.subscription.deleted" => {
            let Some(sub_id) = object["id"].as_str() else {
                bail!("subscription event without an id");
            };
            let status = if kind == "customer.subscription.deleted" {
                "canceled"
            } else {
                object["status"].as_str().unwrap_or("incomplete")
            };
            let plan: Option<&str> = object["items"]["data"][0]["price"]["id"]
                .as_str()
                .and_then(|price| prices.plan_for_price(price))
                .or_else(|| {
                    object["metadata"]["plan"]
                        .as_str()
                        .filter(|p| matches!(*p, "pro" | "elite"))
                });
            let period_end = unix_to_datetime(&object["current_period_end"]);
            if db
                .update_subscription_by_stripe_id(sub_id, status, plan, period_end)
                .await?
            {
                info!(subscription = sub_id, status, "subscription updated");
                Ok(WebhookAction::SubscriptionUpdated)
            } else {
                warn!(subscription = sub_id, "unknown subscription in webhook");
                Ok(WebhookAction::Unmatched)
            }
        }
        _ => Ok(WebhookAction::Ignored),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";

    fn header_for(payload: &[u8], ts: i64) -> String {
        format!("t={},v1={}", ts, compute_signature(SECRET, ts, payload).unwrap())
    }

    #[test]
    fn valid_signature_is_accepted() {
        let payload = br#"{"type":"ping"}"#;
        let header = header_for(payload, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(payload, &header, SECRET, 1_700_000_100, 300),
            Ok(())
        );
    }

    #[test]
    fn any_v1_may_match() {
        let payload = b"{}";
        let ts = 1_700_000_000;
        let good = compute_signature(SECRET, ts, payload).unwrap();
        let header = format!("t={},v1=deadbeef,v1=not-hex,v0=zzz,v1={}", ts, good);
        assert_eq!(verify_webhook_signature(payload, &header, SECRET, ts, 300), Ok(()));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let header = header_for(b"{\"a\":1}", 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"{\"a\":2}", &header, SECRET, 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = header_for(b"{}", 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"{}", &header, "whsec_other", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn truncated_or_uppercase_signatures() {
        let payload = b"{}";
        let ts = 1_700_000_000;
        let good = compute_signature(SECRET, ts, payload).unwrap();
        let truncated = format!("t={},v1={}", ts, &good[..good.len() - 2]);
        assert_eq!(
            verify_webhook_signature(payload, &truncated, SECRET, ts, 300),
            Err(SignatureError::Mismatch)
        );
        // Hex decoding is case-insensitive, the bytes are what is compared.
        let upper = format!("t={},v1={}", ts, good.to_uppercase());
        assert_eq!(verify_webhook_signature(payload, &upper, SECRET, ts, 300), Ok(()));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = header_for(b"{}", 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"{}", &header, SECRET, 1_700_000_301, 300),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for header in ["", "v1=abc", "t=notanumber,v1=abc", "t=1700000000"] {
            assert_eq!(
                verify_webhook_signature(b"{}", header, SECRET, 1_700_000_000, 300),
                Err(SignatureError::Malformed),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn price_table_maps_both_ways() {
        let prices = PriceTable {
            pro: Some("price_pro".into()),
            elite: Some("price_elite".into()),
        };
        assert_eq!(prices.price_for("pro"), Some("price_pro"));
        assert_eq!(prices.price_for("elite"), Some("price_elite"));
        assert_eq!(prices.price_for("free"), None);
        assert_eq!(prices.plan_for_price("price_elite"), Some("elite"));
        assert_eq!(prices.plan_for_price("price_other"), None);
    }
}
