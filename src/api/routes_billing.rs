//! Billing endpoints: Stripe checkout and portal sessions, the signed
//! webhook, and the caller's subscription.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use super::middleware_auth::{AuthUser, RequireAuth};
use super::{ApiError, AppState};
use crate::billing::{self, StripeClient, WEBHOOK_TOLERANCE_SECS};
use crate::gamification::PlanTier;

fn stripe(state: &AppState) -> Result<&StripeClient, ApiError> {
    state.stripe.as_ref().ok_or(ApiError::Unavailable("Stripe"))
}

/// Existing Stripe customer for the caller, or a new one.
async fn customer_for(state: &AppState, client: &StripeClient, user: &AuthUser) -> Result<String, ApiError> {
    if let Some(existing) = state
        .db
        .get_subscription(user.user_id)
        .await?
        .and_then(|s| s.stripe_customer_id)
    {
        return Ok(existing);
    }
    let customer = client
        .create_customer(user.profile.email.as_deref(), user.user_id)
        .await
        .map_err(|e| ApiError::Upstream(format!("stripe: {}", e)))?;
    state.db.set_stripe_customer(user.user_id, &customer).await?;
    info!(user_id = %user.user_id, "stripe customer created");
    Ok(customer)
}

#[derive(Deserialize)]
pub(super) struct CheckoutPayload {
    plan: String,
}

/// POST /api/stripe/checkout — `{"plan": "pro" | "elite"}` → `{"url": ...}`
pub(super) async fn handler_checkout(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
    Json(payload): Json<CheckoutPayload>,
) -> Result<Json<Value>, ApiError> {
    let client = stripe(&state)?;
    let plan = payload.plan.trim().to_lowercase();
    if !matches!(plan.as_str(), "pro" | "elite") {
        return Err(ApiError::BadRequest("plan must be pro or elite".into()));
    }
    let price = state
        .prices
        .price_for(&plan)
        .ok_or(ApiError::Unavailable("the price for this plan"))?;

    let customer = customer_for(&state, client, &user).await?;
    let app_url = &state.config.app_url;
    let url = client
        .create_checkout_session(
            &customer,
            price,
            &plan,
            &format!("{}/assinatura?status=success", app_url),
            &format!("{}/assinatura?status=cancelled", app_url),
            user.user_id,
        )
        .await
        .map_err(|e| ApiError::Upstream(format!("stripe: {}", e)))?;
    info!(user_id = %user.user_id, plan = %plan, "checkout session created");
    Ok(Json(json!({ "url": url })))
}

/// POST /api/stripe/portal → `{"url": ...}`
pub(super) async fn handler_portal(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let client = stripe(&state)?;
    let customer = state
        .db
        .get_subscription(user.user_id)
        .await?
        .and_then(|s| s.stripe_customer_id)
        .ok_or_else(|| ApiError::not_found("Billing account"))?;
    let url = client
        .create_portal_session(&customer, &format!("{}/assinatura", state.config.app_url))
        .await
        .map_err(|e| ApiError::Upstream(format!("stripe: {}", e)))?;
    Ok(Json(json!({ "url": url })))
}

/// POST /api/stripe/webhook — raw body, verified against `Stripe-Signature`.
pub(super) async fn handler_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or(ApiError::Unavailable("Stripe webhook secret"))?;
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing Stripe-Signature header".into()))?;
    billing::verify_webhook_signature(
        &body,
        signature,
        secret,
        chrono::Utc::now().timestamp(),
        WEBHOOK_TOLERANCE_SECS,
    )
    .map_err(|e| {
        warn!(error = %e, "rejected stripe webhook");
        ApiError::BadRequest(e.to_string())
    })?;

    let event: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {}", e)))?;
    let action = billing::handle_webhook_event(&state.db, &state.prices, &event)
        .await
        .map_err(|e| {
            error!(event = event["type"].as_str().unwrap_or_default(), error = %e, "webhook handling failed");
            ApiError::Internal(e)
        })?;
    Ok(Json(json!({ "received": true, "action": action })))
}

/// GET /api/subscription
pub(super) async fn handler_subscription(
    State(state): State<Arc<AppState>>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Value>, ApiError> {
    let subscription = state.db.get_subscription(user.user_id).await?;
    let plan = PlanTier::from_plan(
        subscription
            .as_ref()
            .map(|s| s.effective_plan())
            .unwrap_or("free"),
    );
    Ok(Json(json!({
        "subscription": subscription,
        "plan": plan,
        "multiplier": plan.multiplier(),
    })))
}
