//! JWT auth extractors for API routes.
//!
//! Extracts the Supabase JWT from the `Authorization: Bearer <token>` header,
//! decodes it, and loads the caller's profile (creating it on first sight).
//! The role comes from `profiles.role`, never from the token.
//!
//! Admin-only routes use the `RequireAdmin` extractor to gate access.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::error::ApiError;
use super::AppState;
use crate::db::profiles::ProfileRow;

/// JWT claims from a Supabase-issued token.
#[derive(Debug, Deserialize)]
struct SupabaseClaims {
    /// Subject: the Supabase auth user id (UUID).
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: uuid::Uuid,
    pub role: String,
    pub profile: ProfileRow,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }

    pub fn is_professional(&self) -> bool {
        self.role == "professional"
    }
}

/// Decode and optionally verify a Supabase JWT.
///
/// With a secret, performs full HS256 verification. Otherwise decodes
/// without signature validation (development mode).
fn decode_jwt(token: &str, secret: Option<&str>) -> Result<SupabaseClaims, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);
    let key = match secret {
        Some(secret) => DecodingKey::from_secret(secret.as_bytes()),
        None => {
            validation.insecure_disable_signature_validation();
            validation.validate_exp = false;
            DecodingKey::from_secret(b"")
        }
    };
    decode::<SupabaseClaims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| format!("JWT verification failed: {}", e))
}

/// Resolve the caller from the request headers.
///
/// 401 for a missing or invalid token; database failures surface as 500.
pub async fn extract_auth_user(state: &Arc<AppState>, parts: &Parts) -> Result<AuthUser, ApiError> {
    let token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let claims = decode_jwt(token, state.config.jwt_secret.as_deref()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        ApiError::Unauthorized
    })?;
    let user_id = uuid::Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

    let profile = match state.db.get_profile(user_id).await? {
        Some(profile) => profile,
        None => {
            state.db.ensure_profile(user_id, claims.email.as_deref()).await?;
            state
                .db
                .get_profile(user_id)
                .await?
                .ok_or(ApiError::Unauthorized)?
        }
    };

    Ok(AuthUser {
        user_id,
        role: profile.role.clone(),
        profile,
    })
}

/// Axum extractor that requires an authenticated admin user.
///
/// Returns 401 if no valid JWT is present, 403 if the user is not an admin.
pub struct RequireAdmin(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let auth_user = extract_auth_user(state, parts).await?;
        if !auth_user.is_admin() {
            return Err(ApiError::Forbidden("Admin access required".into()));
        }
        Ok(RequireAdmin(auth_user))
    }
}

/// Axum extractor that requires any authenticated user.
///
/// Returns 401 if no valid JWT is present.
pub struct RequireAuth(pub AuthUser);

impl FromRequestParts<Arc<AppState>> for RequireAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(RequireAuth(extract_auth_user(state, parts).await?))
    }
}
