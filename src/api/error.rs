//! HTTP error mapping. Every handler returns `Result<_, ApiError>`; the
//! response body is always `{"error": "<message>"}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

use crate::confraternity::ConfraternityError;
use crate::marketplace::MarketplaceError;
use crate::referrals::ReferralError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Confraternity(#[from] ConfraternityError),
    #[error(transparent)]
    Marketplace(#[from] MarketplaceError),
    #[error(transparent)]
    Referral(#[from] ReferralError),
    #[error("{0}")]
    BadRequest(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    /// An optional integration is not configured.
    #[error("{0} is not configured")]
    Unavailable(&'static str),
    /// A third-party API failed.
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(what: &str) -> Self {
        ApiError::NotFound(format!("{} not found", what))
    }

    /// Map constraint violations from an insert/update to client errors:
    /// unique → 409, foreign key or check → 400. Anything else stays 500.
    pub fn from_db(err: anyhow::Error) -> Self {
        if let Some(sqlx::Error::Database(db_err)) = err.downcast_ref::<sqlx::Error>() {
            if db_err.is_unique_violation() {
                return ApiError::Conflict("a record with these values already exists".into());
            }
            if db_err.is_foreign_key_violation() {
                return ApiError::BadRequest("referenced record does not exist".into());
            }
            if db_err.is_check_violation() {
                return ApiError::BadRequest("value violates a constraint".into());
            }
        }
        ApiError::Internal(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Confraternity(e) => match e {
                ConfraternityError::Invalid(_) => StatusCode::BAD_REQUEST,
                ConfraternityError::InviteNotFound | ConfraternityError::MemberNotFound => {
                    StatusCode::NOT_FOUND
                }
                ConfraternityError::Forbidden(_) => StatusCode::FORBIDDEN,
                ConfraternityError::Conflict(_) => StatusCode::CONFLICT,
                ConfraternityError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Marketplace(e) => match e {
                MarketplaceError::Invalid(_) => StatusCode::BAD_REQUEST,
                MarketplaceError::NotFound => StatusCode::NOT_FOUND,
                MarketplaceError::NotOwner => StatusCode::FORBIDDEN,
                MarketplaceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Referral(e) => match e {
                ReferralError::UnknownCode => StatusCode::NOT_FOUND,
                ReferralError::SelfReferral => StatusCode::BAD_REQUEST,
                ReferralError::AlreadyReferred => StatusCode::CONFLICT,
                ReferralError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("project").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::Unavailable("stripe").status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn domain_errors_map_to_http() {
        let e: ApiError = ReferralError::AlreadyReferred.into();
        assert_eq!(e.status(), StatusCode::CONFLICT);
        let e: ApiError = MarketplaceError::NotOwner.into();
        assert_eq!(e.status(), StatusCode::FORBIDDEN);
        let e: ApiError = ConfraternityError::InviteNotFound.into();
        assert_eq!(e.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn from_db_keeps_non_constraint_errors_internal() {
        let e = ApiError::from_db(anyhow::anyhow!("connection reset"));
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_message() {
        assert_eq!(ApiError::not_found("ad").to_string(), "ad not found");
    }
}
