//! # API — HTTP Server for the Club Platform
//!
//! Runs an Axum HTTP server exposing the JSON API used by the web app:
//! projects and their distribution, gamification, confraternity meetups,
//! the marketplace, billing, referrals, notifications and image tools.
//!
//! Authentication is a Supabase JWT (see [`middleware_auth`]); the cron
//! endpoint uses a shared bearer secret instead.

pub mod error;
pub(crate) mod middleware_auth;
mod routes_admin;
mod routes_billing;
mod routes_confraternity;
mod routes_cron;
mod routes_gamification;
mod routes_health;
mod routes_images;
mod routes_marketplace;
mod routes_notifications;
mod routes_profiles;
mod routes_projects;
mod routes_referrals;

use crate::billing::{PriceTable, StripeClient};
use crate::config::AppConfig;
use crate::gamification::AwardOutcome;
use crate::integrations::email::Mailer;
use crate::integrations::images::BackgroundRemover;
use crate::{db, prom_metrics};
use anyhow::Result;
use axum::extract::Request;
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, Instrument};

pub use error::ApiError;

pub struct AppState {
    pub db: db::Database,
    pub config: AppConfig,
    pub mailer: Mailer,
    pub stripe: Option<StripeClient>,
    pub prices: PriceTable,
    pub background_remover: Option<BackgroundRemover>,
    pub prom_metrics: prom_metrics::Metrics,
}

impl AppState {
    /// Wire integrations from config. Missing keys leave them disabled.
    pub fn new(db: db::Database, config: AppConfig) -> Arc<Self> {
        let mailer = Mailer::new(&config);
        let stripe = config.stripe_secret_key.as_deref().map(StripeClient::new);
        let prices = PriceTable::from_config(&config);
        let background_remover = config
            .remove_bg_api_key
            .as_deref()
            .map(BackgroundRemover::new);
        if !mailer.is_enabled() {
            info!("RESEND_API_KEY not set, emails will be skipped");
        }
        Arc::new(AppState {
            db,
            config,
            mailer,
            stripe,
            prices,
            background_remover,
            prom_metrics: prom_metrics::Metrics::new(),
        })
    }

    pub(super) fn record_award(&self, outcome: &AwardOutcome) {
        self.prom_metrics
            .record_award(&outcome.action_id, outcome.points, outcome.limit_reached);
    }
}

/// Middleware that records HTTP request duration into the Prometheus histogram,
/// generates (or propagates) a request ID for correlation, and wraps the
/// request in a tracing span using `.instrument()` for proper async propagation.
async fn metrics_middleware(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> axum::response::Response {
    let request_id = req
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let raw_path = req.uri().path().to_string();
    let norm_path = normalize_path(&raw_path);
    let start = std::time::Instant::now();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %norm_path,
    );
    let mut response = next.run(req).instrument(span).await;

    let duration = start.elapsed().as_secs_f64();
    state
        .prom_metrics
        .http_request_duration
        .get_or_create(&prom_metrics::HttpLabel {
            method,
            path: norm_path,
        })
        .observe(duration);

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Normalize URL path to collapse high-cardinality segments (numeric IDs,
/// UUIDs, tracking tokens) into placeholders, preventing histogram label
/// explosion. Tracking tokens are also kept out of logs this way.
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| {
            if seg.is_empty() {
                seg.to_string()
            } else if seg.chars().all(|c| c.is_ascii_digit()) {
                ":id".to_string()
            } else if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                ":uuid".to_string()
            } else if seg.len() == 32 && seg.chars().all(|c| c.is_ascii_hexdigit()) {
                ":token".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes_health::handler_healthz))
        .route("/readyz", get(routes_health::handler_readyz))
        .route("/metrics", get(routes_health::handler_metrics))
        // Profiles
        .route(
            "/api/profiles/me",
            get(routes_profiles::handler_profile_me).put(routes_profiles::handler_profile_update),
        )
        .route("/api/profiles/{id}", get(routes_profiles::handler_profile_public))
        // Projects
        .route(
            "/api/projects",
            get(routes_projects::handler_projects_list)
                .post(routes_projects::handler_projects_create),
        )
        .route(
            "/api/projects/track/{token}",
            get(routes_projects::handler_project_track),
        )
        .route("/api/projects/{id}", get(routes_projects::handler_project_get))
        .route(
            "/api/projects/{id}/accept",
            post(routes_projects::handler_project_accept),
        )
        .route(
            "/api/projects/{id}/status",
            post(routes_projects::handler_project_status),
        )
        .route(
            "/api/projects/{id}/proposals",
            get(routes_projects::handler_proposals_list)
                .post(routes_projects::handler_proposal_create),
        )
        .route(
            "/api/projects/{id}/proposals/{proposal_id}",
            post(routes_projects::handler_proposal_decide),
        )
        .route(
            "/api/cron/distribute-projects",
            get(routes_cron::handler_cron_distribute).post(routes_cron::handler_cron_distribute),
        )
        // Gamification
        .route(
            "/api/gamification/points",
            post(routes_gamification::handler_award_points),
        )
        .route("/api/gamification/me", get(routes_gamification::handler_my_stats))
        .route(
            "/api/gamification/leaderboard",
            get(routes_gamification::handler_leaderboard),
        )
        .route(
            "/api/gamification/ranks",
            get(routes_gamification::handler_ranks),
        )
        .route(
            "/api/gamification/missions",
            get(routes_gamification::handler_missions),
        )
        .route(
            "/api/gamification/missions/{id}/claim",
            post(routes_gamification::handler_mission_claim),
        )
        // Admin
        .route(
            "/api/admin/ranks",
            get(routes_admin::handler_ranks_list).post(routes_admin::handler_rank_create),
        )
        .route(
            "/api/admin/ranks/{id}",
            axum::routing::put(routes_admin::handler_rank_update)
                .delete(routes_admin::handler_rank_delete),
        )
        .route(
            "/api/admin/medals",
            get(routes_admin::handler_medals_list).post(routes_admin::handler_medal_create),
        )
        .route(
            "/api/admin/medals/{id}",
            axum::routing::put(routes_admin::handler_medal_update)
                .delete(routes_admin::handler_medal_delete),
        )
        .route(
            "/api/admin/medals/{id}/award",
            post(routes_admin::handler_medal_award),
        )
        .route(
            "/api/admin/missions",
            get(routes_admin::handler_missions_list).post(routes_admin::handler_mission_create),
        )
        .route(
            "/api/admin/missions/{id}",
            axum::routing::put(routes_admin::handler_mission_update)
                .delete(routes_admin::handler_mission_delete),
        )
        .route(
            "/api/admin/actions",
            get(routes_admin::handler_actions_list).post(routes_admin::handler_action_create),
        )
        .route(
            "/api/admin/actions/{id}",
            axum::routing::put(routes_admin::handler_action_update)
                .delete(routes_admin::handler_action_delete),
        )
        .route(
            "/api/admin/seasons",
            get(routes_admin::handler_seasons_list).post(routes_admin::handler_season_create),
        )
        .route(
            "/api/admin/users/{id}/role",
            axum::routing::put(routes_admin::handler_user_role),
        )
        // Confraternity
        .route(
            "/api/confraternity",
            get(routes_confraternity::handler_invites_list)
                .post(routes_confraternity::handler_invite_create),
        )
        .route(
            "/api/confraternity/{id}/respond",
            post(routes_confraternity::handler_invite_respond),
        )
        .route(
            "/api/confraternity/{id}/complete",
            post(routes_confraternity::handler_invite_complete),
        )
        .route(
            "/api/confraternity/{id}/cancel",
            post(routes_confraternity::handler_invite_cancel),
        )
        // Marketplace
        .route(
            "/api/marketplace",
            get(routes_marketplace::handler_ads_list).post(routes_marketplace::handler_ad_create),
        )
        .route(
            "/api/marketplace/{id}",
            get(routes_marketplace::handler_ad_get)
                .put(routes_marketplace::handler_ad_update)
                .delete(routes_marketplace::handler_ad_delete),
        )
        // Billing
        .route("/api/stripe/checkout", post(routes_billing::handler_checkout))
        .route("/api/stripe/portal", post(routes_billing::handler_portal))
        .route("/api/stripe/webhook", post(routes_billing::handler_webhook))
        .route("/api/subscription", get(routes_billing::handler_subscription))
        // Referrals
        .route(
            "/api/referrals/register",
            post(routes_referrals::handler_referral_register),
        )
        .route("/api/referrals/me", get(routes_referrals::handler_referral_me))
        // Notifications
        .route(
            "/api/notifications",
            get(routes_notifications::handler_notifications_list),
        )
        .route(
            "/api/notifications/read-all",
            post(routes_notifications::handler_notifications_read_all),
        )
        .route(
            "/api/notifications/{id}/read",
            post(routes_notifications::handler_notification_read),
        )
        // Image tools
        .route(
            "/api/images/remove-background",
            post(routes_images::handler_remove_background),
        )
        .route("/api/images/enhance", post(routes_images::handler_enhance))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(CatchPanicLayer::new())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .with_state(state)
}

pub async fn run(port: u16, database_url: &str) -> Result<()> {
    let database = db::Database::connect(database_url).await?;
    let state = AppState::new(database, AppConfig::from_env());
    let app = build_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "api server running");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("api server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! { _ = ctrl_c => info!("received SIGINT, shutting down"), _ = sigterm.recv() => info!("received SIGTERM, shutting down") }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("received SIGINT, shutting down");
    }
}
