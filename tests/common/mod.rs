//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Once;

use rota::config::AppConfig;
use rota::db::Database;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const CRON_SECRET: &str = "test-cron-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

/// Returns the test database URL from the `TEST_DATABASE_URL` environment variable.
/// Panics if the variable is not set.
pub fn test_db_url() -> String {
    std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for integration tests")
}

/// Returns true if the test database URL is configured.
pub fn has_test_db() -> bool {
    std::env::var("TEST_DATABASE_URL").is_ok()
}

/// One-time schema initialization.
static SCHEMA_INIT: Once = Once::new();

/// Ensure the test database schema is set up (runs migrations once per test suite).
///
/// Runs on its own thread: the caller is usually inside a tokio test
/// runtime, which cannot block on a second one.
pub fn ensure_schema() {
    SCHEMA_INIT.call_once(|| {
        std::thread::spawn(|| {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let db = Database::connect(&test_db_url()).await.unwrap();
                db.run_migrations(Path::new("supabase/migrations"))
                    .await
                    .unwrap_or_else(|e| panic!("migrations failed: {:#}", e));
            });
        })
        .join()
        .unwrap();
    });
}

/// Connect to the test database (also ensures schema is set up).
pub async fn setup_test_db() -> Database {
    ensure_schema();
    let db = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    truncate_all_tables(&db).await;
    db
}

pub fn test_config() -> AppConfig {
    AppConfig {
        jwt_secret: Some(JWT_SECRET.to_string()),
        cron_secret: Some(CRON_SECRET.to_string()),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
        email_from: "Rota <test@example.com>".to_string(),
        app_url: "http://localhost:3000".to_string(),
        points_day_offset_hours: -3,
        ..Default::default()
    }
}

/// Build an Axum test app router connected to the test database.
pub async fn build_test_app() -> axum::Router {
    build_test_app_with_db().await.0
}

/// Like [`build_test_app`], also returning a handle for direct SQL setup.
pub async fn build_test_app_with_db() -> (axum::Router, Database) {
    let db = setup_test_db().await;
    let handle = Database::connect(&test_db_url())
        .await
        .expect("Failed to connect to test database");
    let state = rota::api::AppState::new(db, test_config());
    (rota::api::build_router(state), handle)
}

/// Truncate all tables to ensure test isolation, then restore the seeded
/// point actions and ranks.
pub async fn truncate_all_tables(db: &Database) {
    sqlx::raw_sql(
        "DROP TRIGGER IF EXISTS reject_project_activity ON project_activities;
         TRUNCATE TABLE marketplace_ads, confraternity_invites, user_missions, missions,
                       seasons, user_medals, medals, points_history, user_gamification,
                       ranks, gamification_actions, project_proposals, project_activities,
                       projects, referrals, notifications, subscriptions, profiles
         RESTART IDENTITY CASCADE",
    )
    .execute(db.pool())
    .await
    .unwrap();

    db.run_migrations(Path::new("supabase/migrations"))
        .await
        .unwrap_or_else(|e| panic!("re-seeding failed: {:#}", e));
}

/// A signed Supabase-style access token for `user_id`.
pub fn token_for(user_id: uuid::Uuid) -> String {
    let claims = serde_json::json!({
        "sub": user_id.to_string(),
        "aud": "authenticated",
        "email": format!("{}@example.com", user_id.simple()),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

/// Insert a member with the given role, categories and pista.
pub async fn create_member(
    db: &Database,
    role: &str,
    categories: &[&str],
    pista: Option<&str>,
) -> uuid::Uuid {
    let id = uuid::Uuid::new_v4();
    db.ensure_profile(id, Some(&format!("{}@example.com", id.simple())))
        .await
        .unwrap();
    let categories: Vec<String> = categories.iter().map(|c| c.to_string()).collect();
    sqlx::query(
        "UPDATE profiles SET role = $2, categories = $3, pista = $4, display_name = $5
         WHERE id = $1",
    )
    .bind(id)
    .bind(role)
    .bind(&categories)
    .bind(pista)
    .bind(format!("Member {}", &id.simple().to_string()[..6]))
    .execute(db.pool())
    .await
    .unwrap();
    id
}

/// Give `user_id` an active subscription on `plan`.
pub async fn set_plan(db: &Database, user_id: uuid::Uuid, plan: &str) {
    db.upsert_subscription(
        user_id,
        &rota::db::subscriptions::SubscriptionUpsert {
            plan,
            status: "active",
            stripe_customer_id: None,
            stripe_subscription_id: None,
            current_period_end: None,
        },
    )
    .await
    .unwrap();
}
