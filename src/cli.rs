//! # CLI Execution Functions
//!
//! Subcommand bodies that run outside the HTTP server.

use anyhow::Result;
use rota::config::AppConfig;
use rota::db;
use rota::integrations::email::Mailer;
use rota::project;
use std::path::Path;
use tracing::info;

/// One distribution pass; the report goes to stdout as JSON.
pub async fn run_distribute(database_url: &str) -> Result<()> {
    let database = db::Database::connect(database_url).await?;
    let mailer = Mailer::new(&AppConfig::from_env());
    let report = project::run_distribution(&database, &mailer, chrono::Utc::now()).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn run_migrate(database_url: &str, dir: &Path) -> Result<()> {
    let database = db::Database::connect(database_url).await?;
    let applied = database.run_migrations(dir).await?;
    info!(applied, dir = %dir.display(), "migrations applied");
    Ok(())
}
