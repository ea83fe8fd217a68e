//! # Database — PostgreSQL Storage Layer
//!
//! Async database operations for the club platform via `sqlx::PgPool`
//! connecting to Supabase PostgreSQL.
//!
//! ## Schema
//!
//! - `profiles`, `subscriptions`: members, roles, capability tags, plan tier
//! - `projects`, `project_activities`, `project_proposals`: client requests,
//!   their audit log and professional bids
//! - `gamification_actions`, `user_gamification`, `points_history`: point
//!   economy (action config, running totals, append-only ledger)
//! - `ranks`, `medals`, `user_medals`, `seasons`, `missions`, `user_missions`
//! - `confraternity_invites`, `marketplace_ads`, `notifications`, `referrals`
//!
//! ## Module Structure
//!
//! Operations are split into submodules by domain:
//!
//! - [`profiles`] — profile lookup, role, edits, referral codes
//! - [`projects`] — project lifecycle, conditional accept, escalation, activity log
//! - [`proposals`] — professional bids on projects
//! - [`distribution`] — broadcast of a project to one distribution group
//! - [`gamification`] — action config, locked point award transaction, history
//! - [`ranks`], [`medals`], [`seasons`], [`missions`] — gamification catalogue
//! - [`notifications`] — in-app notification feed
//! - [`subscriptions`] — Stripe-backed plan state
//! - [`referrals`] — referral registrations
//! - [`confraternity`] — meetup invites between members
//! - [`marketplace`] — member classified ads
//!
//! Row-level security is enforced by Supabase for direct client access; this
//! service connects with a privileged role, so every handler checks ownership
//! itself before calling into this layer.

pub mod confraternity;
pub mod distribution;
pub mod gamification;
pub mod marketplace;
pub mod medals;
pub mod missions;
pub mod notifications;
pub mod profiles;
mod projects;
mod proposals;
pub mod referrals;
pub mod ranks;
pub mod seasons;
pub mod subscriptions;

use anyhow::{Context, Result};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::path::Path;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to PostgreSQL using the provided database URL.
    ///
    /// Manually parses the URL to preserve the full username; sqlx's built-in
    /// parser strips the ".project-ref" suffix that Supabase pooler requires.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let url = url::Url::parse(database_url)?;
        let username = urlencoding::decode(url.username())?.into_owned();
        let password = url
            .password()
            .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
            .transpose()?;
        let mut opts = PgConnectOptions::new()
            .host(url.host_str().unwrap_or("localhost"))
            .port(url.port().unwrap_or(5432))
            .database(url.path().trim_start_matches('/'))
            .username(&username)
            .statement_cache_capacity(0);
        if let Some(ref pw) = password {
            opts = opts.password(pw);
        }
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .connect_with(opts)
            .await?;
        Ok(Database { pool })
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check: execute `SELECT 1` to verify database connectivity.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply every `*.sql` file in `dir`, in file-name order.
    ///
    /// Migrations are written to be re-runnable (`IF NOT EXISTS`,
    /// `ON CONFLICT DO NOTHING`), so there is no applied-version table.
    pub async fn run_migrations(&self, dir: &Path) -> Result<usize> {
        let mut files: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("reading migrations from {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "sql"))
            .collect();
        files.sort();

        for file in &files {
            let sql = std::fs::read_to_string(file)?;
            sqlx::raw_sql(&sql)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration {} failed", file.display()))?;
            tracing::info!(file = %file.display(), "migration applied");
        }
        Ok(files.len())
    }
}

/// Whitelisted ORDER BY direction. Only "asc"/"ASC" select ascending order.
pub(crate) fn safe_sort_dir(dir: Option<&str>) -> &'static str {
    match dir {
        Some("asc") | Some("ASC") => "ASC",
        _ => "DESC",
    }
}

/// Escape `%`, `_` and `\` so user text is matched literally inside ILIKE.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_sort_dir_accepts_asc() {
        assert_eq!(safe_sort_dir(Some("asc")), "ASC");
        assert_eq!(safe_sort_dir(Some("ASC")), "ASC");
    }

    #[test]
    fn safe_sort_dir_defaults_to_desc() {
        for input in ["desc", "Asc", "'; DROP TABLE projects; --", ""] {
            assert_eq!(safe_sort_dir(Some(input)), "DESC", "input {:?}", input);
        }
        assert_eq!(safe_sort_dir(None), "DESC");
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("abc"), "%abc%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
