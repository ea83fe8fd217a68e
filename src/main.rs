//! # Main — CLI Entry Point
//!
//! Routes subcommands to the API server, the distribution job and the
//! migration runner.
//!
//! ## Subcommands
//!
//! - `serve`: start the HTTP API (`--port`, default 8080).
//! - `distribute`: run one tiered distribution pass and print its report.
//!   Equivalent to the cron endpoint, for schedulers that prefer a process.
//! - `migrate`: apply the SQL files under `supabase/migrations/`.
//!
//! ## Global Options
//!
//! - `--database-url` / `DATABASE_URL`: PostgreSQL connection string.
//!
//! Integration secrets (`SUPABASE_JWT_SECRET`, `CRON_SECRET`, Stripe,
//! Resend, remove.bg) come from the environment; see `rota::config`.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "rota", about = "Rota Business Club backend")]
struct Cli {
    /// PostgreSQL connection URL (or set DATABASE_URL env var)
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = 8080)]
        port: u16,
    },
    /// Run one project distribution pass (escalations and expiries)
    Distribute,
    /// Apply SQL migrations
    Migrate {
        /// Directory holding the *.sql files, applied in name order
        #[arg(long, default_value = "supabase/migrations")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Initialize structured logging: LOG_FORMAT=json for production, human-readable otherwise
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let database_url = cli.database_url.as_deref().ok_or_else(|| {
        anyhow::anyhow!("DATABASE_URL is required (set via --database-url or env)")
    })?;

    let rt = tokio::runtime::Runtime::new()?;
    match &cli.command {
        Commands::Serve { port } => rt.block_on(rota::api::run(*port, database_url)),
        Commands::Distribute => rt.block_on(cli::run_distribute(database_url)),
        Commands::Migrate { dir } => rt.block_on(cli::run_migrate(database_url, dir)),
    }
}
