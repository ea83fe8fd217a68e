//! # Project — Tiered Distribution and Race-Safe Acceptance
//!
//! A client posts a service request (a **project**). It is broadcast to
//! professionals in waves: distribution group 1 (elite plan) first, then
//! group 2 (pro), then group 3 (everyone else), 24 hours apart. The first
//! eligible professional to accept wins; a project nobody accepts ends as
//! `no_interest`.
//!
//! ## Architecture
//!
//! ```text
//! POST /api/projects
//!     ↓ validate (input)
//! PostgreSQL projects + project_activities
//!     ↓ distribute_new_project → group 1
//! cron (/api/cron/distribute-projects or `rota distribute`)
//!     ↓ next_distribution_step → escalate / expire
//! POST /api/projects/{id}/accept
//!     ↓ check_eligibility → conditional UPDATE (one winner)
//! ```
//!
//! ## Module Structure
//!
//! - [`types`] — row types and status vocabularies
//! - [`input`] — request payload validation, status transitions, tracking tokens
//! - [`distribution`] — escalation decision and the distribution run
//! - [`acceptance`] — eligibility rules and the accept flow

mod acceptance;
mod distribution;
mod input;
mod types;

pub use acceptance::*;
pub use distribution::*;
pub use input::*;
pub use types::*;
