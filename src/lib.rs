//! # Rota — Business Club Backend
//!
//! HTTP API and jobs for a members' business club: projects posted by
//! clients are broadcast to professionals in plan-ordered tiers, the first
//! eligible professional to accept wins, and member activity earns points,
//! ranks, medals and mission rewards.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`api`] | Axum router, auth extractors, handlers |
//! | [`project`] | Distribution job and race-safe acceptance |
//! | [`gamification`] | Point awards, ranks, medals, missions, leaderboard |
//! | [`confraternity`] | Member meetups |
//! | [`marketplace`] | Classified ads |
//! | [`billing`] | Stripe sessions and webhook |
//! | [`referrals`] | Referral codes |
//! | [`integrations`] | Email and image APIs |
//! | [`db`] | PostgreSQL storage |

pub mod api;
pub mod billing;
pub mod config;
pub mod confraternity;
pub mod db;
pub mod gamification;
pub mod integrations;
pub mod marketplace;
pub mod project;
pub mod prom_metrics;
pub mod referrals;
