//! # Gamification — Points, Ranks, Medals, Missions
//!
//! The club's point currency ("Vigor") is credited for named actions. Each
//! action has a base value and an optional daily cap; the member's plan
//! multiplies the base. Every credit lands in the append-only
//! `points_history` ledger with an audit payload, and the running total
//! decides the member's rank.
//!
//! ## Module Structure
//!
//! - [`tiers`] — plan tiers, multipliers, point arithmetic, day boundaries
//! - [`award`] — the capped point award flow
//! - [`ranks`] — rank resolution from a total
//! - [`medals`] — once-only medal awards
//! - [`missions`] — mission progress and claims, seasonal leaderboard

mod award;
mod medals;
mod missions;
mod ranks;
mod tiers;

pub use award::*;
pub use medals::*;
pub use missions::*;
pub use ranks::*;
pub use tiers::*;
