//! Property-based tests for point arithmetic, gamification days, rank
//! resolution and the distribution schedule.
//!
//! No database or network access required; these always run.
//!
//! ```bash
//! cargo test --test property_tests
//! PROPTEST_CASES=10000 cargo test --test property_tests
//! ```
//!
//! Each property is named `prop_<function>_<invariant>`.

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;

use rota::db::ranks::RankRow;
use rota::gamification::{compute_points, day_start, next_rank, resolve_rank, PlanTier};
use rota::project::{next_distribution_step, DistributionStep, ProjectRow, DISTRIBUTION_WINDOW_HOURS};

fn project(status: &str, group: i32, notified: [Option<DateTime<Utc>>; 3]) -> ProjectRow {
    let created = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
    ProjectRow {
        id: 1,
        client_id: uuid::Uuid::nil(),
        title: "Projeto".into(),
        description: String::new(),
        category: "web".into(),
        scope: "national".into(),
        pista: None,
        budget_cents: None,
        status: status.into(),
        current_group: group,
        group1_notified_at: notified[0],
        group2_notified_at: notified[1],
        group3_notified_at: notified[2],
        accepted_by: None,
        accepted_at: None,
        completed_at: None,
        tracking_token: "0".repeat(32),
        created_at: created,
        updated_at: created,
    }
}

fn ladder() -> Vec<RankRow> {
    [0i64, 500, 1500, 4000, 10000, 25000, 60000]
        .iter()
        .enumerate()
        .map(|(i, min)| RankRow {
            id: i as i64 + 1,
            name: format!("rank{}", i),
            min_points: *min,
            icon: String::new(),
            sort_order: i as i32,
        })
        .collect()
}

fn plan() -> impl Strategy<Value = PlanTier> {
    prop_oneof![Just(PlanTier::Free), Just(PlanTier::Pro), Just(PlanTier::Elite)]
}

proptest! {
    #[test]
    fn prop_compute_points_free_is_identity(base in 0i64..1_000_000) {
        prop_assert_eq!(compute_points(base, PlanTier::Free.multiplier()), base);
    }

    #[test]
    fn prop_compute_points_monotonic_in_plan(base in 0i64..1_000_000) {
        let free = compute_points(base, PlanTier::Free.multiplier());
        let pro = compute_points(base, PlanTier::Pro.multiplier());
        let elite = compute_points(base, PlanTier::Elite.multiplier());
        prop_assert!(free <= pro && pro <= elite);
        prop_assert_eq!(elite, base * 2);
    }

    #[test]
    fn prop_compute_points_within_half_of_exact(base in 0i64..1_000_000, tier in plan()) {
        let exact = base as f64 * tier.multiplier();
        let points = compute_points(base, tier.multiplier());
        prop_assert!((points as f64 - exact).abs() <= 0.5);
    }

    #[test]
    fn prop_distribution_group_matches_plan_order(tier in plan()) {
        let group = tier.distribution_group();
        prop_assert!((1..=3).contains(&group));
        prop_assert_eq!(group == 1, tier == PlanTier::Elite);
    }

    #[test]
    fn prop_day_start_contains_now(secs in 0i64..4_000_000_000, hours in -12i32..=14) {
        let now = Utc.timestamp_opt(secs, 0).unwrap();
        let offset = FixedOffset::east_opt(hours * 3600).unwrap();
        let start = day_start(now, offset);
        prop_assert!(start <= now);
        prop_assert!(now - start < TimeDelta::days(1));
        let local = start.with_timezone(&offset);
        prop_assert_eq!(local.format("%H:%M:%S").to_string(), "00:00:00");
    }

    #[test]
    fn prop_resolve_rank_is_highest_reached(total in 0i64..200_000) {
        let ranks = ladder();
        let rank = resolve_rank(&ranks, total).unwrap();
        prop_assert!(rank.min_points <= total);
        if let Some(next) = next_rank(&ranks, total) {
            prop_assert!(next.min_points > total);
            prop_assert!(next.min_points > rank.min_points);
        } else {
            prop_assert_eq!(rank.min_points, 60000);
        }
    }

    #[test]
    fn prop_no_step_inside_window(group in 1i32..=3, minutes in 0i64..(DISTRIBUTION_WINDOW_HOURS * 60)) {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut notified = [None; 3];
        for g in 0..group as usize {
            notified[g] = Some(stamp);
        }
        let p = project("pending", group, notified);
        prop_assert_eq!(next_distribution_step(&p, stamp + TimeDelta::minutes(minutes)), None);
    }

    #[test]
    fn prop_window_expiry_moves_forward(group in 1i32..=3, extra in 0i64..10_000) {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let mut notified = [None; 3];
        for g in 0..group as usize {
            notified[g] = Some(stamp);
        }
        let p = project("pending", group, notified);
        let now = stamp + TimeDelta::hours(DISTRIBUTION_WINDOW_HOURS) + TimeDelta::minutes(extra);
        let expected = if group < 3 {
            DistributionStep::Escalate { from: group, to: group + 1 }
        } else {
            DistributionStep::Expire
        };
        prop_assert_eq!(next_distribution_step(&p, now), Some(expected));
    }

    #[test]
    fn prop_settled_projects_never_move(
        status in prop_oneof![Just("accepted"), Just("in_progress"), Just("completed"), Just("no_interest")],
        group in 1i32..=3,
        days in 0i64..365,
    ) {
        let stamp = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let p = project(status, group, [Some(stamp); 3]);
        prop_assert_eq!(next_distribution_step(&p, stamp + TimeDelta::days(days)), None);
    }
}
