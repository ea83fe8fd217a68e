//! Database integration tests for the distribution job and the
//! gamification ledger.
//!
//! All tests require TEST_DATABASE_URL to be set.
//! Run with: TEST_DATABASE_URL=postgres://... cargo test --test db_integration
//!
//! Tests should be run single-threaded to avoid conflicts:
//!   cargo test --test db_integration -- --test-threads=1

mod common;

use chrono::{TimeDelta, Utc};
use rota::confraternity::{self, ConfraternityError};
use rota::db::medals::MedalInput;
use rota::db::missions::MissionInput;
use rota::db::seasons::SeasonInput;
use rota::db::Database;
use rota::gamification::{self, ClaimOutcome, MedalOutcome};
use rota::integrations::email::Mailer;
use rota::project::{self, CreateProjectPayload, ProjectRow};

/// Skip the test if TEST_DATABASE_URL is not set.
macro_rules! require_db {
    () => {
        if !common::has_test_db() {
            eprintln!("Skipping: TEST_DATABASE_URL not set");
            return;
        }
    };
}

async fn setup() -> Database {
    common::setup_test_db().await
}

fn mailer() -> Mailer {
    Mailer::disabled("http://localhost:3000")
}

fn day_offset() -> chrono::FixedOffset {
    common::test_config().points_day_offset()
}

async fn new_project(db: &Database, client: uuid::Uuid, category: &str) -> ProjectRow {
    let payload = CreateProjectPayload {
        title: "Site institucional".into(),
        description: String::new(),
        category: category.into(),
        scope: "national".into(),
        pista: None,
        budget_cents: Some(500_000),
    };
    let new_project = payload.validate().unwrap();
    db.create_project(client, &new_project, &project::generate_tracking_token())
        .await
        .unwrap()
}

// --- Distribution ---

#[tokio::test]
async fn connect_to_test_db() {
    require_db!();
    let db = setup().await;
    db.health_check().await.unwrap();
}

#[tokio::test]
async fn unstamped_project_is_broadcast_by_cron() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let elite = common::create_member(&db, "professional", &["web"], None).await;
    common::set_plan(&db, elite, "elite").await;
    let created = new_project(&db, client, "web").await;
    assert!(created.group1_notified_at.is_none());

    let report = project::run_distribution(&db, &mailer(), Utc::now()).await.unwrap();
    assert_eq!(report.broadcast, 1);
    assert_eq!(db.count_unread_notifications(elite).await.unwrap(), 1);

    // A second run inside the window does nothing.
    let report = project::run_distribution(&db, &mailer(), Utc::now()).await.unwrap();
    assert_eq!(report.broadcast, 0);
    assert_eq!(report.escalated, 0);
    assert_eq!(db.count_unread_notifications(elite).await.unwrap(), 1);
}

#[tokio::test]
async fn escalation_waits_for_full_window() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let free = common::create_member(&db, "professional", &["web"], None).await;
    let created = new_project(&db, client, "web").await;
    project::distribute_new_project(&db, &mailer(), &created).await.unwrap();
    let now = Utc::now();

    let early = project::run_distribution(&db, &mailer(), now + TimeDelta::hours(23))
        .await
        .unwrap();
    assert_eq!(early.escalated, 0);
    assert_eq!(db.get_project(created.id).await.unwrap().unwrap().current_group, 1);

    let due = project::run_distribution(&db, &mailer(), now + TimeDelta::hours(25))
        .await
        .unwrap();
    assert_eq!(due.escalated, 1);
    let row = db.get_project(created.id).await.unwrap().unwrap();
    assert_eq!(row.current_group, 2);
    assert_eq!(row.status, "pending");
    // Free professionals are group 3 and have not been told yet.
    assert_eq!(db.count_unread_notifications(free).await.unwrap(), 0);
}

/// Make inserts of `activity` rows for `project_id` fail until
/// [`allow_activities`] drops the trigger.
async fn reject_activities(db: &Database, project_id: i64, activity: &str) {
    sqlx::raw_sql(&format!(
        "DROP TRIGGER IF EXISTS reject_project_activity ON project_activities;
         CREATE OR REPLACE FUNCTION reject_project_activity() RETURNS trigger AS $$
         BEGIN
             IF NEW.project_id = {project_id} AND NEW.activity_type = '{activity}' THEN
                 RAISE EXCEPTION 'activity rejected';
             END IF;
             RETURN NEW;
         END
         $$ LANGUAGE plpgsql;
         CREATE TRIGGER reject_project_activity BEFORE INSERT ON project_activities
         FOR EACH ROW EXECUTE FUNCTION reject_project_activity();"
    ))
    .execute(db.pool())
    .await
    .unwrap();
}

async fn allow_activities(db: &Database) {
    sqlx::query("DROP TRIGGER IF EXISTS reject_project_activity ON project_activities")
        .execute(db.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn failed_escalation_does_not_halt_batch_and_is_retried() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let pro = common::create_member(&db, "professional", &["web"], None).await;
    common::set_plan(&db, pro, "pro").await;
    let broken = new_project(&db, client, "web").await;
    let healthy = new_project(&db, client, "web").await;
    project::distribute_new_project(&db, &mailer(), &broken).await.unwrap();
    project::distribute_new_project(&db, &mailer(), &healthy).await.unwrap();
    let now = Utc::now();

    reject_activities(&db, broken.id, "escalated").await;
    let first = project::run_distribution(&db, &mailer(), now + TimeDelta::hours(25))
        .await
        .unwrap();
    allow_activities(&db).await;
    assert_eq!(first.failed, 1);
    assert_eq!(first.escalated, 1);
    assert_eq!(db.get_project(healthy.id).await.unwrap().unwrap().current_group, 2);

    // The failed escalation left nothing behind: still group 1, no group 2 stamp.
    let row = db.get_project(broken.id).await.unwrap().unwrap();
    assert_eq!(row.current_group, 1);
    assert!(row.group2_notified_at.is_none());
    assert_eq!(db.count_unread_notifications(pro).await.unwrap(), 1);

    let retry = project::run_distribution(&db, &mailer(), now + TimeDelta::hours(25))
        .await
        .unwrap();
    assert_eq!(retry.failed, 0);
    let row = db.get_project(broken.id).await.unwrap().unwrap();
    assert_eq!(row.current_group, 2);
    assert!(row.group2_notified_at.is_some());
    assert_eq!(db.count_unread_notifications(pro).await.unwrap(), 2);
    let activities = db.get_project_activities(broken.id).await.unwrap();
    assert_eq!(
        activities.iter().filter(|a| a.activity_type == "escalated").count(),
        1
    );
}

#[tokio::test]
async fn failed_expiry_leaves_project_pending_for_next_run() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let created = new_project(&db, client, "web").await;
    sqlx::query(
        "UPDATE projects SET current_group = 3,
                group1_notified_at = NOW() - INTERVAL '3 days',
                group2_notified_at = NOW() - INTERVAL '2 days',
                group3_notified_at = NOW() - INTERVAL '25 hours'
         WHERE id = $1",
    )
    .bind(created.id)
    .execute(db.pool())
    .await
    .unwrap();

    reject_activities(&db, created.id, "no_interest").await;
    let first = project::run_distribution(&db, &mailer(), Utc::now()).await.unwrap();
    allow_activities(&db).await;
    assert_eq!(first.failed, 1);
    assert_eq!(db.get_project(created.id).await.unwrap().unwrap().status, "pending");
    assert_eq!(db.count_unread_notifications(client).await.unwrap(), 0);

    let retry = project::run_distribution(&db, &mailer(), Utc::now()).await.unwrap();
    assert_eq!(retry.expired, 1);
    assert_eq!(db.get_project(created.id).await.unwrap().unwrap().status, "no_interest");
    assert_eq!(db.count_unread_notifications(client).await.unwrap(), 1);
}

#[tokio::test]
async fn last_group_expiry_marks_no_interest() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let created = new_project(&db, client, "web").await;
    sqlx::query(
        "UPDATE projects SET current_group = 3,
                group1_notified_at = NOW() - INTERVAL '3 days',
                group2_notified_at = NOW() - INTERVAL '2 days',
                group3_notified_at = NOW() - INTERVAL '25 hours'
         WHERE id = $1",
    )
    .bind(created.id)
    .execute(db.pool())
    .await
    .unwrap();

    let report = project::run_distribution(&db, &mailer(), Utc::now()).await.unwrap();
    assert_eq!(report.expired, 1);
    let row = db.get_project(created.id).await.unwrap().unwrap();
    assert_eq!(row.status, "no_interest");
    assert!(row.accepted_by.is_none());
}

#[tokio::test]
async fn accepted_projects_are_never_escalated() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let professional = common::create_member(&db, "professional", &["web"], None).await;
    let created = new_project(&db, client, "web").await;
    project::distribute_new_project(&db, &mailer(), &created).await.unwrap();

    let profile = db.get_profile(professional).await.unwrap().unwrap();
    let outcome = project::accept_project(&db, &mailer(), created.id, &profile)
        .await
        .unwrap();
    assert!(matches!(outcome, project::AcceptOutcome::Accepted(_)));

    let report = project::run_distribution(&db, &mailer(), Utc::now() + TimeDelta::days(5))
        .await
        .unwrap();
    assert_eq!(report.scanned, 0);
    let row = db.get_project(created.id).await.unwrap().unwrap();
    assert_eq!(row.status, "accepted");
    assert_eq!(row.current_group, 1);
    assert_eq!(row.accepted_by, Some(professional));
}

#[tokio::test]
async fn try_accept_is_conditional() {
    require_db!();
    let db = setup().await;
    let client = common::create_member(&db, "client", &[], None).await;
    let first = common::create_member(&db, "professional", &["web"], None).await;
    let second = common::create_member(&db, "professional", &["web"], None).await;
    let created = new_project(&db, client, "web").await;

    assert!(db.try_accept_project(created.id, first).await.unwrap().is_some());
    assert!(db.try_accept_project(created.id, second).await.unwrap().is_none());
    let row = db.get_project(created.id).await.unwrap().unwrap();
    assert_eq!(row.accepted_by, Some(first));
    assert!(row.accepted_at.is_some());
}

// --- Points ---

#[tokio::test]
async fn concurrent_awards_respect_daily_cap() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            gamification::award_points(&db, user, "daily_login", Utc::now(), day_offset())
                .await
                .unwrap()
        }));
    }
    let mut credited = 0;
    for handle in handles {
        if handle.await.unwrap().points > 0 {
            credited += 1;
        }
    }
    assert_eq!(credited, 1);

    let stats = db.get_user_stats(user).await.unwrap().unwrap();
    assert_eq!(stats.total_points, 5);
    assert_eq!(db.get_points_history(user, 50).await.unwrap().len(), 1);
}

#[tokio::test]
async fn uncapped_actions_accumulate() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "professional", &["web"], None).await;
    common::set_plan(&db, user, "pro").await;
    for _ in 0..3 {
        let outcome = gamification::award_points(&db, user, "project_completed", Utc::now(), day_offset())
            .await
            .unwrap();
        assert_eq!(outcome.points, 150);
        assert!(!outcome.limit_reached);
    }
    assert_eq!(db.get_user_stats(user).await.unwrap().unwrap().total_points, 450);
}

#[tokio::test]
async fn inactive_action_awards_nothing() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;
    sqlx::query("UPDATE gamification_actions SET active = false WHERE id = 'daily_login'")
        .execute(db.pool())
        .await
        .unwrap();
    let outcome = gamification::award_points(&db, user, "daily_login", Utc::now(), day_offset())
        .await
        .unwrap();
    assert_eq!(outcome.points, 0);
    assert!(!outcome.limit_reached);
    assert!(db.get_points_history(user, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn crossing_threshold_reports_rank_up() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;
    let first = gamification::award_points(&db, user, "referral", Utc::now(), day_offset())
        .await
        .unwrap();
    assert!(first.rank_up.is_none() || first.rank_up.as_ref().unwrap().name == "Recruta");
    gamification::award_points(&db, user, "referral", Utc::now(), day_offset())
        .await
        .unwrap();
    let third = gamification::award_points(&db, user, "referral", Utc::now(), day_offset())
        .await
        .unwrap();
    assert_eq!(third.total, 600);
    assert_eq!(third.rank_up.unwrap().name, "Soldado");
}

#[tokio::test]
async fn rank_refresh_reads_the_stored_total() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;
    for _ in 0..3 {
        gamification::award_points(&db, user, "referral", Utc::now(), day_offset())
            .await
            .unwrap();
    }
    let ranks = db.list_ranks().await.unwrap();
    let recruta = ranks.iter().find(|r| r.name == "Recruta").unwrap().id;
    let soldado = ranks.iter().find(|r| r.name == "Soldado").unwrap().id;

    // A stale rank write from an older total gets corrected on the next refresh.
    sqlx::query("UPDATE user_gamification SET rank_id = $2 WHERE user_id = $1")
        .bind(user)
        .bind(recruta)
        .execute(db.pool())
        .await
        .unwrap();
    let fixed = gamification::refresh_rank(&db, user).await.unwrap();
    assert_eq!(fixed.unwrap().name, "Soldado");
    assert!(gamification::refresh_rank(&db, user).await.unwrap().is_none());
    assert_eq!(db.get_user_stats(user).await.unwrap().unwrap().rank_id, Some(soldado));
}

#[tokio::test]
async fn concurrent_awards_leave_rank_matching_total() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            gamification::award_points(&db, user, "referral", Utc::now(), day_offset())
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let stats = db.get_user_stats(user).await.unwrap().unwrap();
    assert_eq!(stats.total_points, 1600);
    let ranks = db.list_ranks().await.unwrap();
    let expected = gamification::resolve_rank(&ranks, stats.total_points).unwrap();
    assert_eq!(expected.name, "Cabo");
    assert_eq!(stats.rank_id, Some(expected.id));
}

// --- Medals & missions ---

#[tokio::test]
async fn medal_is_awarded_once() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;
    let medal = db
        .create_medal(&MedalInput {
            slug: "fundador".into(),
            name: "Fundador".into(),
            description: String::new(),
            icon: String::new(),
            points_reward: 40,
            active: true,
        })
        .await
        .unwrap();

    let first = gamification::award_medal(&db, user, medal.id).await.unwrap();
    assert!(matches!(first, MedalOutcome::Awarded { points: 40, .. }));
    let second = gamification::award_medal(&db, user, medal.id).await.unwrap();
    assert!(matches!(second, MedalOutcome::AlreadyHeld));
    assert!(matches!(
        gamification::award_medal(&db, user, medal.id + 1000).await.unwrap(),
        MedalOutcome::NotFound
    ));
    assert_eq!(db.get_user_stats(user).await.unwrap().unwrap().total_points, 40);
}

#[tokio::test]
async fn mission_claims_once_per_season() {
    require_db!();
    let db = setup().await;
    let user = common::create_member(&db, "client", &[], None).await;
    let now = Utc::now();
    db.create_season(&SeasonInput {
        name: "Temporada 1".into(),
        starts_at: now - TimeDelta::days(1),
        ends_at: now + TimeDelta::days(30),
    })
    .await
    .unwrap();
    let mission = db
        .create_mission(&MissionInput {
            title: "Duas propostas".into(),
            description: String::new(),
            action_id: "proposal_submitted".into(),
            target_count: 2,
            points_reward: 25,
            active: true,
        })
        .await
        .unwrap();

    gamification::award_points(&db, user, "proposal_submitted", now, day_offset())
        .await
        .unwrap();
    let early = gamification::claim_mission(&db, user, mission.id, now).await.unwrap();
    assert!(matches!(early, ClaimOutcome::NotReady { progress: 1, target: 2 }));

    gamification::award_points(&db, user, "proposal_submitted", now, day_offset())
        .await
        .unwrap();
    let progress = gamification::mission_progress(&db, user, now).await.unwrap();
    assert!(progress[0].completed);
    assert!(!progress[0].claimed);

    let claim = gamification::claim_mission(&db, user, mission.id, now).await.unwrap();
    assert!(matches!(claim, ClaimOutcome::Claimed { points: 25, total: 45, .. }));
    let again = gamification::claim_mission(&db, user, mission.id, now).await.unwrap();
    assert!(matches!(again, ClaimOutcome::AlreadyClaimed));
}

#[tokio::test]
async fn season_leaderboard_counts_only_season_points() {
    require_db!();
    let db = setup().await;
    let veteran = common::create_member(&db, "client", &[], None).await;
    let rookie = common::create_member(&db, "client", &[], None).await;
    let now = Utc::now();

    for _ in 0..3 {
        gamification::award_points(&db, veteran, "referral", now, day_offset())
            .await
            .unwrap();
    }
    sqlx::query("UPDATE points_history SET created_at = NOW() - INTERVAL '60 days' WHERE user_id = $1")
        .bind(veteran)
        .execute(db.pool())
        .await
        .unwrap();
    gamification::award_points(&db, rookie, "project_accepted", now, day_offset())
        .await
        .unwrap();

    db.create_season(&SeasonInput {
        name: "Temporada 2".into(),
        starts_at: now - TimeDelta::days(7),
        ends_at: now + TimeDelta::days(7),
    })
    .await
    .unwrap();

    let board = gamification::leaderboard(&db, now, 10).await.unwrap();
    assert!(board.season.is_some());
    assert_eq!(board.entries.len(), 1);
    assert_eq!(board.entries[0].user_id, rookie);
}

// --- Confraternity ---

fn invite_payload(invitee: uuid::Uuid) -> confraternity::InvitePayload {
    confraternity::InvitePayload {
        invitee_id: invitee,
        scheduled_for: Utc::now() + TimeDelta::days(2),
        location: "Café Central".into(),
        message: String::new(),
    }
}

#[tokio::test]
async fn concurrent_invites_leave_one_open_invite_per_pair() {
    require_db!();
    let db = setup().await;
    let a = common::create_member(&db, "professional", &["web"], None).await;
    let b = common::create_member(&db, "professional", &["web"], None).await;
    let profile_a = db.get_profile(a).await.unwrap().unwrap();
    let profile_b = db.get_profile(b).await.unwrap().unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        // Both directions of the pair compete.
        let (inviter, invitee) = if i % 2 == 0 {
            (profile_a.clone(), b)
        } else {
            (profile_b.clone(), a)
        };
        handles.push(tokio::spawn(async move {
            confraternity::invite(&db, &mailer(), &inviter, &invite_payload(invitee), Utc::now()).await
        }));
    }
    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(ConfraternityError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(created, 1);
    let open = db
        .list_invites_for_user(a)
        .await
        .unwrap()
        .into_iter()
        .filter(|i| i.status == "pending" || i.status == "accepted")
        .count();
    assert_eq!(open, 1);
}

#[tokio::test]
async fn closed_invite_frees_the_pair() {
    require_db!();
    let db = setup().await;
    let a = common::create_member(&db, "professional", &["web"], None).await;
    let b = common::create_member(&db, "professional", &["web"], None).await;
    let profile_a = db.get_profile(a).await.unwrap().unwrap();

    let first = confraternity::invite(&db, &mailer(), &profile_a, &invite_payload(b), Utc::now())
        .await
        .unwrap();
    confraternity::respond(&db, b, first.id, false).await.unwrap();
    let second = confraternity::invite(&db, &mailer(), &profile_a, &invite_payload(b), Utc::now())
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
}

#[tokio::test]
async fn completion_notifies_the_other_member() {
    require_db!();
    let db = setup().await;
    let inviter = common::create_member(&db, "professional", &["web"], None).await;
    let invitee = common::create_member(&db, "professional", &["web"], None).await;
    let profile = db.get_profile(inviter).await.unwrap().unwrap();

    let invite = confraternity::invite(&db, &mailer(), &profile, &invite_payload(invitee), Utc::now())
        .await
        .unwrap();
    confraternity::respond(&db, invitee, invite.id, true).await.unwrap();
    let after_meetup = invite.scheduled_for + TimeDelta::hours(1);
    let done = confraternity::complete(
        &db,
        invitee,
        invite.id,
        "https://cdn.example.com/foto.jpg",
        after_meetup,
        day_offset(),
    )
    .await
    .unwrap();
    assert_eq!(done.invite.status, "completed");

    let inviter_feed = db.list_notifications(inviter, false, 50).await.unwrap();
    assert!(inviter_feed.iter().any(|n| n.kind == "confraternity_completed"));
    let invitee_feed = db.list_notifications(invitee, false, 50).await.unwrap();
    assert!(!invitee_feed.iter().any(|n| n.kind == "confraternity_completed"));
}
