//! Integration tests for study session and daily stat persistence.
//!
//! Exercises the repository layer and `PgStudyStore` against a real database:
//! - One running session per user
//! - Guarded close (compare-and-set on `is_active`)
//! - Atomic create-or-add on `(user_id, day)`
//! - Stale-session selection by last liveness signal
//! - Reconciler passes end to end

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rally_core::day_boundary::DayBoundary;
use rally_core::reconcile::{Reconciler, ReconcilerConfig};
use rally_core::store::{CloseOutcome, StudyStore};
use rally_core::types::Timestamp;
use rally_db::models::study_session::CreateStudySession;
use rally_db::repositories::{DailyStatRepo, StudySessionRepo};
use rally_db::PgStudyStore;
use sqlx::PgPool;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
}

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn start_session(pool: &PgPool, user_id: Uuid, started_at: Timestamp) -> i64 {
    let input = CreateStudySession {
        user_id,
        class_id: None,
        started_at,
    };
    StudySessionRepo::create(pool, &input)
        .await
        .expect("session creation should succeed")
        .id
}

// ---------------------------------------------------------------------------
// Repository behaviour
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_second_active_session_violates_unique_index(pool: PgPool) {
    let user = Uuid::new_v4();
    start_session(&pool, user, utc(2025, 6, 2, 10, 0, 0)).await;

    let err = StudySessionRepo::create(
        &pool,
        &CreateStudySession {
            user_id: user,
            class_id: None,
            started_at: utc(2025, 6, 2, 10, 1, 0),
        },
    )
    .await
    .expect_err("second running session must be rejected");

    match err {
        sqlx::Error::Database(db_err) => {
            assert_eq!(db_err.code().as_deref(), Some("23505"));
            assert_eq!(db_err.constraint(), Some("uq_study_sessions_active_user"));
        }
        other => panic!("expected unique violation, got {other:?}"),
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_close_only_once(pool: PgPool) {
    let user = Uuid::new_v4();
    let id = start_session(&pool, user, utc(2025, 6, 2, 10, 0, 0)).await;
    let ended = utc(2025, 6, 2, 10, 2, 30);

    assert!(StudySessionRepo::close(&pool, id, ended, 150).await.unwrap());
    assert!(!StudySessionRepo::close(&pool, id, ended, 999).await.unwrap());

    let session = StudySessionRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert!(!session.is_active);
    assert_eq!(session.ended_at, Some(ended));
    assert_eq!(session.duration_seconds, Some(150));

    // The user may start again once the previous session is closed.
    start_session(&pool, user, utc(2025, 6, 2, 11, 0, 0)).await;
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_upsert_increment_accumulates_in_one_row(pool: PgPool) {
    let user = Uuid::new_v4();
    let d = day(2025, 6, 2);

    let first = DailyStatRepo::upsert_increment(&pool, user, d, 100, true).await.unwrap();
    let second = DailyStatRepo::upsert_increment(&pool, user, d, 50, false).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.total_seconds, 150);
    // Visibility is only applied on creation.
    assert!(second.is_public);

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM daily_stats WHERE user_id = $1")
        .bind(user)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_concurrent_increments_are_not_lost(pool: PgPool) {
    let user = Uuid::new_v4();
    let d = day(2025, 6, 2);

    let mut handles = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            DailyStatRepo::upsert_increment(&pool, user, d, 10, true).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stat = DailyStatRepo::find(&pool, user, d).await.unwrap().unwrap();
    assert_eq!(stat.total_seconds, 100);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_heartbeat_moves_session_out_of_stale_set(pool: PgPool) {
    let user = Uuid::new_v4();
    let started = utc(2025, 6, 2, 10, 0, 0);
    let id = start_session(&pool, user, started).await;
    let now = utc(2025, 6, 2, 10, 10, 0);

    let stale = StudySessionRepo::find_stale_active(&pool, now - Duration::minutes(2))
        .await
        .unwrap();
    assert_eq!(stale.iter().map(|s| s.id).collect::<Vec<_>>(), vec![id]);

    let touched = StudySessionRepo::touch_heartbeat(&pool, user, now - Duration::seconds(30))
        .await
        .unwrap()
        .expect("running session should be touched");
    assert_eq!(touched.last_heartbeat_at, Some(now - Duration::seconds(30)));

    let stale = StudySessionRepo::find_stale_active(&pool, now - Duration::minutes(2))
        .await
        .unwrap();
    assert!(stale.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_heartbeat_without_running_session(pool: PgPool) {
    let touched = StudySessionRepo::touch_heartbeat(&pool, Uuid::new_v4(), Utc::now())
        .await
        .unwrap();
    assert!(touched.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_leaderboard_ranks_public_non_zero_totals(pool: PgPool) {
    let d = day(2025, 6, 2);
    let (a, b, c, hidden, idle) = (
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
    );
    DailyStatRepo::upsert_increment(&pool, a, d, 300, true).await.unwrap();
    DailyStatRepo::upsert_increment(&pool, b, d, 300, true).await.unwrap();
    DailyStatRepo::upsert_increment(&pool, c, d, 100, true).await.unwrap();
    DailyStatRepo::upsert_increment(&pool, hidden, d, 900, false).await.unwrap();
    DailyStatRepo::upsert_increment(&pool, idle, d, 0, true).await.unwrap();
    DailyStatRepo::upsert_increment(&pool, c, day(2025, 6, 1), 5000, true)
        .await
        .unwrap();

    let board = DailyStatRepo::leaderboard(&pool, d, 100, None).await.unwrap();
    let ranks: Vec<(i64, i64)> = board.iter().map(|e| (e.rank, e.total_seconds)).collect();
    assert_eq!(ranks, vec![(1, 300), (1, 300), (3, 100)]);
    assert!(board.iter().all(|e| e.user_id != hidden && e.user_id != idle));

    assert_eq!(DailyStatRepo::rank_of(&pool, d, 100).await.unwrap(), 3);

    assert_eq!(DailyStatRepo::set_visibility(&pool, hidden, true).await.unwrap(), 1);
    let board = DailyStatRepo::leaderboard(&pool, d, 1, None).await.unwrap();
    assert_eq!(board.len(), 1);
    assert_eq!(board[0].user_id, hidden);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_leaderboard_pages_follow_the_cursor(pool: PgPool) {
    let d = day(2025, 6, 2);
    let mut users = Vec::new();
    for seconds in [500, 400, 400, 300, 200] {
        let user = Uuid::new_v4();
        DailyStatRepo::upsert_increment(&pool, user, d, seconds, true)
            .await
            .unwrap();
        users.push(user);
    }

    let first = DailyStatRepo::leaderboard(&pool, d, 3, None).await.unwrap();
    let cursor = first.last().unwrap().cursor();
    let second = DailyStatRepo::leaderboard(&pool, d, 3, Some(&cursor))
        .await
        .unwrap();

    let ranks: Vec<(i64, i64)> = first
        .iter()
        .chain(&second)
        .map(|e| (e.rank, e.total_seconds))
        .collect();
    assert_eq!(ranks, vec![(1, 500), (2, 400), (2, 400), (4, 300), (5, 200)]);

    let mut seen: Vec<Uuid> = first.iter().chain(&second).map(|e| e.user_id).collect();
    seen.sort();
    users.sort();
    assert_eq!(seen, users);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_hidden_preference_applies_to_new_days(pool: PgPool) {
    let user = Uuid::new_v4();
    DailyStatRepo::upsert_increment(&pool, user, day(2025, 6, 1), 600, true)
        .await
        .unwrap();

    assert_eq!(DailyStatRepo::set_visibility(&pool, user, false).await.unwrap(), 1);
    assert_eq!(
        DailyStatRepo::visibility_preference(&pool, user).await.unwrap(),
        Some(false)
    );

    // The next day's first credit asks for a public row but inherits the
    // saved preference.
    let next = DailyStatRepo::upsert_increment(&pool, user, day(2025, 6, 2), 300, true)
        .await
        .unwrap();
    assert!(!next.is_public);
    assert!(DailyStatRepo::leaderboard(&pool, day(2025, 6, 2), 100, None)
        .await
        .unwrap()
        .is_empty());

    // Users who never chose keep the caller's default.
    let other = Uuid::new_v4();
    assert_eq!(DailyStatRepo::visibility_preference(&pool, other).await.unwrap(), None);
    let stat = DailyStatRepo::upsert_increment(&pool, other, day(2025, 6, 2), 300, true)
        .await
        .unwrap();
    assert!(stat.is_public);
}

// ---------------------------------------------------------------------------
// PgStudyStore + reconciler
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_store_close_and_credit_is_exactly_once(pool: PgPool) {
    let store = PgStudyStore::new(pool.clone());
    let user = Uuid::new_v4();
    let id = start_session(&pool, user, utc(2025, 6, 2, 10, 0, 0)).await;
    let session = StudySessionRepo::find_by_id(&pool, id)
        .await
        .unwrap()
        .unwrap()
        .to_active();
    let now = utc(2025, 6, 2, 10, 2, 30);
    let d = day(2025, 6, 2);

    let (a, b) = tokio::join!(
        store.close_and_credit(&session, now, 150, d),
        store.close_and_credit(&session, now, 150, d),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, CloseOutcome::Credited(_)))
            .count(),
        1
    );
    let stat = DailyStatRepo::find(&pool, user, d).await.unwrap().unwrap();
    assert_eq!(stat.total_seconds, 150);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_reconciler_pass_against_postgres(pool: PgPool) {
    let store = PgStudyStore::new(pool.clone());
    let boundary = DayBoundary::default();
    let config = ReconcilerConfig::default();
    let user = Uuid::new_v4();
    let id = start_session(&pool, user, utc(2025, 6, 2, 10, 0, 0)).await;
    let now = utc(2025, 6, 2, 10, 2, 30);

    let reconciler = Reconciler::new(&store, &boundary, &config);
    let report = reconciler.reconcile_stale(now).await.unwrap();
    assert_eq!(report.reconciled_count(), 1);

    let session = StudySessionRepo::find_by_id(&pool, id).await.unwrap().unwrap();
    assert!(!session.is_active);
    assert_eq!(session.duration_seconds, Some(150));
    let stat = DailyStatRepo::find(&pool, user, day(2025, 6, 2)).await.unwrap().unwrap();
    assert_eq!(stat.total_seconds, 150);

    // A second pass finds nothing and credits nothing.
    let again = reconciler.reconcile_stale(utc(2025, 6, 2, 10, 5, 0)).await.unwrap();
    assert_eq!(again.reconciled_count(), 0);
    let stat = DailyStatRepo::find(&pool, user, day(2025, 6, 2)).await.unwrap().unwrap();
    assert_eq!(stat.total_seconds, 150);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_midnight_reset_credits_previous_day(pool: PgPool) {
    let store = PgStudyStore::new(pool.clone());
    let boundary = DayBoundary::default();
    let config = ReconcilerConfig::default();
    let user = Uuid::new_v4();
    // 23:00 on June 1 in New York; reset runs at 00:01 on June 2.
    start_session(&pool, user, utc(2025, 6, 2, 3, 0, 0)).await;

    let report = Reconciler::new(&store, &boundary, &config)
        .finalize_all_active(utc(2025, 6, 2, 4, 1, 0))
        .await
        .unwrap();

    assert_eq!(report.reconciled_count(), 1);
    let stat = DailyStatRepo::find(&pool, user, day(2025, 6, 1)).await.unwrap().unwrap();
    assert_eq!(stat.total_seconds, 3660);
    assert!(StudySessionRepo::find_active_for_user(&pool, user)
        .await
        .unwrap()
        .is_none());
}
