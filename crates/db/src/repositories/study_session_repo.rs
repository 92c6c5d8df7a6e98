//! Repository for the `study_sessions` table.

use chrono::NaiveDate;
use rally_core::types::{DbId, Timestamp, UserId};
use sqlx::PgPool;

use super::daily_stat_repo::upsert_increment_query;
use crate::models::daily_stat::DailyStat;
use crate::models::study_session::{ActiveSessionRow, CreateStudySession, StudySession};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, class_id, started_at, ended_at, duration_seconds, \
                       is_active, last_heartbeat_at, created_at, updated_at";

/// Liveness columns read by the stale-session sweep.
const ACTIVE_COLUMNS: &str = "id, user_id, started_at, last_heartbeat_at";

/// Guarded close: only matches while the session is still active, so of two
/// racing closers exactly one sees a row affected.
const CLOSE_QUERY: &str = "UPDATE study_sessions \
     SET ended_at = $2, duration_seconds = $3, is_active = false, updated_at = NOW() \
     WHERE id = $1 AND is_active = true";

/// Provides query operations for study sessions.
pub struct StudySessionRepo;

impl StudySessionRepo {
    /// Insert a new running session, returning the created row.
    ///
    /// The start counts as the first heartbeat. Fails with a unique violation
    /// on `uq_study_sessions_active_user` if the user already has a running
    /// session.
    pub async fn create(
        pool: &PgPool,
        input: &CreateStudySession,
    ) -> Result<StudySession, sqlx::Error> {
        let query = format!(
            "INSERT INTO study_sessions (user_id, class_id, started_at, last_heartbeat_at, is_active) \
             VALUES ($1, $2, $3, $3, true) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StudySession>(&query)
            .bind(input.user_id)
            .bind(input.class_id)
            .bind(input.started_at)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<StudySession>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM study_sessions WHERE id = $1");
        sqlx::query_as::<_, StudySession>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The user's running session, if any.
    pub async fn find_active_for_user(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Option<StudySession>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM study_sessions WHERE user_id = $1 AND is_active = true"
        );
        sqlx::query_as::<_, StudySession>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Record a liveness signal on the user's running session.
    ///
    /// Returns `None` when the user has no running session.
    pub async fn touch_heartbeat(
        pool: &PgPool,
        user_id: UserId,
        at: Timestamp,
    ) -> Result<Option<StudySession>, sqlx::Error> {
        let query = format!(
            "UPDATE study_sessions \
             SET last_heartbeat_at = GREATEST(COALESCE(last_heartbeat_at, started_at), $2), \
                 updated_at = NOW() \
             WHERE user_id = $1 AND is_active = true \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, StudySession>(&query)
            .bind(user_id)
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Active sessions whose last liveness signal is older than `cutoff`.
    pub async fn find_stale_active(
        pool: &PgPool,
        cutoff: Timestamp,
    ) -> Result<Vec<ActiveSessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ACTIVE_COLUMNS} FROM study_sessions \
             WHERE is_active = true \
               AND COALESCE(last_heartbeat_at, started_at) < $1 \
             ORDER BY id"
        );
        sqlx::query_as::<_, ActiveSessionRow>(&query)
            .bind(cutoff)
            .fetch_all(pool)
            .await
    }

    pub async fn list_active(pool: &PgPool) -> Result<Vec<ActiveSessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {ACTIVE_COLUMNS} FROM study_sessions WHERE is_active = true ORDER BY id"
        );
        sqlx::query_as::<_, ActiveSessionRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Close a running session. Returns `true` if this call closed it.
    pub async fn close(
        pool: &PgPool,
        id: DbId,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(CLOSE_QUERY)
            .bind(id)
            .bind(ended_at)
            .bind(duration_seconds)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Close a running session and credit its duration to the owner's total
    /// for `day` in one transaction.
    ///
    /// Returns `None` (and writes nothing) if the session was already closed.
    pub async fn close_and_credit(
        pool: &PgPool,
        id: DbId,
        user_id: UserId,
        ended_at: Timestamp,
        duration_seconds: i64,
        day: NaiveDate,
        default_public: bool,
    ) -> Result<Option<DailyStat>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let closed = sqlx::query(CLOSE_QUERY)
            .bind(id)
            .bind(ended_at)
            .bind(duration_seconds)
            .execute(&mut *tx)
            .await?;
        if closed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let stat = sqlx::query_as::<_, DailyStat>(&upsert_increment_query())
            .bind(user_id)
            .bind(day)
            .bind(duration_seconds)
            .bind(default_public)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(stat))
    }
}
