//! Postgres implementation of the reconciler's persistence collaborator.

use async_trait::async_trait;
use chrono::NaiveDate;
use rally_core::store::{
    ActiveSession, CloseOutcome, DailyTotal, StoreError, StudyStore, DEFAULT_STAT_VISIBILITY,
};
use rally_core::types::{DbId, Timestamp, UserId};
use sqlx::PgPool;

use crate::repositories::{DailyStatRepo, StudySessionRepo};

/// SQLSTATE codes worth retrying: serialization failure and deadlock.
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// [`StudyStore`] backed by the shared connection pool.
///
/// Cloning is cheap; build one per pass or per request.
#[derive(Debug, Clone)]
pub struct PgStudyStore {
    pool: PgPool,
}

impl PgStudyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Sort a sqlx error into transient (retry) or permanent.
pub fn classify_sqlx_error(err: sqlx::Error) -> StoreError {
    let transient = match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .as_deref()
            .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code)),
        _ => false,
    };

    if transient {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Permanent(err.to_string())
    }
}

#[async_trait]
impl StudyStore for PgStudyStore {
    async fn find_stale_active_sessions(
        &self,
        now: Timestamp,
        idle_threshold: chrono::Duration,
    ) -> Result<Vec<ActiveSession>, StoreError> {
        let rows = StudySessionRepo::find_stale_active(&self.pool, now - idle_threshold)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(ActiveSession::from).collect())
    }

    async fn find_active_sessions(&self) -> Result<Vec<ActiveSession>, StoreError> {
        let rows = StudySessionRepo::list_active(&self.pool)
            .await
            .map_err(classify_sqlx_error)?;
        Ok(rows.into_iter().map(ActiveSession::from).collect())
    }

    async fn close_session(
        &self,
        session_id: DbId,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, StoreError> {
        StudySessionRepo::close(&self.pool, session_id, ended_at, duration_seconds)
            .await
            .map_err(classify_sqlx_error)
    }

    async fn upsert_daily_stat(
        &self,
        user_id: UserId,
        day: NaiveDate,
        increment_seconds: i64,
        default_public: bool,
    ) -> Result<DailyTotal, StoreError> {
        DailyStatRepo::upsert_increment(&self.pool, user_id, day, increment_seconds, default_public)
            .await
            .map(DailyTotal::from)
            .map_err(classify_sqlx_error)
    }

    /// Close and credit in one transaction, so a failure between the two
    /// writes rolls the close back and the session stays eligible.
    async fn close_and_credit(
        &self,
        session: &ActiveSession,
        ended_at: Timestamp,
        duration_seconds: i64,
        day: NaiveDate,
    ) -> Result<CloseOutcome, StoreError> {
        let stat = StudySessionRepo::close_and_credit(
            &self.pool,
            session.id,
            session.user_id,
            ended_at,
            duration_seconds,
            day,
            DEFAULT_STAT_VISIBILITY,
        )
        .await
        .map_err(classify_sqlx_error)?;

        Ok(match stat {
            Some(stat) => CloseOutcome::Credited(stat.into()),
            None => CloseOutcome::AlreadyClosed,
        })
    }
}
