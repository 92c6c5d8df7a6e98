//! Persistence collaborator for study sessions and daily totals.
//!
//! The reconciler only ever talks to storage through [`StudyStore`]. Every
//! method is a single bounded storage call; correctness under concurrent
//! passes comes from the implementation's per-record atomicity:
//!
//! - [`StudyStore::close_session`] is a compare-and-set on `is_active`.
//! - [`StudyStore::upsert_daily_stat`] is an atomic create-or-add.
//! - [`StudyStore::close_and_credit`] applies both or neither.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

use crate::types::{DbId, Timestamp, UserId};

#[cfg(test)]
pub(crate) mod memory;

/// Visibility given to a daily stat row created by crediting.
pub const DEFAULT_STAT_VISIBILITY: bool = true;

/// An open study session as seen by the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub id: DbId,
    pub user_id: UserId,
    pub started_at: Timestamp,
    pub last_heartbeat_at: Option<Timestamp>,
}

impl ActiveSession {
    /// Last liveness signal. Sessions that never sent a heartbeat count from
    /// their start.
    pub fn last_seen_at(&self) -> Timestamp {
        self.last_heartbeat_at.unwrap_or(self.started_at)
    }
}

/// Cumulative seconds for one user on one civil day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub user_id: UserId,
    pub day: NaiveDate,
    pub total_seconds: i64,
    pub is_public: bool,
}

/// Result of an attempt to close a session and credit its time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// This call closed the session; the day's running total after crediting.
    Credited(DailyTotal),
    /// Someone else closed the session first. Nothing was credited.
    AlreadyClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Connection loss, pool exhaustion, timeouts. Worth retrying.
    #[error("Transient storage failure: {0}")]
    Transient(String),

    #[error("Storage failure: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

#[async_trait]
pub trait StudyStore: Send + Sync {
    /// Active sessions whose last liveness signal is older than
    /// `now - idle_threshold`.
    async fn find_stale_active_sessions(
        &self,
        now: Timestamp,
        idle_threshold: chrono::Duration,
    ) -> Result<Vec<ActiveSession>, StoreError>;

    /// Every session that is still active.
    async fn find_active_sessions(&self) -> Result<Vec<ActiveSession>, StoreError>;

    /// Close a session if and only if it is still active.
    ///
    /// Returns `true` when this call performed the close.
    async fn close_session(
        &self,
        session_id: DbId,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, StoreError>;

    /// Create the `(user_id, day)` row with `increment_seconds`, or atomically
    /// add `increment_seconds` to the existing row.
    async fn upsert_daily_stat(
        &self,
        user_id: UserId,
        day: NaiveDate,
        increment_seconds: i64,
        default_public: bool,
    ) -> Result<DailyTotal, StoreError>;

    /// Close `session` and credit `duration_seconds` to `day` as one unit.
    ///
    /// Either both writes take effect or neither does: a failure must leave
    /// the session active so a later pass can retry it. Returns
    /// [`CloseOutcome::AlreadyClosed`] without crediting when the session
    /// was no longer active.
    async fn close_and_credit(
        &self,
        session: &ActiveSession,
        ended_at: Timestamp,
        duration_seconds: i64,
        day: NaiveDate,
    ) -> Result<CloseOutcome, StoreError>;
}
