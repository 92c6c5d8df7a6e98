//! Idle-session reconciliation.
//!
//! A study timer is supposed to be stopped explicitly, but browsers close and
//! phones sleep. A session that has sent no liveness signal for longer than
//! the idle threshold is presumed abandoned: the reconciler closes it, works
//! out how long it ran, and adds that to the owner's total for the day.
//!
//! Each session is reconciled independently. A storage failure on one session
//! is retried (if transient) and then recorded in the [`ReconcileReport`];
//! the rest of the batch still runs. The worst outcome is that a stale
//! session stays open until the next pass.

use std::time::Duration as StdDuration;

use chrono::NaiveDate;

use crate::day_boundary::{DayBoundary, DayBoundaryError};
use crate::store::{ActiveSession, CloseOutcome, StoreError, StudyStore};
use crate::types::{DbId, Timestamp, UserId};

/// Sessions silent for longer than this are considered abandoned.
pub const DEFAULT_IDLE_THRESHOLD_SECS: i64 = 120;

/// Attempts per session before a transient failure is reported.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Pause between attempts on the same session.
pub const DEFAULT_RETRY_DELAY: StdDuration = StdDuration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub idle_threshold: chrono::Duration,
    pub max_attempts: u32,
    pub retry_delay: StdDuration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            idle_threshold: chrono::Duration::seconds(DEFAULT_IDLE_THRESHOLD_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Errors that abort a whole pass. Per-session failures never do.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Failed to list sessions: {0}")]
    Listing(#[from] StoreError),

    #[error(transparent)]
    DayBoundary(#[from] DayBoundaryError),
}

/// What happened to one session during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Reconciled {
        session_id: DbId,
        user_id: UserId,
        duration_seconds: i64,
        day: NaiveDate,
        total_seconds: i64,
    },
    /// Closed concurrently by another pass or an explicit stop.
    AlreadyClosed { session_id: DbId },
    Failed {
        session_id: DbId,
        error: StoreError,
        attempts: u32,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub outcomes: Vec<SessionOutcome>,
}

impl ReconcileReport {
    pub fn reconciled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SessionOutcome::Reconciled { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SessionOutcome::AlreadyClosed { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SessionOutcome::Failed { .. }))
            .count()
    }

    /// Seconds credited to daily totals by this pass.
    pub fn credited_seconds(&self) -> i64 {
        self.outcomes
            .iter()
            .map(|o| match o {
                SessionOutcome::Reconciled {
                    duration_seconds, ..
                } => *duration_seconds,
                _ => 0,
            })
            .sum()
    }
}

/// Whole seconds between `started_at` and `now`, floored, never negative.
pub fn elapsed_seconds(started_at: Timestamp, now: Timestamp) -> i64 {
    (now - started_at).num_seconds().max(0)
}

/// A session closed by [`finalize_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finalized {
    pub duration_seconds: i64,
    pub outcome: CloseOutcome,
}

/// Close one session at `now` and credit its elapsed time to `day`.
///
/// Shared by the reconciliation passes and by an explicit user stop, so all
/// three close sessions the same way.
pub async fn finalize_session<S: StudyStore + ?Sized>(
    store: &S,
    session: &ActiveSession,
    now: Timestamp,
    day: NaiveDate,
) -> Result<Finalized, StoreError> {
    let duration_seconds = elapsed_seconds(session.started_at, now);
    let outcome = store
        .close_and_credit(session, now, duration_seconds, day)
        .await?;
    Ok(Finalized {
        duration_seconds,
        outcome,
    })
}

/// One reconciliation pass over a borrowed store handle.
pub struct Reconciler<'a, S: StudyStore + ?Sized> {
    store: &'a S,
    boundary: &'a DayBoundary,
    config: &'a ReconcilerConfig,
}

impl<'a, S: StudyStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a S, boundary: &'a DayBoundary, config: &'a ReconcilerConfig) -> Self {
        Self {
            store,
            boundary,
            config,
        }
    }

    /// Close every session idle longer than the threshold, crediting the
    /// civil day of `now`.
    pub async fn reconcile_stale(&self, now: Timestamp) -> Result<ReconcileReport, ReconcileError> {
        let sessions = self
            .store
            .find_stale_active_sessions(now, self.config.idle_threshold)
            .await?;
        let day = self.boundary.civil_day(now);

        let report = self.reconcile_batch(&sessions, now, day).await;
        log_report("stale sweep", &report, day);
        Ok(report)
    }

    /// Close every active session, crediting the civil day before `now`.
    ///
    /// Meant to run shortly after local midnight so that sessions left
    /// running overnight count toward the day that just ended.
    pub async fn finalize_all_active(
        &self,
        now: Timestamp,
    ) -> Result<ReconcileReport, ReconcileError> {
        let day = self.boundary.shift_day(self.boundary.civil_day(now), -1)?;
        let sessions = self.store.find_active_sessions().await?;

        let report = self.reconcile_batch(&sessions, now, day).await;
        log_report("midnight reset", &report, day);
        Ok(report)
    }

    async fn reconcile_batch(
        &self,
        sessions: &[ActiveSession],
        now: Timestamp,
        day: NaiveDate,
    ) -> ReconcileReport {
        let mut outcomes = Vec::with_capacity(sessions.len());
        for session in sessions {
            outcomes.push(self.reconcile_one(session, now, day).await);
        }
        ReconcileReport { outcomes }
    }

    async fn reconcile_one(
        &self,
        session: &ActiveSession,
        now: Timestamp,
        day: NaiveDate,
    ) -> SessionOutcome {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match finalize_session(self.store, session, now, day).await {
                Ok(Finalized {
                    duration_seconds,
                    outcome: CloseOutcome::Credited(total),
                }) => {
                    tracing::debug!(
                        session_id = session.id,
                        user_id = %session.user_id,
                        duration_seconds,
                        %day,
                        "Reconciled stale session"
                    );
                    return SessionOutcome::Reconciled {
                        session_id: session.id,
                        user_id: session.user_id,
                        duration_seconds,
                        day,
                        total_seconds: total.total_seconds,
                    };
                }
                Ok(Finalized {
                    outcome: CloseOutcome::AlreadyClosed,
                    ..
                }) => {
                    tracing::debug!(session_id = session.id, "Session already closed, skipping");
                    return SessionOutcome::AlreadyClosed {
                        session_id: session.id,
                    };
                }
                Err(error) if error.is_transient() && attempts < max_attempts => {
                    tracing::warn!(
                        session_id = session.id,
                        attempt = attempts,
                        error = %error,
                        "Transient failure reconciling session, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(error) => {
                    tracing::warn!(
                        session_id = session.id,
                        attempts,
                        error = %error,
                        "Failed to reconcile session"
                    );
                    return SessionOutcome::Failed {
                        session_id: session.id,
                        error,
                        attempts,
                    };
                }
            }
        }
    }
}

fn log_report(pass: &str, report: &ReconcileReport, day: NaiveDate) {
    if report.outcomes.is_empty() {
        tracing::debug!(pass, "No sessions to reconcile");
        return;
    }
    tracing::info!(
        pass,
        %day,
        reconciled = report.reconciled_count(),
        skipped = report.skipped_count(),
        failed = report.failed_count(),
        credited_seconds = report.credited_seconds(),
        "Reconciliation pass finished"
    );
}
