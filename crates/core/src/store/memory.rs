//! In-memory [`StudyStore`] for unit tests, with failure injection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    ActiveSession, CloseOutcome, DailyTotal, StoreError, StudyStore, DEFAULT_STAT_VISIBILITY,
};
use crate::types::{DbId, Timestamp, UserId};

#[derive(Debug, Clone)]
pub(crate) struct StoredSession {
    pub user_id: UserId,
    pub started_at: Timestamp,
    pub last_heartbeat_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_seconds: Option<i64>,
    pub is_active: bool,
}

#[derive(Default)]
struct State {
    next_id: DbId,
    sessions: BTreeMap<DbId, StoredSession>,
    stats: BTreeMap<(UserId, NaiveDate), DailyTotal>,
    close_failures: HashMap<DbId, VecDeque<StoreError>>,
    credit_failures: VecDeque<StoreError>,
    listing_failure: Option<StoreError>,
    write_calls: usize,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn insert_session(
        &self,
        user_id: UserId,
        started_at: Timestamp,
        last_heartbeat_at: Option<Timestamp>,
    ) -> DbId {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.sessions.insert(
            id,
            StoredSession {
                user_id,
                started_at,
                last_heartbeat_at,
                ended_at: None,
                duration_seconds: None,
                is_active: true,
            },
        );
        id
    }

    pub fn session(&self, id: DbId) -> StoredSession {
        self.state.lock().unwrap().sessions[&id].clone()
    }

    pub fn active_session(&self, id: DbId) -> ActiveSession {
        let s = self.session(id);
        ActiveSession {
            id,
            user_id: s.user_id,
            started_at: s.started_at,
            last_heartbeat_at: s.last_heartbeat_at,
        }
    }

    pub fn stat(&self, user_id: UserId, day: NaiveDate) -> Option<DailyTotal> {
        self.state.lock().unwrap().stats.get(&(user_id, day)).cloned()
    }

    pub fn stat_rows(&self) -> usize {
        self.state.lock().unwrap().stats.len()
    }

    pub fn write_calls(&self) -> usize {
        self.state.lock().unwrap().write_calls
    }

    /// Queue errors returned by the next `close_session` calls for `id`.
    pub fn fail_close(&self, id: DbId, errors: Vec<StoreError>) {
        self.state
            .lock()
            .unwrap()
            .close_failures
            .insert(id, errors.into());
    }

    /// Queue errors returned by the next credits, after the close succeeded.
    pub fn fail_credit(&self, errors: Vec<StoreError>) {
        self.state
            .lock()
            .unwrap()
            .credit_failures
            .extend(errors);
    }

    pub fn fail_listing(&self, error: StoreError) {
        self.state.lock().unwrap().listing_failure = Some(error);
    }

    fn credit(
        state: &mut State,
        user_id: UserId,
        day: NaiveDate,
        increment_seconds: i64,
        default_public: bool,
    ) -> DailyTotal {
        state.write_calls += 1;
        state
            .stats
            .entry((user_id, day))
            .and_modify(|t| t.total_seconds += increment_seconds)
            .or_insert(DailyTotal {
                user_id,
                day,
                total_seconds: increment_seconds,
                is_public: default_public,
            })
            .clone()
    }

    fn active(state: &State, filter: impl Fn(&StoredSession) -> bool) -> Vec<ActiveSession> {
        state
            .sessions
            .iter()
            .filter(|(_, s)| s.is_active && filter(s))
            .map(|(id, s)| ActiveSession {
                id: *id,
                user_id: s.user_id,
                started_at: s.started_at,
                last_heartbeat_at: s.last_heartbeat_at,
            })
            .collect()
    }
}

#[async_trait]
impl StudyStore for MemoryStore {
    async fn find_stale_active_sessions(
        &self,
        now: Timestamp,
        idle_threshold: chrono::Duration,
    ) -> Result<Vec<ActiveSession>, StoreError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.listing_failure {
            return Err(err.clone());
        }
        let cutoff = now - idle_threshold;
        Ok(Self::active(&state, |s| {
            s.last_heartbeat_at.unwrap_or(s.started_at) < cutoff
        }))
    }

    async fn find_active_sessions(&self) -> Result<Vec<ActiveSession>, StoreError> {
        let state = self.state.lock().unwrap();
        if let Some(err) = &state.listing_failure {
            return Err(err.clone());
        }
        Ok(Self::active(&state, |_| true))
    }

    async fn close_session(
        &self,
        session_id: DbId,
        ended_at: Timestamp,
        duration_seconds: i64,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state
            .close_failures
            .get_mut(&session_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        state.write_calls += 1;
        match state.sessions.get_mut(&session_id) {
            Some(s) if s.is_active => {
                s.is_active = false;
                s.ended_at = Some(ended_at);
                s.duration_seconds = Some(duration_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_daily_stat(
        &self,
        user_id: UserId,
        day: NaiveDate,
        increment_seconds: i64,
        default_public: bool,
    ) -> Result<DailyTotal, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.credit_failures.pop_front() {
            return Err(err);
        }
        Ok(Self::credit(
            &mut state,
            user_id,
            day,
            increment_seconds,
            default_public,
        ))
    }

    /// Both writes happen under one lock; an injected failure on either
    /// leaves the session untouched.
    async fn close_and_credit(
        &self,
        session: &ActiveSession,
        ended_at: Timestamp,
        duration_seconds: i64,
        day: NaiveDate,
    ) -> Result<CloseOutcome, StoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state
            .close_failures
            .get_mut(&session.id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }
        if !state.sessions.get(&session.id).is_some_and(|s| s.is_active) {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        if let Some(err) = state.credit_failures.pop_front() {
            return Err(err);
        }

        state.write_calls += 1;
        if let Some(s) = state.sessions.get_mut(&session.id) {
            s.is_active = false;
            s.ended_at = Some(ended_at);
            s.duration_seconds = Some(duration_seconds);
        }
        let total = Self::credit(
            &mut state,
            session.user_id,
            day,
            duration_seconds,
            DEFAULT_STAT_VISIBILITY,
        );
        Ok(CloseOutcome::Credited(total))
    }
}
