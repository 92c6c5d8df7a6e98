//! Per-user throttle on timer state changes.
//!
//! A double-clicked start or stop should not race itself through the
//! database. Each user may hit a given timer route once per interval;
//! anything faster is answered with 429.

use std::time::{Duration, Instant};

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rally_core::types::UserId;

use super::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

/// Above this many tracked keys, expired ones are dropped before inserting.
const PRUNE_THRESHOLD: usize = 10_000;

/// Last accepted request per `(user, route)`.
#[derive(Debug)]
pub struct TimerThrottle {
    last_accepted: DashMap<(UserId, String), Instant>,
    min_interval: Duration,
}

impl TimerThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_accepted: DashMap::new(),
            min_interval,
        }
    }

    /// Record a request at `now`. Returns `false` when the previous accepted
    /// request for the same key is less than the interval old.
    pub fn try_acquire(&self, user_id: UserId, route: &str, now: Instant) -> bool {
        if self.last_accepted.len() > PRUNE_THRESHOLD {
            self.prune(now);
        }

        match self.last_accepted.entry((user_id, route.to_string())) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < self.min_interval {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    fn prune(&self, now: Instant) {
        self.last_accepted
            .retain(|_, at| now.saturating_duration_since(*at) < self.min_interval);
    }
}

/// An [`AuthUser`] that passed the timer throttle for this route.
#[derive(Debug, Clone)]
pub struct ThrottledUser(pub AuthUser);

impl FromRequestParts<AppState> for ThrottledUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;

        if !state
            .timer_throttle
            .try_acquire(user.user_id, parts.uri.path(), Instant::now())
        {
            tracing::debug!(user_id = %user.user_id, route = parts.uri.path(), "Timer request throttled");
            return Err(AppError::RateLimited(
                "Too many timer requests. Please wait a second.".to_string(),
            ));
        }

        Ok(ThrottledUser(user))
    }
}
