//! Per-user, per-civil-day study totals.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rally_core::store::DailyTotal;
use rally_core::types::{DbId, Timestamp, UserId};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `daily_stats` table. Unique on `(user_id, day)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DailyStat {
    pub id: DbId,
    pub user_id: UserId,
    pub day: NaiveDate,
    pub total_seconds: i64,
    pub is_public: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<DailyStat> for DailyTotal {
    fn from(stat: DailyStat) -> Self {
        DailyTotal {
            user_id: stat.user_id,
            day: stat.day,
            total_seconds: stat.total_seconds,
            is_public: stat.is_public,
        }
    }
}

/// One ranked entry of a daily leaderboard.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user_id: UserId,
    pub total_seconds: i64,
}

impl LeaderboardEntry {
    /// Cursor that resumes a board right after this entry.
    pub fn cursor(&self) -> LeaderboardCursor {
        LeaderboardCursor {
            total_seconds: self.total_seconds,
            user_id: self.user_id,
        }
    }
}

/// Keyset position on a daily board ordered by `(total_seconds DESC, user_id)`.
///
/// Rendered as `<total_seconds>:<user_id>` in query strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderboardCursor {
    pub total_seconds: i64,
    pub user_id: UserId,
}

impl fmt::Display for LeaderboardCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.total_seconds, self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid leaderboard cursor: {0}")]
pub struct InvalidCursor(pub String);

impl FromStr for LeaderboardCursor {
    type Err = InvalidCursor;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidCursor(s.to_string());
        let (total, user) = s.split_once(':').ok_or_else(invalid)?;
        let total_seconds = total.parse::<i64>().map_err(|_| invalid())?;
        let user_id = user.parse::<UserId>().map_err(|_| invalid())?;
        if total_seconds < 0 {
            return Err(invalid());
        }
        Ok(Self {
            total_seconds,
            user_id,
        })
    }
}
