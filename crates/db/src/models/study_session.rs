//! Study session model and DTOs.

use rally_core::store::ActiveSession;
use rally_core::types::{DbId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A row from the `study_sessions` table.
///
/// `ended_at` and `duration_seconds` are `None` exactly while `is_active`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StudySession {
    pub id: DbId,
    pub user_id: UserId,
    pub class_id: Option<Uuid>,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub duration_seconds: Option<i64>,
    pub is_active: bool,
    pub last_heartbeat_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl StudySession {
    /// The reconciler's view of this row.
    pub fn to_active(&self) -> ActiveSession {
        ActiveSession {
            id: self.id,
            user_id: self.user_id,
            started_at: self.started_at,
            last_heartbeat_at: self.last_heartbeat_at,
        }
    }
}

/// DTO for starting a new session.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStudySession {
    pub user_id: UserId,
    pub class_id: Option<Uuid>,
    pub started_at: Timestamp,
}

/// Liveness projection used by the stale-session queries.
#[derive(Debug, Clone, FromRow)]
pub struct ActiveSessionRow {
    pub id: DbId,
    pub user_id: UserId,
    pub started_at: Timestamp,
    pub last_heartbeat_at: Option<Timestamp>,
}

impl From<ActiveSessionRow> for ActiveSession {
    fn from(row: ActiveSessionRow) -> Self {
        ActiveSession {
            id: row.id,
            user_id: row.user_id,
            started_at: row.started_at,
            last_heartbeat_at: row.last_heartbeat_at,
        }
    }
}
