//! Handlers for the study timer lifecycle.
//!
//! A user has at most one running session. Stopping credits the elapsed time
//! to today's civil day in the configured zone; sessions that stop sending
//! heartbeats are closed by the reconciliation passes instead.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use rally_core::error::CoreError;
use rally_core::reconcile::{elapsed_seconds, finalize_session, Finalized, Reconciler};
use rally_core::store::CloseOutcome;
use rally_core::types::{DbId, Timestamp};
use rally_db::models::study_session::CreateStudySession;
use rally_db::repositories::{DailyStatRepo, StudySessionRepo};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now, SweepSummary};
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::throttle::ThrottledUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /timer/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartTimerRequest {
    #[serde(default)]
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TimerStarted {
    pub session_id: DbId,
    pub started_at: Timestamp,
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TimerStopped {
    pub session_id: DbId,
    pub duration_seconds: i64,
    pub day: NaiveDate,
    pub total_seconds_today: i64,
}

#[derive(Debug, Serialize)]
pub struct HeartbeatAck {
    /// Whether the caller had a running session to refresh.
    pub active: bool,
    pub timestamp: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct TimerStatus {
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<DbId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<Timestamp>,
    /// Seconds elapsed on the running session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_duration: Option<i64>,
    /// Seconds already credited to today, not counting the running session.
    pub total_seconds_today: i64,
}

/// POST /api/v1/timer/start
///
/// Start a session for the caller. Returns 409 if one is already running.
/// The body is optional; without one the session has no class.
pub async fn start_timer(
    ThrottledUser(user): ThrottledUser,
    State(state): State<AppState>,
    input: Option<Json<StartTimerRequest>>,
) -> AppResult<impl IntoResponse> {
    let input = input.map(|Json(body)| body).unwrap_or_default();

    if StudySessionRepo::find_active_for_user(&state.pool, user.user_id)
        .await?
        .is_some()
    {
        return Err(AppError::Core(CoreError::Conflict(
            "A timer is already running".to_string(),
        )));
    }

    // The unique partial index still rejects a concurrent start with a 409.
    let session = StudySessionRepo::create(
        &state.pool,
        &CreateStudySession {
            user_id: user.user_id,
            class_id: input.class_id,
            started_at: now(),
        },
    )
    .await?;

    tracing::info!(
        session_id = session.id,
        user_id = %user.user_id,
        "Study timer started",
    );

    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: TimerStarted {
                session_id: session.id,
                started_at: session.started_at,
                class_id: session.class_id,
            },
        }),
    ))
}

/// POST /api/v1/timer/stop
///
/// Stop the caller's running session and credit it to today.
pub async fn stop_timer(
    ThrottledUser(user): ThrottledUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let session = StudySessionRepo::find_active_for_user(&state.pool, user.user_id)
        .await?
        .ok_or_else(no_active_timer)?;

    let now = now();
    let day = state.config.study.boundary.civil_day(now);
    let store = state.study_store();

    let Finalized {
        duration_seconds,
        outcome,
    } = finalize_session(&store, &session.to_active(), now, day).await?;

    // A sweep may have closed the session between the lookup and the close.
    let CloseOutcome::Credited(total) = outcome else {
        return Err(no_active_timer());
    };

    tracing::info!(
        session_id = session.id,
        user_id = %user.user_id,
        duration_seconds,
        %day,
        "Study timer stopped",
    );

    Ok(Json(DataResponse {
        data: TimerStopped {
            session_id: session.id,
            duration_seconds,
            day,
            total_seconds_today: total.total_seconds,
        },
    }))
}

/// POST /api/v1/timer/heartbeat
///
/// Mark the caller's running session as alive.
pub async fn heartbeat(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let now = now();
    let session = StudySessionRepo::touch_heartbeat(&state.pool, user.user_id, now).await?;

    Ok(Json(DataResponse {
        data: HeartbeatAck {
            active: session.is_some(),
            timestamp: now,
        },
    }))
}

/// GET /api/v1/timer/status
pub async fn timer_status(
    user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let now = now();
    let today = state.config.study.boundary.civil_day(now);

    let session = StudySessionRepo::find_active_for_user(&state.pool, user.user_id).await?;
    let total_seconds_today = DailyStatRepo::find(&state.pool, user.user_id, today)
        .await?
        .map_or(0, |stat| stat.total_seconds);

    Ok(Json(DataResponse {
        data: TimerStatus {
            is_active: session.is_some(),
            session_id: session.as_ref().map(|s| s.id),
            started_at: session.as_ref().map(|s| s.started_at),
            current_duration: session
                .as_ref()
                .map(|s| elapsed_seconds(s.started_at, now)),
            total_seconds_today,
        },
    }))
}

/// POST /api/v1/timer/cleanup
///
/// Run one stale-session pass on behalf of any signed-in client.
pub async fn cleanup_stale(
    _user: AuthUser,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let now = now();
    let store = state.study_store();
    let study = &state.config.study;

    let report = Reconciler::new(&store, &study.boundary, &study.reconciler)
        .reconcile_stale(now)
        .await?;

    Ok(Json(DataResponse {
        data: SweepSummary::from_report(&report, now),
    }))
}

fn no_active_timer() -> AppError {
    AppError::BadRequest("No active timer".to_string())
}
