//! Scheduler-triggered reconciliation passes.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use rally_core::reconcile::Reconciler;

use super::{now, SweepSummary};
use crate::error::AppResult;
use crate::middleware::cron::RequireCron;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/cron/cleanup-stale-timers
///
/// Close sessions whose heartbeat went quiet and credit them to today.
pub async fn cleanup_stale_timers(
    _cron: RequireCron,
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

/// GET /api/v1/cron/midnight-reset
///
/// Close every running session and credit it to the day that just ended.
/// Scheduled shortly after local midnight.
pub async fn midnight_reset(
    _cron: RequireCron,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let now = now();
    let store = state.study_store();
    let study = &state.config.study;

    let report = Reconciler::new(&store, &study.boundary, &study.reconciler)
        .finalize_all_active(now)
        .await?;

    Ok(Json(DataResponse {
        data: SweepSummary::from_report(&report, now),
    }))
}
