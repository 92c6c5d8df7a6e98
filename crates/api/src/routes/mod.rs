pub mod cron;
pub mod health;
pub mod stats;
pub mod timer;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /timer/start                        start a session (POST)
/// /timer/stop                         stop and credit today (POST)
/// /timer/heartbeat                    liveness signal (POST)
/// /timer/status                       running session and today's total
/// /timer/cleanup                      stale pass on behalf of a client (POST)
///
/// /cron/cleanup-stale-timers          stale pass (cron secret)
/// /cron/midnight-reset                close all, credit yesterday (cron secret)
///
/// /stats/me                           caller's recent daily totals
/// /stats/me/visibility                show or hide caller's totals (PUT)
///
/// /leaderboards/daily                 today's public board
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/timer", timer::router())
        .nest("/cron", cron::router())
        .nest("/stats", stats::stats_router())
        .nest("/leaderboards", stats::leaderboard_router())
}
