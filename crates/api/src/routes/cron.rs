use axum::routing::get;
use axum::Router;

use crate::handlers::cron;
use crate::state::AppState;

/// Scheduler routes mounted at `/cron`. Scheduled callers issue plain GETs.
///
/// ```text
/// GET /cleanup-stale-timers  -> cleanup_stale_timers
/// GET /midnight-reset        -> midnight_reset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/cleanup-stale-timers", get(cron::cleanup_stale_timers))
        .route("/midnight-reset", get(cron::midnight_reset))
}
