use axum::routing::{get, post};
use axum::Router;

use crate::handlers::timer;
use crate::state::AppState;

/// Timer routes mounted at `/timer`.
///
/// ```text
/// POST /start      -> start_timer
/// POST /stop       -> stop_timer
/// POST /heartbeat  -> heartbeat
/// GET  /status     -> timer_status
/// POST /cleanup    -> cleanup_stale
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start", post(timer::start_timer))
        .route("/stop", post(timer::stop_timer))
        .route("/heartbeat", post(timer::heartbeat))
        .route("/status", get(timer::timer_status))
        .route("/cleanup", post(timer::cleanup_stale))
}
