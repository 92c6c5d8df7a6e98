//! Route definitions for study totals.
//!
//! Two routers are provided:
//! - `stats_router()` for the caller's own totals mounted at `/stats`
//! - `leaderboard_router()` for public boards mounted at `/leaderboards`

use axum::routing::{get, put};
use axum::Router;

use crate::handlers::stats;
use crate::state::AppState;

/// ```text
/// GET /me             -> my_stats
/// PUT /me/visibility  -> update_visibility
/// ```
pub fn stats_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(stats::my_stats))
        .route("/me/visibility", put(stats::update_visibility))
}

/// ```text
/// GET /daily  -> daily_leaderboard
/// ```
pub fn leaderboard_router() -> Router<AppState> {
    Router::new().route("/daily", get(stats::daily_leaderboard))
}
