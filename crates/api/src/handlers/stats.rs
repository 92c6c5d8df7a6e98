//! Handlers for per-user daily totals and the public daily leaderboard.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use rally_core::store::DailyTotal;
use rally_core::types::UserId;
use rally_db::models::daily_stat::{LeaderboardCursor, LeaderboardEntry};
use rally_db::repositories::DailyStatRepo;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::now;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_HISTORY_DAYS: i64 = 7;
const DEFAULT_LEADERBOARD_LIMIT: i64 = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct HistoryParams {
    #[validate(range(min = 1, max = 90))]
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LeaderboardParams {
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
    /// `next_cursor` from the previous page.
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisibility {
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
pub struct VisibilityUpdated {
    pub is_public: bool,
    /// Number of daily totals whose visibility changed.
    pub updated: u64,
}

/// The caller's own standing on a daily board.
#[derive(Debug, Serialize)]
pub struct OwnStanding {
    pub rank: i64,
    pub total_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct DailyLeaderboard {
    pub day: NaiveDate,
    pub entries: Vec<LeaderboardEntry>,
    /// Present only on the first page, and only when the caller has a
    /// public, non-zero total today.
    pub me: Option<OwnStanding>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

/// GET /api/v1/stats/me?days=N
///
/// The caller's totals for the last `days` civil days (today included),
/// newest first. Days without study time are omitted.
pub async fn my_stats(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> AppResult<impl IntoResponse> {
    params.validate()?;
    let days = params.days.unwrap_or(DEFAULT_HISTORY_DAYS);

    let boundary = &state.config.study.boundary;
    let today = boundary.civil_day(now());
    let since = boundary.shift_day(today, 1 - days)?;

    let totals: Vec<DailyTotal> = DailyStatRepo::list_since(&state.pool, user.user_id, since)
        .await?
        .into_iter()
        .map(DailyTotal::from)
        .collect();

    Ok(Json(DataResponse { data: totals }))
}

/// PUT /api/v1/stats/me/visibility
///
/// Show or hide all of the caller's totals on the public leaderboards. The
/// choice is stored and also applies to days credited later.
pub async fn update_visibility(
    user: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<UpdateVisibility>,
) -> AppResult<impl IntoResponse> {
    let updated = DailyStatRepo::set_visibility(&state.pool, user.user_id, input.is_public).await?;

    tracing::info!(
        user_id = %user.user_id,
        is_public = input.is_public,
        updated,
        "Stat visibility updated",
    );

    Ok(Json(DataResponse {
        data: VisibilityUpdated {
            is_public: input.is_public,
            updated,
        },
    }))
}

/// GET /api/v1/leaderboards/daily?limit=N
///
/// Today's public board, one page at a time, plus the caller's own rank.
pub async fn daily_leaderboard(
    user: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> AppResult<impl IntoResponse> {
    params.validate()?;
    let limit = params.limit.unwrap_or(DEFAULT_LEADERBOARD_LIMIT);
    let after = params
        .cursor
        .as_deref()
        .map(str::parse::<LeaderboardCursor>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let today = state.config.study.boundary.civil_day(now());

    // One extra row tells whether another page exists.
    let mut entries =
        DailyStatRepo::leaderboard(&state.pool, today, limit + 1, after.as_ref()).await?;
    let has_more = entries.len() as i64 > limit;
    entries.truncate(limit as usize);
    let next_cursor = has_more
        .then(|| entries.last().map(|e| e.cursor().to_string()))
        .flatten();

    let me = match after {
        None => own_standing(&state, user.user_id, today).await?,
        Some(_) => None,
    };

    Ok(Json(DataResponse {
        data: DailyLeaderboard {
            day: today,
            entries,
            me,
            has_more,
            next_cursor,
        },
    }))
}

async fn own_standing(
    state: &AppState,
    user_id: UserId,
    day: NaiveDate,
) -> AppResult<Option<OwnStanding>> {
    let Some(stat) = DailyStatRepo::find(&state.pool, user_id, day).await? else {
        return Ok(None);
    };
    if !stat.is_public || stat.total_seconds <= 0 {
        return Ok(None);
    }

    let rank = DailyStatRepo::rank_of(&state.pool, day, stat.total_seconds).await?;
    Ok(Some(OwnStanding {
        rank,
        total_seconds: stat.total_seconds,
    }))
}
