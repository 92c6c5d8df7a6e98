//! Repository for the `daily_stats` table.

use chrono::NaiveDate;
use rally_core::types::UserId;
use sqlx::PgPool;

use crate::models::daily_stat::{DailyStat, LeaderboardCursor, LeaderboardEntry};

/// Column list shared across queries to avoid repetition.
pub(crate) const COLUMNS: &str =
    "id, user_id, day, total_seconds, is_public, created_at, updated_at";

/// Create-or-add on the `(user_id, day)` key. The addition happens inside
/// Postgres so concurrent credits cannot lose an update. A new row takes the
/// user's saved visibility, falling back to `$4`.
pub(crate) fn upsert_increment_query() -> String {
    format!(
        "INSERT INTO daily_stats (user_id, day, total_seconds, is_public) \
         VALUES ($1, $2, $3, COALESCE( \
            (SELECT p.is_public FROM user_stat_preferences p WHERE p.user_id = $1), $4)) \
         ON CONFLICT (user_id, day) DO UPDATE SET \
            total_seconds = daily_stats.total_seconds + EXCLUDED.total_seconds, \
            updated_at = NOW() \
         RETURNING {COLUMNS}"
    )
}

/// Provides query operations for daily study totals.
pub struct DailyStatRepo;

impl DailyStatRepo {
    /// Add `increment_seconds` to the user's total for `day`, creating the
    /// row with `default_public` visibility if it does not exist yet.
    pub async fn upsert_increment(
        pool: &PgPool,
        user_id: UserId,
        day: NaiveDate,
        increment_seconds: i64,
        default_public: bool,
    ) -> Result<DailyStat, sqlx::Error> {
        sqlx::query_as::<_, DailyStat>(&upsert_increment_query())
            .bind(user_id)
            .bind(day)
            .bind(increment_seconds)
            .bind(default_public)
            .fetch_one(pool)
            .await
    }

    pub async fn find(
        pool: &PgPool,
        user_id: UserId,
        day: NaiveDate,
    ) -> Result<Option<DailyStat>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM daily_stats WHERE user_id = $1 AND day = $2");
        sqlx::query_as::<_, DailyStat>(&query)
            .bind(user_id)
            .bind(day)
            .fetch_optional(pool)
            .await
    }

    /// A user's totals from `since` (inclusive) onward, newest first.
    pub async fn list_since(
        pool: &PgPool,
        user_id: UserId,
        since: NaiveDate,
    ) -> Result<Vec<DailyStat>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM daily_stats \
             WHERE user_id = $1 AND day >= $2 \
             ORDER BY day DESC"
        );
        sqlx::query_as::<_, DailyStat>(&query)
            .bind(user_id)
            .bind(since)
            .fetch_all(pool)
            .await
    }

    /// Save a user's visibility preference and apply it to every daily total
    /// they already have. Totals created later inherit it.
    ///
    /// Returns the number of existing totals whose visibility changed.
    pub async fn set_visibility(
        pool: &PgPool,
        user_id: UserId,
        is_public: bool,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO user_stat_preferences (user_id, is_public) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET \
                is_public = EXCLUDED.is_public, updated_at = NOW()",
        )
        .bind(user_id)
        .bind(is_public)
        .execute(&mut *tx)
        .await?;

        let result = sqlx::query(
            "UPDATE daily_stats SET is_public = $2, updated_at = NOW() \
             WHERE user_id = $1 AND is_public <> $2",
        )
        .bind(user_id)
        .bind(is_public)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// The user's saved visibility, if they ever set one.
    pub async fn visibility_preference(
        pool: &PgPool,
        user_id: UserId,
    ) -> Result<Option<bool>, sqlx::Error> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT is_public FROM user_stat_preferences WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|r| r.0))
    }

    /// One page of the public, non-zero totals for `day`, highest first.
    ///
    /// Ties share a rank (computed over the whole board, so ranks match
    /// [`DailyStatRepo::rank_of`] on every page) and are ordered by user id.
    /// `after` continues from the last entry of the previous page.
    pub async fn leaderboard(
        pool: &PgPool,
        day: NaiveDate,
        limit: i64,
        after: Option<&LeaderboardCursor>,
    ) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardEntry>(
            "SELECT rank, user_id, total_seconds FROM ( \
                SELECT RANK() OVER (ORDER BY total_seconds DESC) AS rank, \
                       user_id, total_seconds \
                FROM daily_stats \
                WHERE day = $1 AND is_public AND total_seconds > 0 \
             ) ranked \
             WHERE $3::BIGINT IS NULL \
                OR total_seconds < $3 \
                OR (total_seconds = $3 AND user_id > $4::UUID) \
             ORDER BY total_seconds DESC, user_id \
             LIMIT $2",
        )
        .bind(day)
        .bind(limit)
        .bind(after.map(|c| c.total_seconds))
        .bind(after.map(|c| c.user_id))
        .fetch_all(pool)
        .await
    }

    /// Rank a total would hold on the public board for `day`: one more than
    /// the number of strictly greater public totals.
    pub async fn rank_of(
        pool: &PgPool,
        day: NaiveDate,
        total_seconds: i64,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) + 1 FROM daily_stats \
             WHERE day = $1 AND is_public AND total_seconds > $2",
        )
        .bind(day)
        .bind(total_seconds)
        .fetch_one(pool)
        .await?;
        Ok(row.0)
    }
}
