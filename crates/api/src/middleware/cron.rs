//! Shared-secret guard for scheduler-triggered endpoints.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use rally_core::error::CoreError;

use super::auth::bearer_token;
use crate::error::AppError;
use crate::state::AppState;

/// Admits a request carrying `Authorization: Bearer <CRON_SECRET>`.
///
/// When no secret is configured every request is admitted.
#[derive(Debug, Clone, Copy)]
pub struct RequireCron;

impl FromRequestParts<AppState> for RequireCron {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.config.cron_secret.as_deref() else {
            return Ok(RequireCron);
        };

        let token = bearer_token(parts)?;
        if !constant_time_eq(token.as_bytes(), secret.as_bytes()) {
            return Err(AppError::Core(CoreError::Unauthorized(
                "Invalid cron secret".into(),
            )));
        }
        Ok(RequireCron)
    }
}

/// Byte comparison whose running time does not depend on where the inputs
/// first differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
