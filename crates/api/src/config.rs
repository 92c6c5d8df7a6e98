use std::time::Duration;

use rally_core::day_boundary::DayBoundary;
use rally_core::reconcile::{
    ReconcilerConfig, DEFAULT_IDLE_THRESHOLD_SECS, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY,
};

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Access-token verification settings for the auth provider.
    pub jwt: JwtConfig,
    /// Shared secret expected as `Authorization: Bearer <secret>` on cron
    /// endpoints. When unset the cron endpoints are open.
    pub cron_secret: Option<String>,
    /// Minimum spacing per user between timer starts (and between stops),
    /// in milliseconds (default: `1000`).
    pub timer_min_interval_ms: u64,
    /// Study-time bucketing and reconciliation settings.
    pub study: StudyConfig,
}

/// Settings for day bucketing and idle-session reconciliation.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Zone whose calendar days study time is credited to.
    pub boundary: DayBoundary,
    /// Idle threshold and retry policy for reconciliation passes.
    pub reconciler: ReconcilerConfig,
    /// Seconds between background sweeps; `0` disables the background task.
    pub sweep_interval_secs: u64,
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            boundary: DayBoundary::default(),
            reconciler: ReconcilerConfig::default(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

/// Default background sweep cadence.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `CRON_SECRET`          | unset                      |
    /// | `TIMER_MIN_INTERVAL_MS`| `1000`                     |
    ///
    /// See [`JwtConfig::from_env`] and [`StudyConfig::from_env`] for the rest.
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let cron_secret = std::env::var("CRON_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let timer_min_interval_ms: u64 = std::env::var("TIMER_MIN_INTERVAL_MS")
            .unwrap_or_else(|_| "1000".into())
            .parse()
            .expect("TIMER_MIN_INTERVAL_MS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
            cron_secret,
            timer_min_interval_ms,
            study: StudyConfig::from_env(),
        }
    }
}

impl StudyConfig {
    /// Load study settings from environment variables.
    ///
    /// | Env Var                     | Default            |
    /// |-----------------------------|--------------------|
    /// | `STUDY_TIME_ZONE`           | `America/New_York` |
    /// | `STUDY_IDLE_THRESHOLD_SECS` | `120`              |
    /// | `STUDY_MAX_ATTEMPTS`        | `3`                |
    /// | `SWEEP_INTERVAL_SECS`       | `60`               |
    ///
    /// # Panics
    ///
    /// Panics on an unknown time zone or unparseable numbers, so a
    /// misconfigured zone can never silently bucket study time in UTC.
    pub fn from_env() -> Self {
        let boundary = match std::env::var("STUDY_TIME_ZONE") {
            Ok(name) => DayBoundary::from_zone_name(name.trim())
                .unwrap_or_else(|e| panic!("STUDY_TIME_ZONE is invalid: {e}")),
            Err(_) => DayBoundary::default(),
        };

        let idle_threshold_secs: i64 = std::env::var("STUDY_IDLE_THRESHOLD_SECS")
            .unwrap_or_else(|_| DEFAULT_IDLE_THRESHOLD_SECS.to_string())
            .parse()
            .expect("STUDY_IDLE_THRESHOLD_SECS must be a valid i64");
        assert!(
            idle_threshold_secs > 0,
            "STUDY_IDLE_THRESHOLD_SECS must be positive"
        );

        let max_attempts: u32 = std::env::var("STUDY_MAX_ATTEMPTS")
            .unwrap_or_else(|_| DEFAULT_MAX_ATTEMPTS.to_string())
            .parse()
            .expect("STUDY_MAX_ATTEMPTS must be a valid u32");

        let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| DEFAULT_SWEEP_INTERVAL_SECS.to_string())
            .parse()
            .expect("SWEEP_INTERVAL_SECS must be a valid u64");

        Self {
            boundary,
            reconciler: ReconcilerConfig {
                idle_threshold: chrono::Duration::seconds(idle_threshold_secs),
                max_attempts,
                retry_delay: DEFAULT_RETRY_DELAY,
            },
            sweep_interval_secs,
        }
    }

    /// Background sweep cadence, or `None` when disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }
}
